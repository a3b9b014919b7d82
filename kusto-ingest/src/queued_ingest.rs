//! Client for ingesting data into Kusto using the queued flavour of
//! ingestion: upload the payload to a temp-storage blob, then post an
//! ingestion message describing it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use azure_core::base64;
use futures::AsyncReadExt;
use kusto_data::error::{Error as KustoError, ErrorKind, OpKind};
use kusto_data::prelude::KustoClient;
use url::Url;
use uuid::Uuid;

use crate::client_options::QueuedIngestClientOptions;
use crate::data_format::prepare_payload;
use crate::descriptors::{BlobDescriptor, FileDescriptor, StreamDescriptor};
use crate::ingestion_blob_info::QueuedIngestionMessage;
use crate::ingestion_properties::{IngestionProperties, IngestorKind, ReportMethod, SourceKind};
use crate::resource_manager::ResourceManager;
use crate::status::{IngestionResult, IngestionStatus, StatusRecord};

/// Picks the next item of a rotating resource list.
fn round_robin<T>(items: &[T]) -> Option<&T> {
    static NEXT: OnceLock<AtomicUsize> = OnceLock::new();
    if items.is_empty() {
        return None;
    }
    let next = NEXT.get_or_init(|| AtomicUsize::new(rand::random::<u16>() as usize));
    items.get(next.fetch_add(1, Ordering::Relaxed) % items.len())
}

/// Client for ingesting data into Kusto using the queued flavour of ingestion.
///
/// Submissions never fail directly; every error resolves the returned
/// [IngestionResult], so callers observe one uniform status surface.
#[derive(Clone)]
pub struct QueuedIngestClient {
    resource_manager: Arc<ResourceManager>,
}

impl QueuedIngestClient {
    /// Creates a new client from the given [KustoClient], which must point
    /// at the cluster's ingestion endpoint.
    pub fn new(kusto_client: KustoClient) -> Self {
        Self::new_with_client_options(kusto_client, QueuedIngestClientOptions::default())
    }

    /// Creates a new client from the given [KustoClient] and
    /// [QueuedIngestClientOptions], allowing customisation of the storage
    /// clients.
    pub fn new_with_client_options(
        kusto_client: KustoClient,
        options: QueuedIngestClientOptions,
    ) -> Self {
        Self {
            resource_manager: Arc::new(ResourceManager::new(kusto_client, options)),
        }
    }

    /// Ingests a local file.
    pub async fn ingest_from_file(
        &self,
        descriptor: FileDescriptor,
        ingestion_properties: IngestionProperties,
    ) -> IngestionResult {
        let record = StatusRecord::pending(
            descriptor.source_id,
            descriptor.display_path(),
            &ingestion_properties.database_name,
            &ingestion_properties.table_name,
        );
        match self.submit_file(&descriptor, &ingestion_properties, &record).await {
            Ok(result) => result,
            Err(e) => client_failure(record, e),
        }
    }

    /// Ingests from an arbitrary reader.
    pub async fn ingest_from_stream(
        &self,
        descriptor: StreamDescriptor,
        ingestion_properties: IngestionProperties,
    ) -> IngestionResult {
        let record = StatusRecord::pending(
            descriptor.source_id,
            descriptor.name.clone(),
            &ingestion_properties.database_name,
            &ingestion_properties.table_name,
        );
        match self
            .submit_stream(descriptor, &ingestion_properties, &record)
            .await
        {
            Ok(result) => result,
            Err(e) => client_failure(record, e),
        }
    }

    /// Ingests a blob the caller already uploaded.
    pub async fn ingest_from_blob(
        &self,
        blob_descriptor: BlobDescriptor,
        ingestion_properties: IngestionProperties,
    ) -> IngestionResult {
        let record = StatusRecord::pending(
            blob_descriptor.source_id(),
            blob_descriptor.uri().split('?').next().unwrap_or_default(),
            &ingestion_properties.database_name,
            &ingestion_properties.table_name,
        );
        let format = ingestion_properties.resolve_format(None);
        let submit = async {
            ingestion_properties.validate(IngestorKind::Queued, SourceKind::Blob)?;
            self.enqueue(&blob_descriptor, &ingestion_properties, format, record.clone())
                .await
        };
        match submit.await {
            Ok(result) => result,
            Err(e) => client_failure(record, e),
        }
    }

    async fn submit_file(
        &self,
        descriptor: &FileDescriptor,
        ingestion_properties: &IngestionProperties,
        record: &StatusRecord,
    ) -> Result<IngestionResult, KustoError> {
        ingestion_properties.validate(IngestorKind::Queued, SourceKind::File)?;

        let data = tokio::fs::read(&descriptor.path).await.map_err(|e| {
            KustoError::wrapping(OpKind::FileIngest, ErrorKind::LocalFileSystem, e)
        })?;
        let raw_size = data.len() as u64;
        let format = ingestion_properties.resolve_format(Some(descriptor.format));
        let (payload, compression) = prepare_payload(data, format, descriptor.compression)
            .map_err(|e| KustoError::wrapping(OpKind::FileIngest, ErrorKind::Io, e))?;

        let blob_name = blob_name(ingestion_properties, descriptor.source_id, compression);
        let blob = self
            .upload(payload, &blob_name, descriptor.source_id, raw_size)
            .await?;

        let result = self
            .enqueue(&blob, ingestion_properties, format, record.clone())
            .await?;

        if ingestion_properties.delete_source_on_success == Some(true) {
            if let Err(e) = tokio::fs::remove_file(&descriptor.path).await {
                tracing::warn!(
                    path = %descriptor.path.display(),
                    error = %e,
                    "failed to delete the source file after hand-off"
                );
            }
        }
        Ok(result)
    }

    async fn submit_stream(
        &self,
        mut descriptor: StreamDescriptor,
        ingestion_properties: &IngestionProperties,
        record: &StatusRecord,
    ) -> Result<IngestionResult, KustoError> {
        ingestion_properties.validate(IngestorKind::Queued, SourceKind::Reader)?;

        let mut data = Vec::new();
        descriptor
            .stream
            .read_to_end(&mut data)
            .await
            .map_err(|e| KustoError::wrapping(OpKind::FileIngest, ErrorKind::Io, e))?;
        let raw_size = data.len() as u64;
        let format = ingestion_properties.resolve_format(Some(descriptor.format));
        let (payload, compression) = prepare_payload(data, format, descriptor.compression)
            .map_err(|e| KustoError::wrapping(OpKind::FileIngest, ErrorKind::Io, e))?;

        let blob_name = blob_name(ingestion_properties, descriptor.source_id, compression);
        let blob = self
            .upload(payload, &blob_name, descriptor.source_id, raw_size)
            .await?;

        self.enqueue(&blob, ingestion_properties, format, record.clone())
            .await
    }

    /// Uploads the payload to a round-robin temp-storage container and
    /// describes the resulting blob.
    async fn upload(
        &self,
        payload: Vec<u8>,
        blob_name: &str,
        source_id: Uuid,
        raw_size: u64,
    ) -> Result<BlobDescriptor, KustoError> {
        let containers = self
            .resource_manager
            .temp_storage_containers()
            .await
            .map_err(blobstore_error)?;
        let container = round_robin(&containers).ok_or_else(|| {
            KustoError::new(
                OpKind::FileIngest,
                ErrorKind::Blobstore,
                "the cluster returned no temp storage containers",
            )
        })?;

        container
            .client
            .blob_client(blob_name)
            .put_block_blob(payload)
            .await
            .map_err(|e| KustoError::wrapping(OpKind::FileIngest, ErrorKind::Blobstore, e))?;

        let uri = container.uri.object_uri(blob_name);
        let uri = Url::parse(&uri)
            .map_err(|e| KustoError::wrapping(OpKind::FileIngest, ErrorKind::Blobstore, e))?;
        // The SAS is already part of the URI; nothing more to attach.
        Ok(BlobDescriptor::new(uri, Some(raw_size), Some(source_id)))
    }

    /// Posts the ingestion message and picks the status-tracking mode the
    /// properties asked for.
    async fn enqueue(
        &self,
        blob: &BlobDescriptor,
        ingestion_properties: &IngestionProperties,
        format: crate::data_format::DataFormat,
        record: StatusRecord,
    ) -> Result<IngestionResult, KustoError> {
        let auth_context = self
            .resource_manager
            .authorization_context()
            .await
            .map_err(blobstore_error)?;

        let message =
            QueuedIngestionMessage::new(blob, ingestion_properties, format, auth_context);
        let message = serde_json::to_string(&message)
            .map_err(|e| KustoError::wrapping(OpKind::FileIngest, ErrorKind::ClientInternal, e))?;
        let message = base64::encode(&message);

        let queues = self
            .resource_manager
            .ingestion_queues()
            .await
            .map_err(blobstore_error)?;
        let queue = round_robin(&queues).ok_or_else(|| {
            KustoError::new(
                OpKind::FileIngest,
                ErrorKind::Blobstore,
                "the cluster returned no ingestion queues",
            )
        })?;

        queue
            .put_message(message)
            .await
            .map_err(|e| KustoError::wrapping(OpKind::FileIngest, ErrorKind::Blobstore, e))?;
        tracing::debug!(source_id = %blob.source_id(), "ingestion message enqueued");

        let record = record.with_status(IngestionStatus::Queued);
        match ingestion_properties.report_method {
            Some(ReportMethod::Table) | Some(ReportMethod::QueueAndTable) => {
                let tables = self
                    .resource_manager
                    .status_tables()
                    .await
                    .map_err(blobstore_error)?;
                match round_robin(&tables) {
                    Some(table) => Ok(IngestionResult::table_polling(
                        OpKind::FileIngest,
                        record,
                        table.clone(),
                    )),
                    None => {
                        tracing::warn!("table reporting requested but the cluster has no status table");
                        Ok(IngestionResult::resolved(OpKind::FileIngest, record))
                    }
                }
            }
            Some(ReportMethod::Queue) => {
                let queues = self
                    .resource_manager
                    .notification_queues()
                    .await
                    .map_err(blobstore_error)?;
                Ok(IngestionResult::queue_reporting(
                    OpKind::FileIngest,
                    record,
                    queues,
                ))
            }
            None => Ok(IngestionResult::resolved(OpKind::FileIngest, record)),
        }
    }
}

fn blob_name(
    properties: &IngestionProperties,
    source_id: Uuid,
    compression: crate::data_format::CompressionType,
) -> String {
    let suffix = if compression.is_compressed() {
        ".gz"
    } else {
        ""
    };
    format!(
        "{}__{}__{}{}",
        properties.database_name, properties.table_name, source_id, suffix
    )
}

fn blobstore_error(e: crate::resource_manager::ResourceManagerError) -> KustoError {
    KustoError::wrapping(OpKind::FileIngest, ErrorKind::Blobstore, e)
}

/// Resolves the handle with a synthesised failure for errors that happened
/// before the service saw anything.
fn client_failure(record: StatusRecord, error: KustoError) -> IngestionResult {
    tracing::debug!(error = %error, "queued submission failed on the client");
    let failure = StatusRecord::client_error(
        record.ingestion_source_id,
        record.ingestion_source_path,
        record.database,
        record.table,
        error.to_string(),
    );
    IngestionResult::resolved(OpKind::FileIngest, failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::FailureStatus;
    use kusto_data::prelude::{ConnectionString, KustoClientOptions};

    fn client() -> QueuedIngestClient {
        let kusto = KustoClient::new(
            ConnectionString::with_default_auth("https://ingest-cluster.kusto.windows.net"),
            KustoClientOptions::default(),
        )
        .unwrap();
        QueuedIngestClient::new(kusto)
    }

    fn properties() -> IngestionProperties {
        IngestionProperties {
            database_name: "db".to_string(),
            table_name: "table".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn missing_file_resolves_the_handle_immediately() {
        let result = client()
            .ingest_from_file(FileDescriptor::new("definitely-no-such.csv"), properties())
            .await;

        let error = result.wait().await.unwrap_err();
        let status = error.status().unwrap();
        assert_eq!(status.status, IngestionStatus::Failed);
        assert_eq!(status.failure_status, FailureStatus::Permanent);
        assert_eq!(error.op(), OpKind::FileIngest);
    }

    #[tokio::test]
    async fn invalid_options_fail_before_any_io() {
        let props = IngestionProperties {
            client_request_id: Some("only-for-streaming".to_string()),
            ..properties()
        };
        let result = client()
            .ingest_from_file(FileDescriptor::new("whatever.csv"), props)
            .await;
        let error = result.wait().await.unwrap_err();
        assert!(error.to_string().contains("ClientRequestId"));
    }

    #[test]
    fn round_robin_rotates() {
        let items = [1, 2, 3];
        let first = *round_robin(&items).unwrap();
        let second = *round_robin(&items).unwrap();
        let third = *round_robin(&items).unwrap();
        let fourth = *round_robin(&items).unwrap();
        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_eq!(first, fourth);
    }

    #[test]
    fn blob_names_carry_the_compression_suffix() {
        let name = blob_name(
            &properties(),
            Uuid::nil(),
            crate::data_format::CompressionType::GZip,
        );
        assert_eq!(
            name,
            "db__table__00000000-0000-0000-0000-000000000000.gz"
        );
    }
}
