//! Client for ingesting data through the streaming endpoint: the payload is
//! posted directly to the engine, bypassing aggregation.

use azure_core::error::Error as CoreError;
use azure_core::prelude::*;
use azure_core::{Context, Method, Request, StatusCode};
use futures::AsyncReadExt;
use kusto_data::error::{Error as KustoError, ErrorKind, OpKind};
use kusto_data::prelude::KustoClient;

use crate::data_format::{prepare_payload, CompressionType, DataFormat};
use crate::descriptors::{FileDescriptor, StreamDescriptor};
use crate::ingestion_properties::{IngestionProperties, IngestorKind, SourceKind};
use crate::status::{IngestionResult, IngestionStatus, StatusRecord};

/// Client for ingesting data through the streaming endpoint.
///
/// Success resolves the returned handle immediately; an HTTP failure
/// resolves it with a status derived from the error body.
#[derive(Clone)]
pub struct StreamingIngestClient {
    client: KustoClient,
}

impl StreamingIngestClient {
    /// Creates a new client from the given [KustoClient], which must point
    /// at the cluster's engine endpoint.
    pub fn new(kusto_client: KustoClient) -> Self {
        Self {
            client: kusto_client,
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
        let submit = async {
            ingestion_properties.validate(IngestorKind::Streaming, SourceKind::File)?;
            let data = tokio::fs::read(&descriptor.path).await.map_err(|e| {
                KustoError::wrapping(OpKind::IngestStream, ErrorKind::LocalFileSystem, e)
            })?;
            self.post_prepared(
                data,
                descriptor.format,
                descriptor.compression,
                &ingestion_properties,
            )
            .await
        };
        self.settle(record, submit.await)
    }

    /// Ingests from an arbitrary reader.
    pub async fn ingest_from_stream(
        &self,
        mut descriptor: StreamDescriptor,
        ingestion_properties: IngestionProperties,
    ) -> IngestionResult {
        let record = StatusRecord::pending(
            descriptor.source_id,
            descriptor.name.clone(),
            &ingestion_properties.database_name,
            &ingestion_properties.table_name,
        );
        let submit = async {
            ingestion_properties.validate(IngestorKind::Streaming, SourceKind::Reader)?;
            let mut data = Vec::new();
            descriptor
                .stream
                .read_to_end(&mut data)
                .await
                .map_err(|e| KustoError::wrapping(OpKind::IngestStream, ErrorKind::Io, e))?;
            self.post_prepared(
                data,
                descriptor.format,
                descriptor.compression,
                &ingestion_properties,
            )
            .await
        };
        self.settle(record, submit.await)
    }

    async fn post_prepared(
        &self,
        data: Vec<u8>,
        detected_format: DataFormat,
        compression: CompressionType,
        ingestion_properties: &IngestionProperties,
    ) -> Result<(), KustoError> {
        let format = ingestion_properties.resolve_format(Some(detected_format));
        let (payload, compression) = prepare_payload(data, format, compression)
            .map_err(|e| KustoError::wrapping(OpKind::IngestStream, ErrorKind::Io, e))?;
        self.post_stream(payload, format, compression, ingestion_properties)
            .await
    }

    /// Posts one prepared payload to the streaming endpoint. Used directly
    /// by the managed-streaming client, which owns the retry policy.
    pub(crate) async fn post_stream(
        &self,
        payload: Vec<u8>,
        format: DataFormat,
        compression: CompressionType,
        ingestion_properties: &IngestionProperties,
    ) -> Result<(), KustoError> {
        let op = OpKind::IngestStream;
        let mut url = format!(
            "{}/v1/rest/ingest/{}/{}?streamFormat={}",
            self.client.service_url(),
            ingestion_properties.database_name,
            ingestion_properties.table_name,
            format.wire_name(),
        );
        if let Some(mapping) = ingestion_properties.ingestion_mapping_reference.as_deref() {
            url.push_str("&mappingName=");
            url.push_str(mapping);
        }

        let mut request = Request::new(
            url.parse()
                .map_err(|e: url::ParseError| KustoError::wrapping(op, ErrorKind::ClientArgs, e))?,
            Method::Post,
        );
        request.insert_headers(&Accept::from("application/json"));
        request.insert_headers(&AcceptEncoding::from("gzip, deflate"));
        if compression.is_compressed() {
            request.insert_header("content-encoding", "gzip");
        }
        let client_request_id = ingestion_properties
            .client_request_id
            .clone()
            .unwrap_or_else(|| format!("KGC.executeStreaming;{}", uuid::Uuid::new_v4()));
        request.insert_header("x-ms-client-request-id", client_request_id);
        request.insert_headers(&ContentLength::new(payload.len() as i32));
        request.set_body(bytes::Bytes::from(payload));

        let response = self
            .client
            .pipeline()
            .send(&mut Context::new(), &mut request)
            .await
            .map_err(|e: CoreError| KustoError::wrapping(op, ErrorKind::Io, e))?;

        let status = response.status();
        if status != StatusCode::Ok {
            let (_status, _headers, pinned_stream) = response.deconstruct();
            let body = pinned_stream
                .collect()
                .await
                .map_err(|e| KustoError::wrapping(op, ErrorKind::Io, e))?;
            return Err(KustoError::http(op, status, &body));
        }
        tracing::debug!(
            database = %ingestion_properties.database_name,
            table = %ingestion_properties.table_name,
            "streaming ingestion accepted"
        );
        Ok(())
    }

    fn settle(&self, record: StatusRecord, outcome: Result<(), KustoError>) -> IngestionResult {
        match outcome {
            Ok(()) => IngestionResult::resolved(
                OpKind::IngestStream,
                record.with_status(IngestionStatus::Succeeded),
            ),
            Err(error) => IngestionResult::resolved(
                OpKind::IngestStream,
                failure_record(record, &error),
            ),
        }
    }
}

/// Derives a terminal status record from the error of a failed post.
pub(crate) fn failure_record(record: StatusRecord, error: &KustoError) -> StatusRecord {
    let mut failure = StatusRecord::client_error(
        record.ingestion_source_id,
        record.ingestion_source_path,
        record.database,
        record.table,
        error.to_string(),
    );
    failure.failure_status = if error.is_retryable() {
        crate::status::FailureStatus::Transient
    } else {
        crate::status::FailureStatus::Permanent
    };
    failure.error_code = error
        .status()
        .map(|s| i32::from(u16::from(s)))
        .unwrap_or_default();
    failure
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::FailureStatus;
    use kusto_data::prelude::{ConnectionString, KustoClientOptions};
    use uuid::Uuid;

    fn client() -> StreamingIngestClient {
        let kusto = KustoClient::new(
            ConnectionString::with_default_auth("https://cluster.kusto.windows.net"),
            KustoClientOptions::default(),
        )
        .unwrap();
        StreamingIngestClient::new(kusto)
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
        assert_eq!(error.op(), OpKind::IngestStream);
    }

    #[tokio::test]
    async fn blob_sources_are_rejected_up_front() {
        let props = properties();
        let err = props
            .validate(IngestorKind::Streaming, SourceKind::Blob)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClientArgs);
    }

    #[test]
    fn transient_http_failures_mark_the_record_transient() {
        let record = StatusRecord::pending(Uuid::new_v4(), "rows.csv", "db", "table");
        let throttled = KustoError::http(
            OpKind::IngestStream,
            StatusCode::TooManyRequests,
            br#"{"error": {"code": "Throttled", "message": "busy", "@permanent": false}}"#,
        );
        let failure = failure_record(record.clone(), &throttled);
        assert_eq!(failure.failure_status, FailureStatus::Transient);
        assert_eq!(failure.error_code, 429);

        let bad_request = KustoError::http(
            OpKind::IngestStream,
            StatusCode::BadRequest,
            br#"{"error": {"code": "BadRequest", "message": "no", "@permanent": true}}"#,
        );
        let failure = failure_record(record, &bad_request);
        assert_eq!(failure.failure_status, FailureStatus::Permanent);
    }
}
