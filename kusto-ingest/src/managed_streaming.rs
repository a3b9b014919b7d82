//! Client combining the streaming and queued paths: small payloads stream
//! with bounded retries, everything else falls back to the queue.

use std::time::Duration;

use futures::io::Cursor;
use kusto_data::error::{Error as KustoError, ErrorKind, OpKind};
use kusto_data::prelude::KustoClient;

use crate::client_options::QueuedIngestClientOptions;
use crate::data_format::{prepare_payload, CompressionType, DataFormat};
use crate::descriptors::{FileDescriptor, StreamDescriptor};
use crate::ingestion_properties::{IngestionProperties, IngestorKind, SourceKind};
use crate::queued_ingest::QueuedIngestClient;
use crate::status::{IngestionResult, IngestionStatus, StatusRecord};
use crate::streaming_ingest::{failure_record, StreamingIngestClient};

/// Payloads larger than this skip streaming and go straight to the queue.
pub const MAX_STREAMING_SIZE: usize = 4 * 1024 * 1024;

const MAX_STREAMING_ATTEMPTS: u32 = 3;
const RETRY_BASE_INTERVAL: Duration = Duration::from_secs(1);

/// Client that attempts streaming ingestion first and falls back to queued
/// ingestion on transient exhaustion or oversized payloads.
#[derive(Clone)]
pub struct ManagedStreamingIngestClient {
    streaming: StreamingIngestClient,
    queued: QueuedIngestClient,
}

impl ManagedStreamingIngestClient {
    /// Creates a new client from clients against the engine endpoint (for
    /// streaming) and the data-management endpoint (for the queued
    /// fallback).
    pub fn new(engine_client: KustoClient, dm_client: KustoClient) -> Self {
        Self::new_with_client_options(engine_client, dm_client, QueuedIngestClientOptions::default())
    }

    /// Like [new](Self::new), with customised storage client options for the
    /// queued fallback.
    pub fn new_with_client_options(
        engine_client: KustoClient,
        dm_client: KustoClient,
        options: QueuedIngestClientOptions,
    ) -> Self {
        Self {
            streaming: StreamingIngestClient::new(engine_client),
            queued: QueuedIngestClient::new_with_client_options(dm_client, options),
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
        let read = async {
            ingestion_properties.validate(IngestorKind::Streaming, SourceKind::File)?;
            tokio::fs::read(&descriptor.path).await.map_err(|e| {
                KustoError::wrapping(OpKind::IngestStream, ErrorKind::LocalFileSystem, e)
            })
        };
        let data = match read.await {
            Ok(data) => data,
            Err(e) => {
                return IngestionResult::resolved(
                    OpKind::IngestStream,
                    failure_record(record, &e),
                )
            }
        };
        self.submit(
            data,
            descriptor.format,
            descriptor.compression,
            record,
            ingestion_properties,
        )
        .await
    }

    /// Ingests from an arbitrary reader.
    pub async fn ingest_from_stream(
        &self,
        mut descriptor: StreamDescriptor,
        ingestion_properties: IngestionProperties,
    ) -> IngestionResult {
        use futures::AsyncReadExt;
        let record = StatusRecord::pending(
            descriptor.source_id,
            descriptor.name.clone(),
            &ingestion_properties.database_name,
            &ingestion_properties.table_name,
        );
        let read = async {
            ingestion_properties.validate(IngestorKind::Streaming, SourceKind::Reader)?;
            let mut data = Vec::new();
            descriptor
                .stream
                .read_to_end(&mut data)
                .await
                .map_err(|e| KustoError::wrapping(OpKind::IngestStream, ErrorKind::Io, e))?;
            Ok::<_, KustoError>(data)
        };
        let data = match read.await {
            Ok(data) => data,
            Err(e) => {
                return IngestionResult::resolved(
                    OpKind::IngestStream,
                    failure_record(record, &e),
                )
            }
        };
        self.submit(
            data,
            descriptor.format,
            descriptor.compression,
            record,
            ingestion_properties,
        )
        .await
    }

    async fn submit(
        &self,
        data: Vec<u8>,
        detected_format: DataFormat,
        compression: CompressionType,
        record: StatusRecord,
        ingestion_properties: IngestionProperties,
    ) -> IngestionResult {
        let format = ingestion_properties.resolve_format(Some(detected_format));
        let (payload, compression) = match prepare_payload(data, format, compression) {
            Ok(prepared) => prepared,
            Err(e) => {
                let e = KustoError::wrapping(OpKind::IngestStream, ErrorKind::Io, e);
                return IngestionResult::resolved(OpKind::IngestStream, failure_record(record, &e));
            }
        };

        if payload.len() <= MAX_STREAMING_SIZE {
            let mut interval = RETRY_BASE_INTERVAL;
            for attempt in 1..=MAX_STREAMING_ATTEMPTS {
                match self
                    .streaming
                    .post_stream(payload.clone(), format, compression, &ingestion_properties)
                    .await
                {
                    Ok(()) => {
                        return IngestionResult::resolved(
                            OpKind::IngestStream,
                            record.with_status(IngestionStatus::Succeeded),
                        )
                    }
                    Err(e) if e.is_retryable() => {
                        tracing::debug!(
                            attempt,
                            error = %e,
                            "transient streaming failure, backing off"
                        );
                        tokio::time::sleep(interval).await;
                        interval *= 2;
                    }
                    Err(e) => {
                        return IngestionResult::resolved(
                            OpKind::IngestStream,
                            failure_record(record, &e),
                        )
                    }
                }
            }
            tracing::debug!("streaming retries exhausted, falling back to queued ingestion");
        } else {
            tracing::debug!(
                size = payload.len(),
                "payload exceeds the streaming size cap, going through the queue"
            );
        }

        // The queued path rejects streaming-only options; drop them for the
        // fallback.
        let mut fallback_properties = ingestion_properties;
        fallback_properties.client_request_id = None;

        let fallback = StreamDescriptor::new(
            Cursor::new(payload),
            record.ingestion_source_path.clone(),
        )
        .with_source_id(record.ingestion_source_id)
        .with_format(format)
        .with_compression(compression);
        self.queued
            .ingest_from_stream(fallback, fallback_properties)
            .await
    }
}
