//! # Azure Data Explorer Ingestion Library
//! Ingest data into Azure Data Explorer (Kusto) through the queued,
//! streaming, or managed-streaming paths, and track the submission until
//! its final status.

pub mod client_options;
pub mod data_format;
pub mod descriptors;
pub mod error;
pub(crate) mod ingestion_blob_info;
pub mod ingestion_properties;
pub mod managed_streaming;
pub mod queued_ingest;
pub mod resource_manager;
pub mod status;
pub mod streaming_ingest;

pub use data_format::{CompressionType, DataFormat, IngestionMappingKind};
pub use descriptors::{BlobDescriptor, FileDescriptor, StreamDescriptor};
pub use error::{Error, Result};
pub use ingestion_properties::{IngestionProperties, ReportLevel, ReportMethod};
pub use managed_streaming::ManagedStreamingIngestClient;
pub use queued_ingest::QueuedIngestClient;
pub use status::{FailureStatus, IngestionResult, IngestionStatus, StatusRecord};
pub use streaming_ingest::StreamingIngestClient;
