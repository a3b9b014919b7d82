//! Defines [Error] for representing failures in ingestion operations.

use crate::status::StatusRecord;
use kusto_data::error::OpKind;

/// Error type for kusto ingestion operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A structured error from the underlying data client.
    #[error(transparent)]
    Kusto(#[from] kusto_data::error::Error),

    /// An ingestion that reached a terminal failure status.
    #[error("Ingestion failed: {}", record.details)]
    Status {
        /// The terminal status record.
        record: Box<StatusRecord>,
        /// The operation that failed.
        op: OpKind,
    },

    /// Error raised when failing to obtain ingestion resources.
    #[error("Error obtaining ingestion resources: {0}")]
    ResourceManager(#[from] crate::resource_manager::ResourceManagerError),

    /// Error relating to (de-)serialization of JSON data.
    #[error("Error in JSON serialization/deserialization: {0}")]
    Json(#[from] serde_json::Error),

    /// Error occurring within core azure crates.
    #[error("Error in azure-core: {0}")]
    Azure(#[from] azure_core::error::Error),
}

impl Error {
    /// The operation this error belongs to.
    pub fn op(&self) -> OpKind {
        match self {
            Error::Kusto(e) => e.op(),
            Error::Status { op, .. } => *op,
            _ => OpKind::Unknown,
        }
    }

    /// The terminal status record, when the ingestion itself failed.
    pub fn status(&self) -> Option<&StatusRecord> {
        match self {
            Error::Status { record, .. } => Some(record),
            _ => None,
        }
    }
}

/// Result type for kusto ingest operations.
pub type Result<T> = std::result::Result<T, Error>;
