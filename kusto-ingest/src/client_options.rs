//! Configurability of the storage clients used within
//! [QueuedIngestClient](crate::queued_ingest::QueuedIngestClient).

use azure_core::ClientOptions;

/// Client options for each of the storage services the queued path talks to.
#[derive(Clone, Default)]
pub struct QueuedIngestClientOptions {
    /// Options for the queue service clients.
    pub queue_service: ClientOptions,
    /// Options for the blob service clients.
    pub blob_service: ClientOptions,
    /// Options for the table service clients.
    pub table_service: ClientOptions,
}

impl From<ClientOptions> for QueuedIngestClientOptions {
    /// Creates a `QueuedIngestClientOptions` struct where the same
    /// [ClientOptions] are used for all services.
    fn from(client_options: ClientOptions) -> Self {
        Self {
            queue_service: client_options.clone(),
            blob_service: client_options.clone(),
            table_service: client_options,
        }
    }
}

/// Builder for [QueuedIngestClientOptions].
#[derive(Clone, Default)]
pub struct QueuedIngestClientOptionsBuilder {
    queue_service: ClientOptions,
    blob_service: ClientOptions,
    table_service: ClientOptions,
}

impl QueuedIngestClientOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue_service(mut self, queue_service: ClientOptions) -> Self {
        self.queue_service = queue_service;
        self
    }

    pub fn with_blob_service(mut self, blob_service: ClientOptions) -> Self {
        self.blob_service = blob_service;
        self
    }

    pub fn with_table_service(mut self, table_service: ClientOptions) -> Self {
        self.table_service = table_service;
        self
    }

    pub fn build(self) -> QueuedIngestClientOptions {
        QueuedIngestClientOptions {
            queue_service: self.queue_service,
            blob_service: self.blob_service,
            table_service: self.table_service,
        }
    }
}
