//! Discovery and caching of the cluster's ingestion resources: queues, blob
//! containers, status tables and the identity token.

pub mod authorization_context;
pub mod cache;
pub mod ingest_client_resources;
pub mod resource_uri;

use std::sync::Arc;
use std::time::Duration;

use azure_data_tables::prelude::TableClient;
use azure_storage_queues::QueueClient;
use kusto_data::prelude::KustoClient;

use crate::client_options::QueuedIngestClientOptions;
use authorization_context::{AuthorizationContext, KustoIdentityToken};
use ingest_client_resources::IngestClientResources;

/// How long fetched resources stay valid before the next use refreshes them.
pub const RESOURCE_REFRESH_PERIOD: Duration = Duration::from_secs(60 * 60);

/// Errors raised when obtaining ingestion resources.
#[derive(thiserror::Error, Debug)]
pub enum ResourceManagerError {
    /// The management query failed.
    #[error("Error executing the resources query: {0}")]
    Kusto(#[from] kusto_data::error::Error),

    /// The resources table is missing an expected column.
    #[error("{0} column is missing in the resources table")]
    MissingColumn(&'static str),

    /// The resources table has no resources of a required kind.
    #[error("No {0} resources found in the table")]
    NoResourcesFound(String),

    /// A resource URI could not be parsed.
    #[error("Invalid resource URI: {0}")]
    InvalidUri(String),

    /// The identity token reply was malformed.
    #[error("Invalid identity token: {0}")]
    InvalidToken(String),
}

/// The per-cluster cache of ingestion resources and the identity token.
pub struct ResourceManager {
    ingest_client_resources: Arc<IngestClientResources>,
    authorization_context: Arc<AuthorizationContext>,
}

impl ResourceManager {
    /// Creates a resource manager against the given ingestion cluster.
    pub fn new(client: KustoClient, client_options: QueuedIngestClientOptions) -> Self {
        Self {
            ingest_client_resources: Arc::new(IngestClientResources::new(
                client.clone(),
                client_options,
            )),
            authorization_context: Arc::new(AuthorizationContext::new(client)),
        }
    }

    /// The queues ingestion messages go to.
    pub async fn ingestion_queues(&self) -> Result<Vec<QueueClient>, ResourceManagerError> {
        Ok(self.ingest_client_resources.get().await?.ingestion_queues)
    }

    /// The containers payloads upload to, with their SAS-bearing URIs.
    pub async fn temp_storage_containers(
        &self,
    ) -> Result<Vec<ingest_client_resources::TempStorage>, ResourceManagerError> {
        Ok(self
            .ingest_client_resources
            .get()
            .await?
            .temp_storage_containers)
    }

    /// The tables the service reports ingestion status into.
    pub async fn status_tables(&self) -> Result<Vec<TableClient>, ResourceManagerError> {
        Ok(self.ingest_client_resources.get().await?.status_tables)
    }

    /// The secured notification queues, successes first then failures.
    pub async fn notification_queues(&self) -> Result<Vec<QueueClient>, ResourceManagerError> {
        let resources = self.ingest_client_resources.get().await?;
        let mut queues = resources.successful_ingestions_queues;
        queues.extend(resources.failed_ingestions_queues);
        Ok(queues)
    }

    /// The identity token attached to every queued ingestion message.
    pub async fn authorization_context(
        &self,
    ) -> Result<KustoIdentityToken, ResourceManagerError> {
        self.authorization_context.get().await
    }
}
