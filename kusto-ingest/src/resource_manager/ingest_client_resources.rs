//! The cached set of storage resources used for queued ingestion and status
//! reporting.

use std::sync::Arc;

use crate::client_options::QueuedIngestClientOptions;

use super::cache::{Expiring, Refreshing};
use super::resource_uri::{ClientFromResourceUri, ResourceUri};
use super::{ResourceManagerError, RESOURCE_REFRESH_PERIOD};
use async_lock::RwLock;
use azure_core::ClientOptions;
use azure_data_tables::prelude::TableClient;
use azure_storage_blobs::prelude::ContainerClient;
use azure_storage_queues::QueueClient;
use kusto_data::models::v1::Table;
use kusto_data::prelude::KustoClient;

fn get_column_index(table: &Table, column_name: &'static str) -> Result<usize, ResourceManagerError> {
    table
        .columns
        .iter()
        .position(|c| c.column_name == column_name)
        .ok_or(ResourceManagerError::MissingColumn(column_name))
}

/// Collects the resource URIs of one kind out of the resources table.
fn get_resources_by_name(
    table: &Table,
    resource_name: &str,
) -> Result<Vec<ResourceUri>, ResourceManagerError> {
    let storage_root_index = get_column_index(table, "StorageRoot")?;
    let resource_type_name_index = get_column_index(table, "ResourceTypeName")?;

    table
        .rows
        .iter()
        .filter_map(|row| {
            let cells = match row {
                kusto_data::models::v1::Row::Values(cells) => cells,
                kusto_data::models::v1::Row::Error(_) => return None,
            };
            if cells.get(resource_type_name_index)?.as_str()? != resource_name {
                return None;
            }
            Some(
                cells
                    .get(storage_root_index)
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        ResourceManagerError::InvalidUri(
                            "StorageRoot is not a string".to_string(),
                        )
                    })
                    .and_then(ResourceUri::try_from),
            )
        })
        .collect()
}

fn required(
    uris: Vec<ResourceUri>,
    resource_name: &str,
) -> Result<Vec<ResourceUri>, ResourceManagerError> {
    if uris.is_empty() {
        return Err(ResourceManagerError::NoResourcesFound(
            resource_name.to_string(),
        ));
    }
    Ok(uris)
}

fn create_clients_vec<T>(resource_uris: &[ResourceUri], client_options: &ClientOptions) -> Vec<T>
where
    T: ClientFromResourceUri,
{
    resource_uris
        .iter()
        .map(|uri| T::create_client(uri.clone(), client_options.clone()))
        .collect()
}

/// A temp-storage container together with its SAS-bearing URI; the URI is
/// what goes into the queue message as the blob path prefix.
#[derive(Debug, Clone)]
pub struct TempStorage {
    pub uri: ResourceUri,
    pub client: ContainerClient,
}

/// The clients required for queued ingestion and status tracking.
#[derive(Debug, Clone)]
pub struct InnerIngestClientResources {
    /// Queues taking ingestion messages.
    pub ingestion_queues: Vec<QueueClient>,
    /// Containers taking uploaded payloads.
    pub temp_storage_containers: Vec<TempStorage>,
    /// Tables the service reports ingestion status into.
    pub status_tables: Vec<TableClient>,
    /// Queues carrying success notifications.
    pub successful_ingestions_queues: Vec<QueueClient>,
    /// Queues carrying failure notifications.
    pub failed_ingestions_queues: Vec<QueueClient>,
}

impl TryFrom<(&Table, &QueuedIngestClientOptions)> for InnerIngestClientResources {
    type Error = ResourceManagerError;

    fn try_from(
        (table, client_options): (&Table, &QueuedIngestClientOptions),
    ) -> Result<Self, Self::Error> {
        let ingestion_queues = required(
            get_resources_by_name(table, "SecuredReadyForAggregationQueue")?,
            "SecuredReadyForAggregationQueue",
        )?;
        let temp_storage = required(get_resources_by_name(table, "TempStorage")?, "TempStorage")?;
        // Reporting resources are optional; ingestion works without them.
        let status_tables = get_resources_by_name(table, "IngestionsStatusTable")?;
        let successful = get_resources_by_name(table, "SuccessfulIngestionsQueue")?;
        let failed = get_resources_by_name(table, "FailedIngestionsQueue")?;

        let temp_storage_containers = temp_storage
            .into_iter()
            .map(|uri| TempStorage {
                client: ContainerClient::create_client(
                    uri.clone(),
                    client_options.blob_service.clone(),
                ),
                uri,
            })
            .collect();

        Ok(Self {
            ingestion_queues: create_clients_vec(&ingestion_queues, &client_options.queue_service),
            temp_storage_containers,
            status_tables: create_clients_vec(&status_tables, &client_options.table_service),
            successful_ingestions_queues: create_clients_vec(
                &successful,
                &client_options.queue_service,
            ),
            failed_ingestions_queues: create_clients_vec(&failed, &client_options.queue_service),
        })
    }
}

pub struct IngestClientResources {
    client: KustoClient,
    resources: Refreshing<Option<InnerIngestClientResources>>,
    client_options: QueuedIngestClientOptions,
}

impl IngestClientResources {
    pub fn new(client: KustoClient, client_options: QueuedIngestClientOptions) -> Self {
        Self {
            client,
            resources: Arc::new(RwLock::new(Expiring::new(None, RESOURCE_REFRESH_PERIOD))),
            client_options,
        }
    }

    /// Executes the management query that retrieves the resource URIs.
    async fn query_ingestion_resources(
        &self,
    ) -> Result<InnerIngestClientResources, ResourceManagerError> {
        let results = self
            .client
            .execute_command("NetDefaultDB", ".get ingestion resources")
            .await?;

        let table = results
            .tables
            .first()
            .ok_or_else(|| ResourceManagerError::NoResourcesFound("any".to_string()))?;

        InnerIngestClientResources::try_from((table, &self.client_options))
    }

    /// Gets the latest resources, from cache or by fetching and updating it.
    pub async fn get(&self) -> Result<InnerIngestClientResources, ResourceManagerError> {
        {
            let resources = self.resources.read().await;
            if resources.is_fresh() {
                if let Some(inner) = resources.value() {
                    return Ok(inner.clone());
                }
            }
        }

        // Double-checked: another task may have refreshed while we waited
        // on the write lock.
        let mut resources = self.resources.write().await;
        if resources.is_fresh() {
            if let Some(inner) = resources.value() {
                return Ok(inner.clone());
            }
        }

        tracing::debug!("refreshing ingestion resources");
        let new_resources = self.query_ingestion_resources().await?;
        resources.replace(Some(new_resources.clone()));

        Ok(new_resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kusto_data::models::v1::{Column, Row};
    use kusto_data::models::ColumnType;

    fn resources_table(rows: Vec<(&str, &str)>) -> Table {
        Table {
            table_name: "Table_0".to_string(),
            columns: vec![
                Column {
                    column_name: "ResourceTypeName".to_string(),
                    column_type: ColumnType::String,
                    data_type: None,
                },
                Column {
                    column_name: "StorageRoot".to_string(),
                    column_type: ColumnType::String,
                    data_type: None,
                },
            ],
            rows: rows
                .into_iter()
                .map(|(kind, uri)| {
                    Row::Values(vec![serde_json::json!(kind), serde_json::json!(uri)])
                })
                .collect(),
        }
    }

    #[test]
    fn builds_clients_from_the_resources_table() {
        let table = resources_table(vec![
            (
                "SecuredReadyForAggregationQueue",
                "https://account.queue.core.windows.net/ready-1?sig=a",
            ),
            (
                "SecuredReadyForAggregationQueue",
                "https://account.queue.core.windows.net/ready-2?sig=b",
            ),
            (
                "TempStorage",
                "https://account.blob.core.windows.net/temp?sig=c",
            ),
            (
                "IngestionsStatusTable",
                "https://account.table.core.windows.net/status?sig=d",
            ),
            (
                "SuccessfulIngestionsQueue",
                "https://account.queue.core.windows.net/ok?sig=e",
            ),
            (
                "FailedIngestionsQueue",
                "https://account.queue.core.windows.net/bad?sig=f",
            ),
        ]);
        let inner =
            InnerIngestClientResources::try_from((&table, &QueuedIngestClientOptions::default()))
                .unwrap();
        assert_eq!(inner.ingestion_queues.len(), 2);
        assert_eq!(inner.temp_storage_containers.len(), 1);
        assert_eq!(inner.status_tables.len(), 1);
        assert_eq!(inner.successful_ingestions_queues.len(), 1);
        assert_eq!(inner.failed_ingestions_queues.len(), 1);
    }

    #[test]
    fn missing_required_resources_is_an_error() {
        let table = resources_table(vec![(
            "TempStorage",
            "https://account.blob.core.windows.net/temp?sig=c",
        )]);
        assert!(matches!(
            InnerIngestClientResources::try_from((&table, &QueuedIngestClientOptions::default())),
            Err(ResourceManagerError::NoResourcesFound(name)) if name == "SecuredReadyForAggregationQueue"
        ));
    }

    #[test]
    fn missing_reporting_resources_is_tolerated() {
        let table = resources_table(vec![
            (
                "SecuredReadyForAggregationQueue",
                "https://account.queue.core.windows.net/ready?sig=a",
            ),
            (
                "TempStorage",
                "https://account.blob.core.windows.net/temp?sig=c",
            ),
        ]);
        let inner =
            InnerIngestClientResources::try_from((&table, &QueuedIngestClientOptions::default()))
                .unwrap();
        assert!(inner.status_tables.is_empty());
    }
}
