//! The Kusto identity token attached to every queued ingestion message.

use std::sync::Arc;

use async_lock::RwLock;
use kusto_data::models::v1::Row;
use kusto_data::prelude::KustoClient;

use super::cache::{Expiring, Refreshing};
use super::{ResourceManagerError, RESOURCE_REFRESH_PERIOD};

/// A temporary token authorising the ingestion service to act on the
/// caller's behalf.
pub type KustoIdentityToken = String;

#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    /// A client against the ingestion cluster's management endpoint.
    client: KustoClient,
    token_cache: Refreshing<Option<KustoIdentityToken>>,
}

impl AuthorizationContext {
    pub fn new(client: KustoClient) -> Self {
        Self {
            client,
            token_cache: Arc::new(RwLock::new(Expiring::new(None, RESOURCE_REFRESH_PERIOD))),
        }
    }

    /// Queries the management endpoint for a fresh identity token.
    async fn query_kusto_identity_token(
        &self,
    ) -> Result<KustoIdentityToken, ResourceManagerError> {
        let results = self
            .client
            .execute_command("NetDefaultDB", ".get kusto identity token")
            .await?;

        let table = match &results.tables[..] {
            [table] => table,
            _ => {
                return Err(ResourceManagerError::InvalidToken(format!(
                    "expected 1 table in the reply, found {}",
                    results.tables.len()
                )))
            }
        };

        let index = table
            .columns
            .iter()
            .position(|c| c.column_name == "AuthorizationContext")
            .ok_or(ResourceManagerError::MissingColumn("AuthorizationContext"))?;

        let token = match &table.rows[..] {
            [Row::Values(cells)] => cells.get(index).and_then(|v| v.as_str()).ok_or_else(|| {
                ResourceManagerError::InvalidToken(
                    "AuthorizationContext cell is not a string".to_string(),
                )
            })?,
            _ => {
                return Err(ResourceManagerError::InvalidToken(format!(
                    "expected 1 value row in the reply, found {}",
                    table.rows.len()
                )))
            }
        };

        if token.chars().all(char::is_whitespace) {
            return Err(ResourceManagerError::InvalidToken(
                "token is empty".to_string(),
            ));
        }

        Ok(token.to_string())
    }

    /// The latest identity token, from cache or freshly queried.
    pub async fn get(&self) -> Result<KustoIdentityToken, ResourceManagerError> {
        {
            let cache = self.token_cache.read().await;
            if cache.is_fresh() {
                if let Some(token) = cache.value() {
                    return Ok(token.clone());
                }
            }
        }

        // Double-checked: another task may have refreshed while we waited
        // on the write lock.
        let mut cache = self.token_cache.write().await;
        if cache.is_fresh() {
            if let Some(token) = cache.value() {
                return Ok(token.clone());
            }
        }

        let token = self.query_kusto_identity_token().await?;
        cache.replace(Some(token.clone()));

        Ok(token)
    }
}
