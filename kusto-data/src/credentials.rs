//! Custom credentials for Azure Data Explorer.

use crate::connection_string::TokenCallbackFunction;
use azure_core::auth::{AccessToken, TokenCredential};
use std::fmt::{Debug, Formatter};
use std::time::Duration;
use time::OffsetDateTime;

const SECONDS_IN_50_YEARS: u64 = 60 * 60 * 24 * 365 * 50;

/// Uses a fixed token to authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstTokenCredential {
    pub(crate) token: String,
}

#[async_trait::async_trait]
impl TokenCredential for ConstTokenCredential {
    async fn get_token(&self, _scopes: &[&str]) -> azure_core::Result<AccessToken> {
        Ok(AccessToken::new(
            self.token.clone(),
            OffsetDateTime::now_utc() + Duration::from_secs(SECONDS_IN_50_YEARS),
        ))
    }

    async fn clear_cache(&self) -> azure_core::Result<()> {
        Ok(())
    }
}

/// Uses a user provided callback that accepts the resource and returns a
/// token in order to authenticate.
pub struct CallbackTokenCredential {
    pub(crate) token_callback: TokenCallbackFunction,
    pub(crate) time_to_live: Option<Duration>,
}

impl Debug for CallbackTokenCredential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackTokenCredential")
            .field("time_to_live", &self.time_to_live)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl TokenCredential for CallbackTokenCredential {
    async fn get_token(&self, scopes: &[&str]) -> azure_core::Result<AccessToken> {
        let callback = &self.token_callback;
        let resource = scopes.first().copied().unwrap_or_default();
        Ok(AccessToken::new(
            callback(resource),
            OffsetDateTime::now_utc()
                + self
                    .time_to_live
                    .unwrap_or(Duration::from_secs(SECONDS_IN_50_YEARS)),
        ))
    }

    async fn clear_cache(&self) -> azure_core::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn const_token_is_returned_verbatim() {
        let credential = ConstTokenCredential {
            token: "token".to_string(),
        };
        let response = credential.get_token(&["resource"]).await.unwrap();
        assert_eq!(response.token.secret(), "token");
    }

    #[tokio::test]
    async fn callback_receives_the_resource() {
        let credential = CallbackTokenCredential {
            token_callback: Arc::new(|resource| format!("token-for-{resource}")),
            time_to_live: None,
        };
        let response = credential
            .get_token(&["https://cluster.kusto.windows.net"])
            .await
            .unwrap();
        assert_eq!(
            response.token.secret(),
            "token-for-https://cluster.kusto.windows.net"
        );
    }
}
