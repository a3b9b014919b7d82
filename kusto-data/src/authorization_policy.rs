//! The pipeline policy that signs every request with a bearer token.

use crate::cloud_info::CloudInfo;
use crate::connection_string::ConnectionStringAuth;
use azure_core::headers::AUTHORIZATION;
use azure_core::{
    auth::TokenCredential, ClientOptions, Context, Pipeline, Policy, PolicyResult, Request,
};
use futures::lock::Mutex;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use time::OffsetDateTime;

/// Refresh the token this long before it actually expires.
const EXPIRY_SLACK: time::Duration = time::Duration::minutes(2);

struct CachedToken {
    secret: String,
    expires_on: OffsetDateTime,
}

pub struct AuthorizationPolicy {
    auth: ConnectionStringAuth,
    raw_resource: String,
    // Both locks are held across their fetch, so credential resolution and
    // token acquisition are single-flight: concurrent requests share the
    // in-flight call instead of stampeding the authority.
    credential: Mutex<Option<(Arc<dyn TokenCredential>, String)>>,
    token: Mutex<Option<CachedToken>>,
}

impl Debug for AuthorizationPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationPolicy")
            .field("raw_resource", &self.raw_resource)
            .finish_non_exhaustive()
    }
}

impl AuthorizationPolicy {
    pub(crate) fn new(auth: ConnectionStringAuth, raw_resource: String) -> Self {
        Self {
            auth,
            raw_resource,
            credential: Mutex::new(None),
            token: Mutex::new(None),
        }
    }

    /// Resolves the credential and target resource once, using the cloud
    /// metadata of the endpoint.
    async fn credential(&self) -> azure_core::Result<(Arc<dyn TokenCredential>, String)> {
        let mut lock = self.credential.lock().await;
        if let Some((cred, resource)) = lock.clone() {
            return Ok((cred, resource));
        }

        let cloud_info = CloudInfo::get(
            &Pipeline::new(
                option_env!("CARGO_PKG_NAME"),
                option_env!("CARGO_PKG_VERSION"),
                ClientOptions::default(),
                Vec::new(),
                Vec::new(),
            ),
            &self.raw_resource,
        )
        .await
        .unwrap_or_default();

        let credential = self.auth.clone().into_credential().map_err(|e| {
            azure_core::error::Error::full(
                azure_core::error::ErrorKind::Credential,
                e,
                "failed to construct a credential from the connection string",
            )
        })?;
        let resource = cloud_info.get_resource_uri().to_string();

        *lock = Some((credential.clone(), resource.clone()));
        Ok((credential, resource))
    }

    async fn token(&self) -> azure_core::Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_on - EXPIRY_SLACK > OffsetDateTime::now_utc() {
                return Ok(token.secret.clone());
            }
        }

        let (credential, resource) = self.credential().await?;
        let response = credential.get_token(&[resource.as_str()]).await?;
        let secret = response.token.secret().to_string();
        *cached = Some(CachedToken {
            secret: secret.clone(),
            expires_on: response.expires_on,
        });
        Ok(secret)
    }
}

#[async_trait::async_trait]
impl Policy for AuthorizationPolicy {
    async fn send(
        &self,
        ctx: &Context,
        request: &mut Request,
        next: &[Arc<dyn Policy>],
    ) -> PolicyResult {
        assert!(
            !next.is_empty(),
            "Authorization policies cannot be the last policy of a pipeline"
        );

        let token = self.token().await?;
        request.insert_header(AUTHORIZATION, &format!("Bearer {token}"));

        next[0].send(ctx, request, &next[1..]).await
    }
}
