//! The endpoint trust gate: before the first request to an endpoint, its
//! advertised login authority is checked against a trusted allowlist.

use crate::cloud_info::CloudInfo;
use crate::error::{Error, ErrorKind, OpKind, Result};
use azure_core::Pipeline;
use futures::lock::Mutex;
use hashbrown::HashSet;
use once_cell::sync::Lazy;

/// Login authorities this client will talk to. A cluster advertising any
/// other authority is rejected before a single request is signed.
const TRUSTED_LOGIN_ENDPOINTS: [&str; 5] = [
    "https://login.microsoftonline.com",
    "https://login.microsoftonline.us",
    "https://login.partner.microsoftonline.cn",
    "https://login.microsoftonline.de",
    "https://login.chinacloudapi.cn",
];

// The lock is held across the metadata fetch, making validation
// once-per-endpoint and race-safe.
static VALIDATED_ENDPOINTS: Lazy<Mutex<HashSet<String>>> =
    Lazy::new(|| Mutex::new(HashSet::new()));

fn matches_authority(login_endpoint: &str, trusted: &str) -> bool {
    let login_endpoint = login_endpoint.trim_end_matches('/');
    login_endpoint.eq_ignore_ascii_case(trusted)
        || login_endpoint
            .to_ascii_lowercase()
            .starts_with(&format!("{trusted}/"))
}

/// Validates an endpoint once per process.
///
/// Fetches the cloud metadata (cached), matches the advertised
/// `LoginEndpoint` against the allowlist, and remembers the verdict;
/// subsequent calls for the same endpoint are no-ops.
pub(crate) async fn validate_endpoint(pipeline: &Pipeline, endpoint: &str) -> Result<()> {
    let mut validated = VALIDATED_ENDPOINTS.lock().await;
    if validated.contains(endpoint) {
        return Ok(());
    }

    let cloud_info = CloudInfo::get(pipeline, endpoint).await?;
    let login_endpoint = cloud_info.login_endpoint.as_ref();
    if !TRUSTED_LOGIN_ENDPOINTS
        .iter()
        .any(|trusted| matches_authority(login_endpoint, trusted))
    {
        return Err(Error::new(
            OpKind::ServConn,
            ErrorKind::ClientArgs,
            format!(
                "endpoint {endpoint} advertises untrusted login authority {login_endpoint}; \
                 refusing to send credentials"
            ),
        ));
    }

    validated.insert(endpoint.to_string());
    tracing::debug!(endpoint, login_endpoint, "endpoint trust validated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use azure_core::ClientOptions;

    fn pipeline() -> Pipeline {
        Pipeline::new(
            option_env!("CARGO_PKG_NAME"),
            option_env!("CARGO_PKG_VERSION"),
            ClientOptions::default(),
            Vec::new(),
            Vec::new(),
        )
    }

    #[test]
    fn authority_matching() {
        assert!(matches_authority(
            "https://login.microsoftonline.com",
            "https://login.microsoftonline.com"
        ));
        assert!(matches_authority(
            "https://login.microsoftonline.com/",
            "https://login.microsoftonline.com"
        ));
        assert!(matches_authority(
            "https://LOGIN.microsoftonline.com/common",
            "https://login.microsoftonline.com"
        ));
        assert!(!matches_authority(
            "https://login.evil.example",
            "https://login.microsoftonline.com"
        ));
        assert!(!matches_authority(
            "https://login.microsoftonline.com.evil.example",
            "https://login.microsoftonline.com"
        ));
    }

    #[tokio::test]
    async fn trusted_metadata_passes_once() {
        let endpoint = "https://trusted.kusto.windows.net";
        CloudInfo::add_to_cache(endpoint, CloudInfo::default()).await;

        validate_endpoint(&pipeline(), endpoint).await.unwrap();
        // Second call short-circuits on the remembered verdict.
        validate_endpoint(&pipeline(), endpoint).await.unwrap();
    }

    #[tokio::test]
    async fn untrusted_metadata_is_rejected() {
        let endpoint = "https://untrusted.kusto.windows.net";
        CloudInfo::add_to_cache(
            endpoint,
            CloudInfo {
                login_endpoint: "https://login.evil.example".into(),
                ..Default::default()
            },
        )
        .await;

        let error = validate_endpoint(&pipeline(), endpoint).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ClientArgs);
        assert_eq!(error.op(), OpKind::ServConn);
    }
}
