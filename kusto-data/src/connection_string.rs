//! Set of properties that can be used in a connection string provided to the client.
//! For a complete list of properties go to [the official docs](https://docs.microsoft.com/en-us/azure/kusto/api/connection-strings/kusto)

use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::credentials::{CallbackTokenCredential, ConstTokenCredential};
use crate::error::{ConnectionStringError, Error, ErrorKind, OpKind};
use azure_core::auth::TokenCredential;
use azure_identity::{
    AzureCliCredential, ClientSecretCredential, DefaultAzureCredential,
    ImdsManagedIdentityCredential, TokenCredentialOptions,
};
use hashbrown::HashMap;
use once_cell::sync::Lazy;

/// A callback that accepts a resource id and returns a token for it.
pub type TokenCallbackFunction = Arc<dyn Fn(&str) -> String + Send + Sync>;
/// A callback invoked with the device code message during the device-code flow.
pub type DeviceCodeFunction = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
enum ConnectionStringKey {
    DataSource,
    FederatedSecurity,
    UserId,
    Password,
    ApplicationClientId,
    ApplicationKey,
    ApplicationCertificate,
    ApplicationCertificateThumbprint,
    AuthorityId,
    ApplicationToken,
    UserToken,
    MsiAuth,
    MsiParams,
    AzCli,
    InteractiveLogin,
}

const CENSORED_VALUE: &str = "******";
const CONNECTION_STRING_TRUE: &str = "True";
const CONNECTION_STRING_FALSE: &str = "False";

impl ConnectionStringKey {
    const fn to_str(self) -> &'static str {
        match self {
            ConnectionStringKey::DataSource => "Data Source",
            ConnectionStringKey::FederatedSecurity => "AAD Federated Security",
            ConnectionStringKey::UserId => "AAD User ID",
            ConnectionStringKey::Password => "Password",
            ConnectionStringKey::ApplicationClientId => "Application Client Id",
            ConnectionStringKey::ApplicationKey => "Application Key",
            ConnectionStringKey::ApplicationCertificate => "ApplicationCertificate",
            ConnectionStringKey::ApplicationCertificateThumbprint => {
                "Application Certificate Thumbprint"
            }
            ConnectionStringKey::AuthorityId => "Authority Id",
            ConnectionStringKey::ApplicationToken => "ApplicationToken",
            ConnectionStringKey::UserToken => "UserToken",
            ConnectionStringKey::MsiAuth => "MSI Authentication",
            ConnectionStringKey::MsiParams => "MSI Params",
            ConnectionStringKey::AzCli => "AZ CLI",
            ConnectionStringKey::InteractiveLogin => "Interactive Login",
        }
    }
}

static ALIAS_MAP: Lazy<HashMap<&'static str, ConnectionStringKey>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("data source", ConnectionStringKey::DataSource);
    m.insert("addr", ConnectionStringKey::DataSource);
    m.insert("address", ConnectionStringKey::DataSource);
    m.insert("network address", ConnectionStringKey::DataSource);
    m.insert("server", ConnectionStringKey::DataSource);

    m.insert(
        "aad federated security",
        ConnectionStringKey::FederatedSecurity,
    );
    m.insert("federated security", ConnectionStringKey::FederatedSecurity);
    m.insert("federated", ConnectionStringKey::FederatedSecurity);
    m.insert("fed", ConnectionStringKey::FederatedSecurity);
    m.insert("aadfed", ConnectionStringKey::FederatedSecurity);

    m.insert("aad user id", ConnectionStringKey::UserId);
    m.insert("user id", ConnectionStringKey::UserId);
    m.insert("uid", ConnectionStringKey::UserId);
    m.insert("user", ConnectionStringKey::UserId);

    m.insert("password", ConnectionStringKey::Password);
    m.insert("pwd", ConnectionStringKey::Password);

    m.insert(
        "application client id",
        ConnectionStringKey::ApplicationClientId,
    );
    m.insert("appclientid", ConnectionStringKey::ApplicationClientId);

    m.insert("application key", ConnectionStringKey::ApplicationKey);
    m.insert("appkey", ConnectionStringKey::ApplicationKey);

    m.insert(
        "application certificate",
        ConnectionStringKey::ApplicationCertificate,
    );

    m.insert(
        "application certificate thumbprint",
        ConnectionStringKey::ApplicationCertificateThumbprint,
    );
    m.insert(
        "appcert",
        ConnectionStringKey::ApplicationCertificateThumbprint,
    );

    m.insert("authority id", ConnectionStringKey::AuthorityId);
    m.insert("authorityid", ConnectionStringKey::AuthorityId);
    m.insert("authority", ConnectionStringKey::AuthorityId);
    m.insert("tenantid", ConnectionStringKey::AuthorityId);
    m.insert("tenant", ConnectionStringKey::AuthorityId);
    m.insert("tid", ConnectionStringKey::AuthorityId);

    m.insert("application token", ConnectionStringKey::ApplicationToken);
    m.insert("apptoken", ConnectionStringKey::ApplicationToken);

    m.insert("user token", ConnectionStringKey::UserToken);
    m.insert("usertoken", ConnectionStringKey::UserToken);

    m.insert("msi auth", ConnectionStringKey::MsiAuth);
    m.insert("msi_auth", ConnectionStringKey::MsiAuth);
    m.insert("msi", ConnectionStringKey::MsiAuth);

    m.insert("msi params", ConnectionStringKey::MsiParams);
    m.insert("msi_params", ConnectionStringKey::MsiParams);
    m.insert("msi_type", ConnectionStringKey::MsiParams);

    m.insert("az cli", ConnectionStringKey::AzCli);

    m.insert("interactive login", ConnectionStringKey::InteractiveLogin);

    m
});

/// A connection string contains the parameters used to connect to a cluster,
/// as well as an authentication method.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionString {
    /// The URI specifying the Kusto service endpoint.
    /// For example, <https://mycluster.kusto.windows.net>.
    pub data_source: String,
    /// Instructs the client to perform Azure Active Directory login.
    pub federated_security: bool,

    /// The authentication method to use.
    pub auth: ConnectionStringAuth,
}

/// Authentication methods to use when connecting to a cluster.
#[derive(Clone)]
pub enum ConnectionStringAuth {
    /// Default credentials - uses the environment (`AZURE_TENANT_ID`,
    /// `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`), managed identity and the
    /// azure cli, in that order. See [`DefaultAzureCredential`].
    Default,
    /// User credentials - uses the user id and password to authenticate.
    UserAndPassword {
        /// The user id to log in with.
        user_id: String,
        /// The password to log in with.
        password: String,
    },
    /// Token - uses a fixed bearer token.
    Token {
        /// The token.
        token: String,
    },
    /// Token callback - a user callback receives the resource id and returns
    /// a token for it.
    TokenCallback {
        /// The callback.
        token_callback: TokenCallbackFunction,
        /// How long a returned token stays valid; unlimited when `None`.
        time_to_live: Option<Duration>,
    },
    /// Application - uses the application client id and key.
    Application {
        /// The application client id.
        client_id: String,
        /// The application key.
        client_secret: String,
        /// The authority (tenant) id.
        client_authority: String,
    },
    /// Certificate - uses an application certificate.
    ApplicationCertificate {
        /// The application client id.
        client_id: String,
        /// A path to the application certificate.
        private_certificate_path: PathBuf,
        /// Thumbprint of the certificate.
        thumbprint: String,
        /// The authority (tenant) id.
        client_authority: String,
    },
    /// MSI - managed identity, user-assigned when `user_id` is given.
    ManagedIdentity {
        /// The user-assigned identity; system-assigned when absent.
        user_id: Option<String>,
    },
    /// Azure CLI - run `az login` first.
    AzureCli,
    /// Device code - the user receives a code to enter on another device.
    DeviceCode {
        /// Callback invoked with the device code message.
        callback: Option<DeviceCodeFunction>,
    },
    /// Interactive - an interactive browser prompt.
    InteractiveLogin,
    /// Any other token credential the caller constructed.
    TokenCredential {
        /// The credential.
        credential: Arc<dyn TokenCredential>,
    },
}

impl ConnectionStringAuth {
    /// Turns the authentication method into its connection-string form.
    /// Methods carrying callbacks or credentials cannot be represented and
    /// yield `None`. `safe` censors secrets.
    #[must_use]
    pub fn build(&self, safe: bool) -> Option<String> {
        match self {
            ConnectionStringAuth::Default => Some(String::new()),
            ConnectionStringAuth::UserAndPassword { user_id, password } => Some(format!(
                "{}={};{}={}",
                ConnectionStringKey::UserId.to_str(),
                user_id,
                ConnectionStringKey::Password.to_str(),
                if safe { CENSORED_VALUE } else { password }
            )),
            ConnectionStringAuth::Token { token } => Some(format!(
                "{}={}",
                ConnectionStringKey::ApplicationToken.to_str(),
                if safe { CENSORED_VALUE } else { token }
            )),
            ConnectionStringAuth::Application {
                client_id,
                client_secret,
                client_authority,
            } => Some(format!(
                "{}={};{}={};{}={}",
                ConnectionStringKey::ApplicationClientId.to_str(),
                client_id,
                ConnectionStringKey::ApplicationKey.to_str(),
                if safe { CENSORED_VALUE } else { client_secret },
                ConnectionStringKey::AuthorityId.to_str(),
                client_authority
            )),
            ConnectionStringAuth::ApplicationCertificate {
                client_id,
                private_certificate_path,
                thumbprint,
                client_authority,
            } => Some(format!(
                "{}={};{}={};{}={};{}={}",
                ConnectionStringKey::ApplicationClientId.to_str(),
                client_id,
                ConnectionStringKey::ApplicationCertificate.to_str(),
                private_certificate_path.display(),
                ConnectionStringKey::ApplicationCertificateThumbprint.to_str(),
                if safe { CENSORED_VALUE } else { thumbprint },
                ConnectionStringKey::AuthorityId.to_str(),
                client_authority
            )),
            ConnectionStringAuth::ManagedIdentity { user_id } => match user_id {
                Some(user_id) => Some(format!(
                    "{}={};{}={}",
                    ConnectionStringKey::MsiAuth.to_str(),
                    CONNECTION_STRING_TRUE,
                    ConnectionStringKey::MsiParams.to_str(),
                    user_id,
                )),
                None => Some(format!(
                    "{}={}",
                    ConnectionStringKey::MsiAuth.to_str(),
                    CONNECTION_STRING_TRUE
                )),
            },
            ConnectionStringAuth::AzureCli => Some(format!(
                "{}={}",
                ConnectionStringKey::AzCli.to_str(),
                CONNECTION_STRING_TRUE
            )),
            ConnectionStringAuth::InteractiveLogin => Some(format!(
                "{}={}",
                ConnectionStringKey::InteractiveLogin.to_str(),
                CONNECTION_STRING_TRUE
            )),
            _ => None,
        }
    }

    /// Turns the authentication method into a live credential.
    ///
    /// Flows that need interactive infrastructure this crate does not carry
    /// (user/password, certificates, device code, interactive login) are
    /// rejected with a structured error; pass a prepared
    /// [ConnectionStringAuth::TokenCredential] instead.
    pub fn into_credential(self) -> Result<Arc<dyn TokenCredential>, Error> {
        match self {
            ConnectionStringAuth::Default => Ok(Arc::new(DefaultAzureCredential::default())),
            ConnectionStringAuth::Token { token } => Ok(Arc::new(ConstTokenCredential { token })),
            ConnectionStringAuth::TokenCallback {
                token_callback,
                time_to_live,
            } => Ok(Arc::new(CallbackTokenCredential {
                token_callback,
                time_to_live,
            })),
            ConnectionStringAuth::Application {
                client_id,
                client_secret,
                client_authority,
            } => Ok(Arc::new(ClientSecretCredential::new(
                azure_core::new_http_client(),
                client_authority,
                client_id,
                client_secret,
                TokenCredentialOptions::default(),
            ))),
            ConnectionStringAuth::ManagedIdentity { user_id } => match user_id {
                Some(user_id) => Ok(Arc::new(
                    ImdsManagedIdentityCredential::default().with_object_id(user_id),
                )),
                None => Ok(Arc::new(ImdsManagedIdentityCredential::default())),
            },
            ConnectionStringAuth::AzureCli => Ok(Arc::new(AzureCliCredential::new())),
            ConnectionStringAuth::TokenCredential { credential } => Ok(credential),
            unsupported => Err(Error::new(
                OpKind::ServConn,
                ErrorKind::ClientArgs,
                format!(
                    "the {unsupported:?} authentication flow needs a caller-provided credential"
                ),
            )),
        }
    }
}

impl PartialEq for ConnectionStringAuth {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConnectionStringAuth::Default, ConnectionStringAuth::Default)
            | (ConnectionStringAuth::AzureCli, ConnectionStringAuth::AzureCli)
            | (ConnectionStringAuth::InteractiveLogin, ConnectionStringAuth::InteractiveLogin) => {
                true
            }
            (
                ConnectionStringAuth::UserAndPassword {
                    user_id: u1,
                    password: p1,
                },
                ConnectionStringAuth::UserAndPassword {
                    user_id: u2,
                    password: p2,
                },
            ) => u1 == u2 && p1 == p2,
            (
                ConnectionStringAuth::Token { token: t1 },
                ConnectionStringAuth::Token { token: t2 },
            ) => t1 == t2,
            (
                ConnectionStringAuth::Application {
                    client_id: c1,
                    client_secret: s1,
                    client_authority: a1,
                },
                ConnectionStringAuth::Application {
                    client_id: c2,
                    client_secret: s2,
                    client_authority: a2,
                },
            ) => c1 == c2 && s1 == s2 && a1 == a2,
            (
                ConnectionStringAuth::ApplicationCertificate {
                    client_id: c1,
                    private_certificate_path: p1,
                    thumbprint: t1,
                    client_authority: a1,
                },
                ConnectionStringAuth::ApplicationCertificate {
                    client_id: c2,
                    private_certificate_path: p2,
                    thumbprint: t2,
                    client_authority: a2,
                },
            ) => c1 == c2 && p1 == p2 && t1 == t2 && a1 == a2,
            (
                ConnectionStringAuth::ManagedIdentity { user_id: u1 },
                ConnectionStringAuth::ManagedIdentity { user_id: u2 },
            ) => u1 == u2,
            _ => false,
        }
    }
}

impl Debug for ConnectionStringAuth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStringAuth::Default => write!(f, "Default"),
            ConnectionStringAuth::UserAndPassword { user_id, .. } => {
                write!(f, "UserAndPassword({}, {})", user_id, CENSORED_VALUE)
            }
            ConnectionStringAuth::Token { .. } => write!(f, "Token({})", CENSORED_VALUE),
            ConnectionStringAuth::TokenCallback { .. } => write!(f, "TokenCallback"),
            ConnectionStringAuth::Application {
                client_id,
                client_authority,
                ..
            } => write!(
                f,
                "Application({}, {}, {})",
                client_id, client_authority, CENSORED_VALUE
            ),
            ConnectionStringAuth::ApplicationCertificate {
                client_id,
                client_authority,
                private_certificate_path,
                ..
            } => {
                write!(
                    f,
                    "ApplicationCertificate({}, {}, {}, {})",
                    client_id,
                    client_authority,
                    CENSORED_VALUE,
                    private_certificate_path.display()
                )
            }
            ConnectionStringAuth::ManagedIdentity { user_id } => {
                write!(
                    f,
                    "ManagedIdentity({})",
                    user_id.as_deref().unwrap_or("<none>")
                )
            }
            ConnectionStringAuth::AzureCli => write!(f, "AzureCli"),
            ConnectionStringAuth::DeviceCode { .. } => write!(f, "DeviceCode"),
            ConnectionStringAuth::InteractiveLogin => write!(f, "InteractiveLogin"),
            ConnectionStringAuth::TokenCredential { .. } => write!(f, "TokenCredential"),
        }
    }
}

impl ConnectionString {
    /// Parses a raw connection string: semicolon-separated `key=value`
    /// pairs, keys case- and space-insensitive.
    ///
    /// The leading pair may be a bare value, in which case it is the data
    /// source. Any unrecognised key is rejected.
    ///
    /// # Examples
    /// ```rust
    /// use kusto_data::prelude::*;
    /// # fn main() -> Result<(), kusto_data::error::ConnectionStringError> {
    /// let connection_string = ConnectionString::from_raw_connection_string(
    ///     "https://mycluster.kusto.windows.net ; AppClientId=f6f295b1-0ce0-41f1-bba3-735accac0c69; Appkey =1234;Tenant= 25184ef2-1dc0-4b05-84ae-f505bf7964f4 ; fed = True")?;
    ///
    /// assert_eq!(connection_string.data_source, "https://mycluster.kusto.windows.net");
    /// assert!(connection_string.federated_security);
    /// assert!(matches!(connection_string.auth, ConnectionStringAuth::Application { .. }));
    /// # Ok(()) }
    /// ```
    pub fn from_raw_connection_string(
        connection_string: &str,
    ) -> Result<Self, ConnectionStringError> {
        let kv_str_pairs = connection_string
            .split(';')
            .filter(|s| !s.chars().all(char::is_whitespace));

        let mut result_map = HashMap::<ConnectionStringKey, &str>::new();

        for (i, kv_pair_str) in kv_str_pairs.enumerate() {
            let kv_pair_str = kv_pair_str.trim();
            let mut kv = kv_pair_str.split('=');
            let k = match kv.next().filter(|k| !k.chars().all(char::is_whitespace)) {
                None => {
                    return Err(ConnectionStringError::from_parsing_error("No key found"));
                }
                Some(k) => k,
            };
            let v = match kv.next().filter(|v| !v.chars().all(char::is_whitespace)) {
                None if i == 0 && !kv_pair_str.contains('=') => {
                    // The leading pair may omit "Data Source=".
                    result_map.insert(ConnectionStringKey::DataSource, kv_pair_str);
                    continue;
                }
                None => return Err(ConnectionStringError::from_missing_value(k.trim())),
                Some(v) => v,
            };

            if let Some(&key) = ALIAS_MAP.get(k.to_ascii_lowercase().trim()) {
                result_map.insert(key, v.trim());
            } else {
                return Err(ConnectionStringError::from_unexpected_key(k.trim()));
            }
        }

        let data_source = (*result_map.get(&ConnectionStringKey::DataSource).ok_or(
            ConnectionStringError::MissingValue {
                key: "Data Source".to_string(),
            },
        )?)
        .to_string();

        let federated_security = result_map
            .get(&ConnectionStringKey::FederatedSecurity)
            .map_or(Ok(false), |s| parse_boolean(s, "federated_security"))?;

        let auth = if let Some(user_id) = result_map.get(&ConnectionStringKey::UserId) {
            let password = result_map
                .get(&ConnectionStringKey::Password)
                .ok_or_else(|| ConnectionStringError::from_missing_value("password"))?;
            ConnectionStringAuth::UserAndPassword {
                user_id: (*user_id).to_string(),
                password: (*password).to_string(),
            }
        } else if let Some(token) = result_map
            .get(&ConnectionStringKey::ApplicationToken)
            .or_else(|| result_map.get(&ConnectionStringKey::UserToken))
        {
            ConnectionStringAuth::Token {
                token: (*token).to_string(),
            }
        } else if let Some(certificate_path) =
            result_map.get(&ConnectionStringKey::ApplicationCertificate)
        {
            let client_id = result_map
                .get(&ConnectionStringKey::ApplicationClientId)
                .ok_or_else(|| ConnectionStringError::from_missing_value("application_client_id"))?;
            let thumbprint = result_map
                .get(&ConnectionStringKey::ApplicationCertificateThumbprint)
                .ok_or_else(|| {
                    ConnectionStringError::from_missing_value("application_certificate_thumbprint")
                })?;
            let client_authority = result_map
                .get(&ConnectionStringKey::AuthorityId)
                .ok_or_else(|| ConnectionStringError::from_missing_value("authority_id"))?;
            ConnectionStringAuth::ApplicationCertificate {
                client_id: (*client_id).to_string(),
                private_certificate_path: PathBuf::from(certificate_path),
                thumbprint: (*thumbprint).to_string(),
                client_authority: (*client_authority).to_string(),
            }
        } else if let Some(client_id) = result_map.get(&ConnectionStringKey::ApplicationClientId) {
            let client_secret = result_map
                .get(&ConnectionStringKey::ApplicationKey)
                .ok_or_else(|| ConnectionStringError::from_missing_value("application_key"))?;
            let client_authority = result_map
                .get(&ConnectionStringKey::AuthorityId)
                .ok_or_else(|| ConnectionStringError::from_missing_value("authority_id"))?;
            ConnectionStringAuth::Application {
                client_id: (*client_id).to_string(),
                client_secret: (*client_secret).to_string(),
                client_authority: (*client_authority).to_string(),
            }
        } else if result_map
            .get(&ConnectionStringKey::MsiAuth)
            .map(|s| parse_boolean(s, "msi_auth"))
            .transpose()?
            == Some(true)
        {
            ConnectionStringAuth::ManagedIdentity {
                user_id: result_map
                    .get(&ConnectionStringKey::MsiParams)
                    .map(|s| (*s).to_string()),
            }
        } else if result_map
            .get(&ConnectionStringKey::AzCli)
            .map(|s| parse_boolean(s, "az_cli"))
            .transpose()?
            == Some(true)
        {
            ConnectionStringAuth::AzureCli
        } else if result_map
            .get(&ConnectionStringKey::InteractiveLogin)
            .map(|s| parse_boolean(s, "interactive_login"))
            .transpose()?
            == Some(true)
        {
            ConnectionStringAuth::InteractiveLogin
        } else {
            ConnectionStringAuth::Default
        };

        Ok(Self {
            data_source,
            federated_security,
            auth,
        })
    }

    /// Creates a connection string with the default credential chain:
    /// environment, managed identity, azure cli.
    #[must_use]
    pub fn with_default_auth(data_source: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            federated_security: true,
            auth: ConnectionStringAuth::Default,
        }
    }

    /// Creates a connection string with user and password authentication.
    #[must_use]
    pub fn with_user_password_auth(
        data_source: impl Into<String>,
        user_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            data_source: data_source.into(),
            federated_security: true,
            auth: ConnectionStringAuth::UserAndPassword {
                user_id: user_id.into(),
                password: password.into(),
            },
        }
    }

    /// Creates a connection string using a fixed bearer token.
    #[must_use]
    pub fn with_token_auth(data_source: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            federated_security: true,
            auth: ConnectionStringAuth::Token {
                token: token.into(),
            },
        }
    }

    /// Creates a connection string that authenticates using a caller
    /// callback receiving the resource id.
    #[must_use]
    pub fn with_token_callback_auth(
        data_source: impl Into<String>,
        token_callback: TokenCallbackFunction,
        time_to_live: Option<Duration>,
    ) -> Self {
        Self {
            data_source: data_source.into(),
            federated_security: true,
            auth: ConnectionStringAuth::TokenCallback {
                token_callback,
                time_to_live,
            },
        }
    }

    /// Creates a connection string that authenticates using application id
    /// and secret.
    #[must_use]
    pub fn with_application_auth(
        data_source: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        client_authority: impl Into<String>,
    ) -> Self {
        Self {
            data_source: data_source.into(),
            federated_security: true,
            auth: ConnectionStringAuth::Application {
                client_id: client_id.into(),
                client_secret: client_secret.into(),
                client_authority: client_authority.into(),
            },
        }
    }

    /// Creates a connection string that authenticates using managed
    /// identity; user-assigned when `user_id` is given.
    #[must_use]
    pub fn with_managed_identity_auth(
        data_source: impl Into<String>,
        user_id: impl Into<Option<String>>,
    ) -> Self {
        Self {
            data_source: data_source.into(),
            federated_security: true,
            auth: ConnectionStringAuth::ManagedIdentity {
                user_id: user_id.into(),
            },
        }
    }

    /// Creates a connection string that authenticates using the azure cli.
    #[must_use]
    pub fn with_azure_cli_auth(data_source: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            federated_security: true,
            auth: ConnectionStringAuth::AzureCli,
        }
    }

    /// Creates a connection string carrying any prepared token credential.
    #[must_use]
    pub fn with_token_credential(
        data_source: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
    ) -> Self {
        Self {
            data_source: data_source.into(),
            federated_security: true,
            auth: ConnectionStringAuth::TokenCredential { credential },
        }
    }

    /// Builds the connection string, censoring secrets.
    #[must_use]
    pub fn build(&self) -> Option<String> {
        self.build_with_options(true, false)
    }

    /// Builds the connection string, controlling secret censoring and
    /// whether the authentication part is included.
    #[must_use]
    pub fn build_with_options(&self, safe: bool, ignore_auth: bool) -> Option<String> {
        let mut s = format!(
            "{}={};{}={}",
            ConnectionStringKey::DataSource.to_str(),
            self.data_source,
            ConnectionStringKey::FederatedSecurity.to_str(),
            if self.federated_security {
                CONNECTION_STRING_TRUE
            } else {
                CONNECTION_STRING_FALSE
            }
        );
        if !ignore_auth {
            s.push(';');
            s.push_str(&self.auth.build(safe)?);
        }

        Some(s)
    }

    pub(crate) fn into_data_source_and_auth(self) -> (String, ConnectionStringAuth) {
        (self.data_source, self.auth)
    }
}

fn parse_boolean(term: &str, name: &str) -> Result<bool, ConnectionStringError> {
    match term.to_lowercase().trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConnectionStringError::from_parsing_error(format!(
            "Unexpected value for {}: {}. Please specify either 'true' or 'false'.",
            name, term
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_returns_expected_errors() {
        assert!(matches!(
            ConnectionString::from_raw_connection_string("Data Source=;fed=True"),
            Err(ConnectionStringError::MissingValue { key }) if key == "Data Source"
        ));
        assert!(matches!(
            ConnectionString::from_raw_connection_string("="),
            Err(ConnectionStringError::Parsing { msg: _ })
        ));
        assert!(matches!(
            ConnectionString::from_raw_connection_string("x=123;"),
            Err(ConnectionStringError::UnexpectedKey { key }) if key == "x"
        ));
    }

    #[test]
    fn it_parses_basic_cases() {
        assert_eq!(
            ConnectionString::from_raw_connection_string("Data Source=ds"),
            Ok(ConnectionString {
                data_source: "ds".to_string(),
                federated_security: false,
                auth: ConnectionStringAuth::Default,
            })
        );
        assert_eq!(
            ConnectionString::from_raw_connection_string("addr=ds"),
            Ok(ConnectionString {
                data_source: "ds".to_string(),
                federated_security: false,
                auth: ConnectionStringAuth::Default,
            })
        );
        assert_eq!(
            ConnectionString::from_raw_connection_string(
                "Data Source=ds;Application Client Id=cid;Application Key=key;Tenant=tid",
            ),
            Ok(ConnectionString {
                data_source: "ds".to_string(),
                federated_security: false,
                auth: ConnectionStringAuth::Application {
                    client_id: "cid".to_string(),
                    client_secret: "key".to_string(),
                    client_authority: "tid".to_string(),
                },
            })
        );
        assert_eq!(
            ConnectionString::from_raw_connection_string(
                "Data Source=ds;Federated=True;AppToken=token"
            ),
            Ok(ConnectionString {
                data_source: "ds".to_string(),
                federated_security: true,
                auth: ConnectionStringAuth::Token {
                    token: "token".to_string()
                },
            })
        );
    }

    #[test]
    fn leading_bare_value_is_the_data_source() {
        assert_eq!(
            ConnectionString::from_raw_connection_string(
                "https://mycluster.kusto.windows.net;fed=True"
            ),
            Ok(ConnectionString {
                data_source: "https://mycluster.kusto.windows.net".to_string(),
                federated_security: true,
                auth: ConnectionStringAuth::Default,
            })
        );
    }

    #[test]
    fn keys_are_case_and_space_insensitive() {
        let parsed = ConnectionString::from_raw_connection_string(
            "Data Source=localhost ; AppClientId=cid; Appkey =1234;Authority Id= tid ; aad federated security = True",
        )
        .unwrap();
        assert_eq!(parsed.data_source, "localhost");
        assert!(parsed.federated_security);
        assert_eq!(
            parsed.auth,
            ConnectionStringAuth::Application {
                client_id: "cid".to_string(),
                client_secret: "1234".to_string(),
                client_authority: "tid".to_string(),
            }
        );
    }

    #[test]
    fn build_censors_secrets() {
        let conn = ConnectionString::with_user_password_auth(
            "https://mycluster.kusto.windows.net",
            "user",
            "password",
        );
        assert_eq!(
            conn.build(),
            Some(
                "Data Source=https://mycluster.kusto.windows.net;AAD Federated Security=True;AAD User ID=user;Password=******"
                    .to_string()
            )
        );
        assert_eq!(
            conn.build_with_options(false, false),
            Some(
                "Data Source=https://mycluster.kusto.windows.net;AAD Federated Security=True;AAD User ID=user;Password=password"
                    .to_string()
            )
        );
    }

    #[test]
    fn unsupported_flows_are_structured_errors() {
        let auth = ConnectionStringAuth::InteractiveLogin;
        let err = auth.into_credential().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ClientArgs);
    }
}
