//! The tracing identity sent with every request: the `x-ms-app`,
//! `x-ms-user` and `x-ms-client-version` header values.
//!
//! Values follow the service's tracing grammar: `name:{value}` fields
//! joined by `|`, with braces, pipes and whitespace collapsed inside the
//! value so the header stays parseable.

use std::borrow::Cow;
use std::sync::OnceLock;

/// The resolved tracing identity of this client process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ClientDetails {
    pub application: String,
    pub user: String,
    pub version: String,
}

impl ClientDetails {
    pub(crate) fn new(application: Option<String>, user: Option<String>) -> Self {
        ClientDetails {
            application: application.unwrap_or_else(|| process_name().to_string()),
            user: user.unwrap_or_else(|| process_user().to_string()),
            version: version_header().to_string(),
        }
    }
}

const UNKNOWN: &str = "unknown";
const NO_USER: &str = "[none]";

/// Wraps a field value in braces, replacing every run of characters the
/// grammar reserves (whitespace, braces, pipes) with a single underscore.
fn bracketed(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('{');
    let mut in_run = false;
    for c in value.chars() {
        if c.is_whitespace() || matches!(c, '{' | '}' | '|' | '\r' | '\n') {
            if !in_run {
                out.push('_');
                in_run = true;
            }
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out.push('}');
    out
}

/// Renders `name:{value}` fields joined by `|`.
fn render_fields<'a>(fields: impl IntoIterator<Item = (Cow<'a, str>, Cow<'a, str>)>) -> String {
    let mut out = String::new();
    for (name, value) in fields {
        if !out.is_empty() {
            out.push('|');
        }
        out.push_str(&name);
        out.push(':');
        out.push_str(&bracketed(&value));
    }
    out
}

/// The user this process runs as, in `domain\user` form when a domain is
/// set.
fn process_user() -> &'static str {
    static USER: OnceLock<String> = OnceLock::new();
    USER.get_or_init(|| {
        let user = std::env::var("USERNAME");
        match (std::env::var("USERDOMAIN"), user) {
            (Ok(domain), Ok(user)) => format!("{domain}\\{user}"),
            (_, Ok(user)) => user,
            _ => UNKNOWN.to_string(),
        }
    })
}

/// The executable name of this process.
fn process_name() -> &'static str {
    static NAME: OnceLock<String> = OnceLock::new();
    NAME.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| UNKNOWN.to_string())
    })
}

/// The `x-ms-client-version` value: this crate and the platform it runs on.
fn version_header() -> &'static str {
    static VERSION: OnceLock<String> = OnceLock::new();
    VERSION.get_or_init(|| {
        render_fields([
            (
                concat!("Kusto.", env!("CARGO_PKG_NAME")).into(),
                env!("CARGO_PKG_VERSION").into(),
            ),
            ("Os".into(), std::env::consts::OS.into()),
            ("Arch".into(), std::env::consts::ARCH.into()),
        ])
    })
}

/// The identity of a connector embedding this client, e.g. a data
/// integration runtime, reported in place of the process defaults.
#[derive(Default, Debug, Clone, PartialEq, Eq, derive_builder::Builder)]
#[builder(setter(into, strip_option, prefix = "with"), default)]
pub struct ConnectorDetails<'a> {
    /// Connector name.
    name: &'a str,
    /// Connector version.
    version: &'a str,
    /// Whether to send user details.
    send_user: bool,
    /// Override default user.
    override_user: Option<&'a str>,
    /// Name of the containing application.
    app_name: Option<&'a str>,
    /// Version of the containing application.
    app_version: Option<&'a str>,
    /// Additional fields to add to the header.
    additional_fields: Vec<(&'a str, &'a str)>,
}

impl<'a> ConnectorDetails<'a> {
    /// Resolves the `(application, user)` pair to report for this connector.
    pub(crate) fn identity(self) -> (String, String) {
        let ConnectorDetails {
            name,
            version,
            send_user,
            override_user,
            app_name,
            app_version,
            additional_fields,
        } = self;

        let app_name = app_name.unwrap_or_else(|| process_name());
        let mut fields: Vec<(Cow<str>, Cow<str>)> = vec![
            (format!("Kusto.{name}").into(), version.into()),
            (
                format!("App.{}", bracketed(app_name)).into(),
                app_version.unwrap_or(UNKNOWN).into(),
            ),
        ];
        fields.extend(
            additional_fields
                .into_iter()
                .map(|(name, value)| (name.into(), value.into())),
        );

        let user = match (send_user, override_user) {
            (false, _) => NO_USER,
            (true, Some(user)) => user,
            (true, None) => process_user(),
        };

        (render_fields(fields), user.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracketing_collapses_reserved_runs() {
        assert_eq!(bracketed(""), "{}");
        assert_eq!(bracketed("abc"), "{abc}");
        assert_eq!(bracketed("ab c"), "{ab_c}");
        assert_eq!(bracketed("ab \t c"), "{ab_c}");
        assert_eq!(bracketed("ab|c"), "{ab_c}");
        assert_eq!(bracketed("ab{}c"), "{ab_c}");
        assert_eq!(bracketed("a_b"), "{a_b}");
    }

    #[test]
    fn field_rendering() {
        assert_eq!(render_fields([(Cow::from("a"), Cow::from("b"))]), "a:{b}");
        assert_eq!(
            render_fields([
                (Cow::from("a"), Cow::from("b")),
                (Cow::from("c"), Cow::from("d"))
            ]),
            "a:{b}|c:{d}"
        );
    }

    #[test]
    fn overrides_take_precedence_over_process_defaults() {
        let details = ClientDetails::new(Some("my_app".to_string()), Some("my_user".to_string()));
        assert_eq!(details.application, "my_app");
        assert_eq!(details.user, "my_user");
        assert_eq!(details.version, version_header());

        let defaults = ClientDetails::new(None, None);
        assert_eq!(defaults.application, process_name());
        assert_eq!(defaults.user, process_user());
    }

    #[test]
    fn version_header_names_this_crate() {
        assert!(version_header().starts_with("Kusto.kusto-data:{"));
        assert!(version_header().contains("|Os:{"));
        assert!(version_header().contains("|Arch:{"));
    }

    #[test]
    fn connector_identity_with_user() {
        let details = ConnectorDetailsBuilder::default()
            .with_name("MyConnector")
            .with_version("1.0")
            .with_send_user(true)
            .with_override_user("user1")
            .with_app_name("MyApp")
            .with_app_version("1.0.1")
            .with_additional_fields(vec![("key1", "value1")])
            .build()
            .unwrap();

        let (application, user) = details.identity();
        assert_eq!(
            application,
            "Kusto.MyConnector:{1.0}|App.{MyApp}:{1.0.1}|key1:{value1}"
        );
        assert_eq!(user, "user1");
    }

    #[test]
    fn connector_identity_without_user() {
        let details = ConnectorDetailsBuilder::default()
            .with_name("MyConnector")
            .with_version("1.0")
            .build()
            .unwrap();

        let (application, user) = details.identity();
        assert!(application.starts_with("Kusto.MyConnector:{1.0}|App."));
        assert_eq!(user, "[none]");
    }

    #[test]
    fn connector_app_version_defaults_to_unknown() {
        let details = ConnectorDetailsBuilder::default()
            .with_name("MyConnector")
            .with_version("1.0")
            .with_app_name("MyApp")
            .build()
            .unwrap();

        let (application, _) = details.identity();
        assert!(application.contains("App.{MyApp}:{unknown}"));
    }
}
