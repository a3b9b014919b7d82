//! Defines [Error] for representing failures in various operations.

use azure_core::StatusCode;
use std::fmt::{Debug, Display, Formatter};

/// The operation that was being performed when the error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OpKind {
    /// The operation is unknown or was not set.
    #[default]
    Unknown,
    /// A KQL query against `/v2/rest/query`.
    Query,
    /// A management command against `/v1/rest/mgmt`.
    Mgmt,
    /// Connecting to the service or validating the endpoint.
    ServConn,
    /// Ingestion from a file, reader or blob through the queued path.
    FileIngest,
    /// Ingestion through the streaming endpoint.
    IngestStream,
}

impl Display for OpKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OpKind::Unknown => "Op(Unknown)",
            OpKind::Query => "Op(Query)",
            OpKind::Mgmt => "Op(Mgmt)",
            OpKind::ServConn => "Op(ServConn)",
            OpKind::FileIngest => "Op(FileIngest)",
            OpKind::IngestStream => "Op(IngestStream)",
        };
        f.write_str(s)
    }
}

/// Classifies an [Error] into one of the failure categories the service and
/// client report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorKind {
    /// Any error that does not fit another category.
    #[default]
    Other,
    /// An error doing IO against the network or a stream.
    Io,
    /// A violation of the response protocol, or a bug in this crate.
    Internal,
    /// The requested database does not exist.
    DbNotExist,
    /// The request timed out, either locally or server-side.
    Timeout,
    /// The service rejected the request for exceeding query limits.
    LimitsExceeded,
    /// The service throttled the request.
    Throttled,
    /// The caller provided invalid arguments.
    ClientArgs,
    /// A client-side invariant was violated.
    ClientInternal,
    /// The service returned a non-success HTTP status.
    HttpError,
    /// An error talking to blob storage.
    Blobstore,
    /// An error reading the local file system.
    LocalFileSystem,
}

impl ErrorKind {
    /// Whether this kind, on its own, is a candidate for retry.
    const fn retryable(self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::Throttled)
    }

    /// Whether this kind is permanent regardless of what the service says.
    const fn permanent(self) -> bool {
        matches!(
            self,
            ErrorKind::ClientArgs
                | ErrorKind::DbNotExist
                | ErrorKind::LimitsExceeded
                | ErrorKind::Internal
        )
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Other => "Kind(Other)",
            ErrorKind::Io => "Kind(IO)",
            ErrorKind::Internal => "Kind(Internal)",
            ErrorKind::DbNotExist => "Kind(DBNotExist)",
            ErrorKind::Timeout => "Kind(Timeout)",
            ErrorKind::LimitsExceeded => "Kind(LimitsExceeded)",
            ErrorKind::Throttled => "Kind(Throttled)",
            ErrorKind::ClientArgs => "Kind(ClientArgs)",
            ErrorKind::ClientInternal => "Kind(ClientInternal)",
            ErrorKind::HttpError => "Kind(HTTPError)",
            ErrorKind::Blobstore => "Kind(Blobstore)",
            ErrorKind::LocalFileSystem => "Kind(LocalFileSystem)",
        };
        f.write_str(s)
    }
}

/// Suffix appended to limit-violation messages, pointing at the service docs.
const LIMITS_DOC_SUFFIX: &str =
    ";See https://docs.microsoft.com/en-us/azure/kusto/concepts/querylimits";

/// Structured error for all Kusto operations.
///
/// Errors form a singly linked chain via [Error::inner]; the tail of the
/// chain is the root cause. [Error::is_retryable] classifies the whole chain.
pub struct Error {
    op: OpKind,
    kind: ErrorKind,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    inner: Option<Box<Error>>,
    permanent: bool,
    status: Option<StatusCode>,
    rest_payload: Option<bytes::Bytes>,
}

impl Error {
    /// Creates a new error with the given operation, kind and message.
    /// The message must not be empty; wrap an underlying error with
    /// [Error::wrapping] when there is no message of its own.
    pub fn new(op: OpKind, kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        debug_assert!(!message.is_empty(), "errors require a message");
        Self {
            op,
            kind,
            message,
            source: None,
            inner: None,
            permanent: kind.permanent(),
            status: None,
            rest_payload: None,
        }
    }

    /// Creates a new error wrapping an arbitrary underlying error.
    pub fn wrapping(
        op: OpKind,
        kind: ErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        let message = source.to_string();
        Self {
            source: Some(Box::new(source)),
            ..Self::new(op, kind, message)
        }
    }

    /// Chains `inner` below this error. The existing chain of `inner`
    /// is preserved.
    #[must_use]
    pub fn with_inner(mut self, inner: Error) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    /// Overrides the permanence classification derived from the kind.
    #[must_use]
    pub fn with_permanence(mut self, permanent: bool) -> Self {
        self.permanent = permanent;
        self
    }

    /// Rebinds the operation; used when an error crosses a subsystem
    /// boundary that knows what was actually being attempted.
    #[must_use]
    pub fn with_op(mut self, op: OpKind) -> Self {
        self.op = op;
        self
    }

    /// Creates an HTTP error from a non-success status and the captured body.
    ///
    /// The body is truncated to a short bound and scanned for the OneApi
    /// `@permanent` marker, which overrides the default (retryable)
    /// classification.
    pub fn http(op: OpKind, status: StatusCode, body: &[u8]) -> Self {
        const CAPTURE_BOUND: usize = 4096;
        let captured = &body[..body.len().min(CAPTURE_BOUND)];
        let permanent = serde_json::from_slice::<serde_json::Value>(captured)
            .ok()
            .as_ref()
            .and_then(|v| v.get("error"))
            .and_then(|e| e.get("@permanent"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        let mut err = Self::new(
            op,
            ErrorKind::HttpError,
            format!(
                "http error: status {}: {}",
                status,
                String::from_utf8_lossy(captured)
            ),
        )
        .with_permanence(permanent);
        err.status = Some(status);
        err.rest_payload = Some(bytes::Bytes::copy_from_slice(captured));
        err
    }

    /// The operation that failed.
    pub fn op(&self) -> OpKind {
        self.op
    }

    /// The failure category.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The error message, without the chain.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The next error in the chain, if any.
    pub fn inner(&self) -> Option<&Error> {
        self.inner.as_deref()
    }

    /// The HTTP status, when the error came from a non-success response.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// The captured (truncated) REST error body, when present.
    pub fn rest_payload(&self) -> Option<&[u8]> {
        self.rest_payload.as_deref()
    }

    /// Iterates the chain from this error down to the root cause.
    pub fn chain(&self) -> impl Iterator<Item = &Error> {
        std::iter::successors(Some(self), |e| e.inner())
    }

    fn payload_says_retryable(&self) -> bool {
        let Some(payload) = self.rest_payload.as_deref() else {
            return false;
        };
        serde_json::from_slice::<serde_json::Value>(payload)
            .ok()
            .as_ref()
            .and_then(|v| v.get("error"))
            .and_then(|e| e.get("@permanent"))
            .and_then(serde_json::Value::as_bool)
            .map(|permanent| !permanent)
            .unwrap_or(false)
    }

    /// Whether the whole chain may be retried.
    ///
    /// True iff this error is not permanent, its kind is retryable (or its
    /// REST payload carries `@permanent: false`), and every inner error is
    /// itself retryable. An HTTP error without a permanence marker in its
    /// body is retryable: permanence must be asserted, never assumed.
    pub fn is_retryable(&self) -> bool {
        if self.permanent {
            return false;
        }
        let kind_allows = self.kind.retryable() || self.kind == ErrorKind::HttpError;
        if !(kind_allows || self.payload_says_retryable()) {
            return false;
        }
        match self.inner() {
            Some(inner) => inner.is_retryable(),
            None => true,
        }
    }

    /// Translates a OneApi error list (the JSON `OneApiErrors` array) into a
    /// chained [Error], preserving order: the first element becomes the head.
    ///
    /// Returns `None` when no element carries an `error.message`.
    pub fn from_one_api_errors(op: OpKind, errors: &serde_json::Value) -> Option<Self> {
        let list = errors.as_array()?;
        let mut chain: Option<Error> = None;
        for element in list.iter().rev() {
            let Some(error) = element.get("error") else {
                continue;
            };
            let Some(message) = error.get("message").and_then(serde_json::Value::as_str) else {
                continue;
            };
            let code = error
                .get("code")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            let (kind, message) = match code {
                "LimitsExceeded" => (
                    ErrorKind::LimitsExceeded,
                    format!("{message}{LIMITS_DOC_SUFFIX}"),
                ),
                _ => (ErrorKind::Other, message.to_string()),
            };
            let err = Error::new(op, kind, message);
            chain = Some(match chain {
                Some(tail) => err.with_inner(tail),
                None => err,
            });
        }
        chain
    }
}

impl Clone for Error {
    /// Clones the structured fields and the inner chain. The opaque wrapped
    /// source is not cloneable; its text already lives in [Error::message].
    fn clone(&self) -> Self {
        Self {
            op: self.op,
            kind: self.kind,
            message: self.message.clone(),
            source: None,
            inner: self.inner.clone(),
            permanent: self.permanent,
            status: self.status,
            rest_payload: self.rest_payload.clone(),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}: {}", self.op, self.kind, self.message)?;
        if let Some(inner) = self.inner() {
            write!(f, ": {inner}")?;
        }
        Ok(())
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Error")
            .field("op", &self.op)
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("permanent", &self.permanent)
            .field("status", &self.status)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Some(inner) = self.inner.as_deref() {
            return Some(inner);
        }
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Self::wrapping(OpKind::Unknown, ErrorKind::ClientInternal, e)
    }
}

impl From<ConnectionStringError> for Error {
    fn from(e: ConnectionStringError) -> Self {
        Self::wrapping(OpKind::Unknown, ErrorKind::ClientArgs, e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::wrapping(OpKind::Unknown, ErrorKind::Internal, e)
    }
}

impl From<azure_core::error::Error> for Error {
    fn from(e: azure_core::error::Error) -> Self {
        Self::wrapping(OpKind::Unknown, ErrorKind::Io, e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::wrapping(OpKind::Unknown, ErrorKind::Io, e)
    }
}

/// Errors raised when parsing values.
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    /// Raised when a value is null, but the destination is not nullable.
    #[error("Error converting null value for {0}")]
    ValueNull(String),
    /// Raised when an int value is failed to be parsed.
    #[error("Error parsing int: {0}")]
    Int(#[from] std::num::ParseIntError),
    /// Raised when a real value is failed to be parsed.
    #[error("Error parsing real: {0}")]
    Float(#[from] std::num::ParseFloatError),
    /// Raised when a bool value is failed to be parsed.
    #[error("Error parsing bool: {0}")]
    Bool(#[from] std::str::ParseBoolError),
    /// Raised when a timespan value is failed to be parsed.
    #[error("Error parsing timespan: {0}")]
    Timespan(String),
    /// Raised when a datetime value is failed to be parsed.
    #[error("Error parsing datetime: {0}")]
    DateTime(#[from] time::error::Parse),
    /// Raised when a guid value is failed to be parsed.
    #[error("Error parsing guid: {0}")]
    Guid(#[from] uuid::Error),
    /// Raised when a decimal value is failed to be parsed.
    #[error("Error parsing decimal: {0}")]
    Decimal(String),
    /// Raised when a dynamic value is failed to be parsed.
    #[error("Error parsing dynamic: {0}")]
    Dynamic(#[from] serde_json::Error),
    /// Raised when a frame violates the response protocol.
    #[error("Error parsing frame: {0}")]
    Frame(String),
    /// Raised when a wire value does not fit its declared column type.
    #[error("Error decoding value of type {column_type}: {value}")]
    Mismatch {
        /// The declared column type.
        column_type: &'static str,
        /// The offending JSON value.
        value: String,
    },
}

/// Errors raised when parsing connection strings.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStringError {
    /// Raised when a connection string is missing a required key.
    #[error("Missing value for key '{}'", key)]
    MissingValue {
        /// The key that is missing.
        key: String,
    },
    /// Raised when a connection string has an unexpected key.
    #[error("Unexpected key '{}'", key)]
    UnexpectedKey {
        /// The key that is unexpected.
        key: String,
    },
    /// Raised when a connection string has an invalid value.
    #[error("Parsing error: {}", msg)]
    Parsing {
        /// The error message.
        msg: String,
    },
}

impl ConnectionStringError {
    pub(crate) fn from_missing_value(key: impl Into<String>) -> Self {
        Self::MissingValue { key: key.into() }
    }
    pub(crate) fn from_unexpected_key(key: impl Into<String>) -> Self {
        Self::UnexpectedKey { key: key.into() }
    }
    pub(crate) fn from_parsing_error(msg: impl Into<String>) -> Self {
        Self::Parsing { msg: msg.into() }
    }
}

/// Result type for kusto operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that may carry partial output alongside the error that stopped it.
pub type Partial<T> = std::result::Result<T, (Option<T>, Error)>;

/// Extension methods for [Partial].
pub trait PartialExt<T> {
    /// Keeps whatever output was produced, discarding the error if any
    /// output exists.
    fn ignore_partial_results(self) -> std::result::Result<T, Error>;
}

impl<T> PartialExt<T> for Partial<T> {
    fn ignore_partial_results(self) -> std::result::Result<T, Error> {
        match self {
            Ok(v) => Ok(v),
            Err((Some(v), _)) => Ok(v),
            Err((None, e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_api_errors() -> serde_json::Value {
        serde_json::json!([
            {"error": {
                "code": "LimitsExceeded",
                "message": "Request is invalid and cannot be executed.",
                "@type": "Kusto.Data.Exceptions.KustoServicePartialQueryFailureLimitsExceededException",
                "@permanent": false
            }},
            {"error": {
                "code": "Some other code",
                "message": "Some other error",
                "@permanent": false
            }}
        ])
    }

    #[test]
    fn one_api_translation_chains_in_order() {
        let err = Error::from_one_api_errors(OpKind::Query, &one_api_errors()).unwrap();
        let chain: Vec<&Error> = err.chain().collect();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].kind(), ErrorKind::LimitsExceeded);
        assert_eq!(
            chain[0].message(),
            "Request is invalid and cannot be executed.;See https://docs.microsoft.com/en-us/azure/kusto/concepts/querylimits"
        );
        assert_eq!(chain[1].kind(), ErrorKind::Other);
        assert_eq!(chain[1].message(), "Some other error");
    }

    #[test]
    fn retryability_requires_whole_chain() {
        let retryable = Error::new(OpKind::Query, ErrorKind::Timeout, "slow");
        assert!(retryable.is_retryable());

        let poisoned = Error::new(OpKind::Query, ErrorKind::Timeout, "slow")
            .with_inner(Error::new(OpKind::Query, ErrorKind::ClientArgs, "bad arg"));
        assert!(!poisoned.is_retryable());
    }

    #[test]
    fn http_error_permanence_follows_payload() {
        let body =
            br#"{"error": {"code": "General_BadRequest", "message": "bad", "@permanent": true}}"#;
        let err = Error::http(OpKind::Query, StatusCode::BadRequest, body);
        assert_eq!(err.kind(), ErrorKind::HttpError);
        assert!(!err.is_retryable());

        let transient =
            br#"{"error": {"code": "Throttled", "message": "busy", "@permanent": false}}"#;
        let err = Error::http(OpKind::Query, StatusCode::TooManyRequests, transient);
        assert!(err.is_retryable());
    }

    #[test]
    fn http_error_without_payload_marker_is_retryable() {
        // Absent an @permanent marker the failure is treated as transient.
        let err = Error::http(OpKind::Mgmt, StatusCode::BadGateway, b"");
        assert!(err.is_retryable());
        assert_eq!(err.status(), Some(StatusCode::BadGateway));
    }

    #[test]
    fn display_includes_chain() {
        let err = Error::new(OpKind::Query, ErrorKind::Internal, "head")
            .with_inner(Error::new(OpKind::Unknown, ErrorKind::Io, "tail"));
        let rendered = err.to_string();
        assert!(rendered.contains("head"));
        assert!(rendered.contains("tail"));
    }
}
