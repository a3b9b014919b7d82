use crate::error::{Error, ErrorKind, OpKind};
use serde::{Deserialize, Serialize};

const LIMITS_DOC_SUFFIX: &str =
    ";See https://docs.microsoft.com/en-us/azure/kusto/concepts/querylimits";

/// A single service-reported error in the OneApi shape.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct OneApiError {
    /// The error body.
    #[serde(rename = "error")]
    pub error_message: ErrorMessage,
}

impl OneApiError {
    /// Translates into the crate error, deriving the kind from the error
    /// code.
    pub fn into_error(self, op: OpKind) -> Error {
        let ErrorMessage {
            code,
            message,
            is_permanent,
            ..
        } = self.error_message;
        let (kind, message) = match code.as_str() {
            "LimitsExceeded" => (
                ErrorKind::LimitsExceeded,
                format!("{message}{LIMITS_DOC_SUFFIX}"),
            ),
            _ => (ErrorKind::Other, message),
        };
        Error::new(op, kind, message).with_permanence(is_permanent)
    }
}

/// The body of a OneApi error.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// The exception type reported by the service.
    #[serde(rename = "@type", default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    /// Diagnostic context of the failure.
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,
    /// Whether the service classified the failure as permanent.
    #[serde(rename = "@permanent", default)]
    pub is_permanent: bool,
}

/// Diagnostic context attached to a OneApi error.
#[allow(missing_docs)]
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorContext {
    pub timestamp: String,
    pub service_alias: String,
    pub machine_name: String,
    pub process_name: String,
    pub process_id: i64,
    pub thread_id: i64,
    pub client_request_id: String,
    pub activity_id: String,
    pub sub_activity_id: String,
    pub activity_type: String,
    pub parent_activity_id: String,
    pub activity_stack: String,
}

/// An inline row error: a list of OneApi errors in place of a value row.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct OneApiErrors {
    /// The carried errors, in service order.
    #[serde(rename = "OneApiErrors")]
    pub errors: Vec<OneApiError>,
}

impl OneApiErrors {
    /// Translates the list into a chained [Error]; `None` when empty.
    pub fn into_error(self, op: OpKind) -> Option<Error> {
        let mut chain: Option<Error> = None;
        for error in self.errors.into_iter().rev() {
            let head = error.into_error(op);
            chain = Some(match chain {
                Some(tail) => head.with_inner(tail),
                None => head,
            });
        }
        chain
    }
}
