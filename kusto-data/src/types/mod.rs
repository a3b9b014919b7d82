//! Nullable scalar types for ADX values, for serialization and deserialization.
//!
//! Every type wraps an `Option` of its payload: a `None` payload is the
//! service's null value for that type. See
//! [the docs for more information](https://docs.microsoft.com/en-us/azure/data-explorer/kusto/query/scalar-data-types/)

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};

mod datetime;
mod decimal;
mod dynamic;
mod timespan;

pub use datetime::KustoDateTime;
pub use decimal::KustoDecimal;
pub use dynamic::KustoDynamic;
pub use timespan::KustoTimespan;

macro_rules! kusto_scalar {
    ($(#[$docs:meta])* $name:ident, $payload:ty) => {
        $(#[$docs])*
        #[derive(Clone, PartialEq, Serialize, Deserialize, Default)]
        #[serde(transparent)]
        pub struct $name(pub Option<$payload>);

        impl $name {
            /// Creates a non-null value.
            pub fn new(value: $payload) -> Self {
                Self(Some(value))
            }

            /// Creates a null value.
            pub fn null() -> Self {
                Self(None)
            }

            /// Whether the value is null.
            pub fn is_null(&self) -> bool {
                self.0.is_none()
            }
        }

        impl From<$payload> for $name {
            fn from(value: $payload) -> Self {
                Self(Some(value))
            }
        }

        impl From<Option<$payload>> for $name {
            fn from(value: Option<$payload>) -> Self {
                Self(value)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                match &self.0 {
                    Some(v) => write!(f, "{}", v),
                    None => write!(f, "null"),
                }
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                match &self.0 {
                    Some(v) => write!(f, concat!(stringify!($name), "({:?})"), v),
                    None => write!(f, concat!(stringify!($name), "(null)")),
                }
            }
        }
    };
}

kusto_scalar!(
    /// A boolean value, true or false.
    KustoBool,
    bool
);
kusto_scalar!(
    /// A 32 bit signed integer.
    KustoInt,
    i32
);
kusto_scalar!(
    /// A 64 bit signed integer.
    KustoLong,
    i64
);
kusto_scalar!(
    /// A 64 bit IEEE-754 floating point number.
    KustoReal,
    f64
);
kusto_scalar!(
    /// A string of characters.
    KustoString,
    String
);
kusto_scalar!(
    /// A globally unique identifier.
    KustoGuid,
    uuid::Uuid
);

impl From<&str> for KustoString {
    fn from(value: &str) -> Self {
        Self(Some(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_display() {
        assert_eq!(KustoInt::null().to_string(), "null");
        assert_eq!(KustoInt::new(7).to_string(), "7");
    }

    #[test]
    fn transparent_serde() {
        assert_eq!(serde_json::to_string(&KustoLong::new(10)).unwrap(), "10");
        assert_eq!(serde_json::to_string(&KustoLong::null()).unwrap(), "null");
        let v: KustoBool = serde_json::from_str("true").unwrap();
        assert_eq!(v, KustoBool::new(true));
        let v: KustoBool = serde_json::from_str("null").unwrap();
        assert!(v.is_null());
    }
}
