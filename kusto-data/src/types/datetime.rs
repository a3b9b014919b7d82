use crate::error::{Error, ParseError};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Datetime for kusto, for serialization and deserialization.
///
/// Wire format is RFC-3339 with up to nanosecond fraction.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KustoDateTime(pub Option<OffsetDateTime>);

impl KustoDateTime {
    /// Creates a new `KustoDateTime` from a `time::OffsetDateTime`.
    pub fn new(value: OffsetDateTime) -> Self {
        Self(Some(value))
    }

    /// Creates a null `KustoDateTime`.
    pub fn null() -> Self {
        Self(None)
    }

    /// Whether the value is null.
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Formats the payload as RFC-3339, or `None` when null.
    pub fn format_rfc3339(&self) -> Option<String> {
        self.0.map(|v| {
            v.format(&Rfc3339)
                .expect("rfc3339 formatting of a valid datetime cannot fail")
        })
    }
}

impl Display for KustoDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.format_rfc3339() {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "null"),
        }
    }
}

impl Debug for KustoDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(v) => write!(f, "KustoDateTime({})", v),
            None => write!(f, "KustoDateTime(null)"),
        }
    }
}

impl Serialize for KustoDateTime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.format_rfc3339() {
            Some(v) => serializer.serialize_str(&v),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for KustoDateTime {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let opt = Option::<String>::deserialize(deserializer)?;
        match opt {
            Some(s) => s
                .parse::<KustoDateTime>()
                .map_err(|e| serde::de::Error::custom(e.to_string())),
            None => Ok(Self::null()),
        }
    }
}

impl FromStr for KustoDateTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(
            OffsetDateTime::parse(s, &Rfc3339).map_err(|e| Error::from(ParseError::DateTime(e)))?,
        ))
    }
}

impl From<OffsetDateTime> for KustoDateTime {
    fn from(v: OffsetDateTime) -> Self {
        Self::new(v)
    }
}

impl From<Option<OffsetDateTime>> for KustoDateTime {
    fn from(v: Option<OffsetDateTime>) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nanosecond_fraction() {
        let v = KustoDateTime::from_str("2020-03-04T14:05:01.3109965Z").unwrap();
        assert_eq!(v.0.unwrap().nanosecond(), 310_996_500);
    }

    #[test]
    fn round_trips_through_serde() {
        let v: KustoDateTime = serde_json::from_str("\"2023-12-31T10:00:02Z\"").unwrap();
        assert_eq!(
            serde_json::to_string(&v).unwrap(),
            "\"2023-12-31T10:00:02Z\""
        );
        let null: KustoDateTime = serde_json::from_str("null").unwrap();
        assert!(null.is_null());
    }
}
