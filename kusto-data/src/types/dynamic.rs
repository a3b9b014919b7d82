use crate::error::{Error, ParseError};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};

/// Dynamic (semi-structured) value for kusto.
///
/// Holds the raw UTF-8 JSON bytes verbatim; the payload is only parsed when
/// the caller asks for a structured view.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct KustoDynamic(pub Option<Bytes>);

impl KustoDynamic {
    /// Creates a dynamic value from raw JSON bytes, without validating them.
    pub fn from_raw(raw: impl Into<Bytes>) -> Self {
        Self(Some(raw.into()))
    }

    /// Creates a null dynamic value.
    pub fn null() -> Self {
        Self(None)
    }

    /// Whether the value is null.
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// The raw JSON bytes, when not null.
    pub fn as_raw(&self) -> Option<&[u8]> {
        self.0.as_deref()
    }

    /// Parses the stored JSON into a caller type.
    ///
    /// A null value or invalid stored JSON fails with a parse error rather
    /// than panicking.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let raw = self
            .0
            .as_deref()
            .ok_or_else(|| ParseError::ValueNull("dynamic".to_string()))?;
        serde_json::from_slice(raw).map_err(|e| ParseError::Dynamic(e).into())
    }
}

impl Display for KustoDynamic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(raw) => write!(f, "{}", String::from_utf8_lossy(raw)),
            None => write!(f, "null"),
        }
    }
}

impl Debug for KustoDynamic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "KustoDynamic({})", self)
    }
}

impl Serialize for KustoDynamic {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.0 {
            // Dynamic columns travel as strings containing JSON.
            Some(raw) => serializer.serialize_str(&String::from_utf8_lossy(raw)),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for KustoDynamic {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let opt = Option::<serde_json::Value>::deserialize(deserializer)?;
        match opt {
            None | Some(serde_json::Value::Null) => Ok(Self::null()),
            // A string cell is already the raw JSON text.
            Some(serde_json::Value::String(s)) => Ok(Self::from_raw(s.into_bytes())),
            // Inline objects and arrays are captured as their compact text.
            Some(other) => Ok(Self::from_raw(
                serde_json::to_vec(&other).map_err(serde::de::Error::custom)?,
            )),
        }
    }
}
