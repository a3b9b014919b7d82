use crate::error::{Error, ParseError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

// Optional sign, optional integer digits, optional single point, optional
// fraction digits; at least one digit somewhere.
static DECIMAL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)$").expect("static decimal regex is valid")
});

/// Arbitrary-precision decimal for kusto, canonicalized as text.
///
/// The wire value is preserved verbatim so no precision is lost; use
/// [KustoDecimal::to_decimal] when a numeric representation is acceptable.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KustoDecimal(pub Option<String>);

impl KustoDecimal {
    /// Creates a new `KustoDecimal` after validating the textual syntax.
    pub fn new(value: impl Into<String>) -> Result<Self, Error> {
        let value = value.into();
        if !DECIMAL_REGEX.is_match(&value) {
            return Err(ParseError::Decimal(value).into());
        }
        Ok(Self(Some(value)))
    }

    /// Creates a null `KustoDecimal`.
    pub fn null() -> Self {
        Self(None)
    }

    /// Whether the value is null.
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Converts into a fixed-precision [rust_decimal::Decimal].
    ///
    /// Fails when null or when the value does not fit 96 bits of mantissa.
    pub fn to_decimal(&self) -> Result<rust_decimal::Decimal, Error> {
        let text = self
            .0
            .as_deref()
            .ok_or_else(|| ParseError::ValueNull("decimal".to_string()))?;
        rust_decimal::Decimal::from_str(text)
            .map_err(|e| ParseError::Decimal(format!("{text}: {e}")).into())
    }
}

impl FromStr for KustoDecimal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<rust_decimal::Decimal> for KustoDecimal {
    fn from(v: rust_decimal::Decimal) -> Self {
        Self(Some(v.to_string()))
    }
}

impl Display for KustoDecimal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "null"),
        }
    }
}

impl Debug for KustoDecimal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(v) => write!(f, "KustoDecimal({})", v),
            None => write!(f, "KustoDecimal(null)"),
        }
    }
}

impl Serialize for KustoDecimal {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.0 {
            Some(v) => serializer.serialize_str(v),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for KustoDecimal {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // The service emits decimals as strings or as bare numeric tokens;
        // both arrive here as JSON values.
        let opt = Option::<serde_json::Value>::deserialize(deserializer)?;
        match opt {
            None | Some(serde_json::Value::Null) => Ok(Self::null()),
            Some(serde_json::Value::String(s)) => {
                Self::new(s).map_err(|e| serde::de::Error::custom(e.to_string()))
            }
            Some(serde_json::Value::Number(n)) => {
                Self::new(n.to_string()).map_err(|e| serde::de::Error::custom(e.to_string()))
            }
            Some(other) => Err(serde::de::Error::custom(format!(
                "invalid decimal value: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_syntax() {
        for ok in ["1", "-1", "+1", "2.00000000000001", ".5", "1.", "0.1234567890123456789012345678901234567890"] {
            assert!(KustoDecimal::new(ok).is_ok(), "{ok} should parse");
        }
        for bad in ["", "-", ".", "1.2.3", "1e5", "abc", "+-1"] {
            assert!(KustoDecimal::new(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn preserves_text_verbatim() {
        let v = KustoDecimal::new("2.00000000000001").unwrap();
        assert_eq!(v.to_string(), "2.00000000000001");
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"2.00000000000001\"");
    }

    #[test]
    fn deserializes_numbers_and_strings() {
        let from_string: KustoDecimal = serde_json::from_str("\"1.5\"").unwrap();
        let from_number: KustoDecimal = serde_json::from_str("1.5").unwrap();
        assert_eq!(from_string, from_number);
    }

    #[test]
    fn converts_to_fixed_decimal() {
        let v = KustoDecimal::new("1.5").unwrap();
        assert_eq!(v.to_decimal().unwrap().to_string(), "1.5");
        assert!(KustoDecimal::null().to_decimal().is_err());
    }
}
