//! The decoded value model: typed nullable scalars, columns and rows.
//!
//! Wire cells decode into [KustoValue] per the declared [ColumnType]; values
//! encode back into KQL literal form for query parameters.

use crate::error::{Error, ParseError, Result};
use crate::models::ColumnType;
use crate::types::{
    KustoBool, KustoDateTime, KustoDecimal, KustoDynamic, KustoGuid, KustoInt, KustoLong,
    KustoReal, KustoString, KustoTimespan,
};
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;

/// A single decoded value of one of the ADX scalar types.
///
/// Every variant is nullable; a null carries its type so literal encoding and
/// conversion stay type-directed.
#[derive(Clone, PartialEq, Debug)]
pub enum KustoValue {
    /// A boolean value.
    Bool(KustoBool),
    /// A 32 bit signed integer.
    Int(KustoInt),
    /// A 64 bit signed integer.
    Long(KustoLong),
    /// A 64 bit floating point value.
    Real(KustoReal),
    /// An arbitrary-precision decimal, canonicalized as text.
    Decimal(KustoDecimal),
    /// A string value.
    String(KustoString),
    /// A point in time.
    DateTime(KustoDateTime),
    /// A duration.
    Timespan(KustoTimespan),
    /// A semi-structured value holding raw JSON.
    Dynamic(KustoDynamic),
    /// A globally unique identifier.
    Guid(KustoGuid),
}

fn mismatch(column_type: &'static str, value: &serde_json::Value) -> Error {
    ParseError::Mismatch {
        column_type,
        value: value.to_string(),
    }
    .into()
}

impl KustoValue {
    /// Decodes a wire JSON cell according to the declared column type.
    pub fn decode(value: &serde_json::Value, column_type: ColumnType) -> Result<Self> {
        use serde_json::Value;
        if value.is_null() {
            return Ok(Self::null_of(column_type));
        }
        Ok(match column_type {
            ColumnType::Bool => match value {
                Value::Bool(b) => Self::Bool(KustoBool::new(*b)),
                _ => return Err(mismatch("bool", value)),
            },
            ColumnType::Int => match value {
                Value::Number(n) => {
                    let v = n
                        .as_i64()
                        .and_then(|v| i32::try_from(v).ok())
                        .ok_or_else(|| mismatch("int", value))?;
                    Self::Int(KustoInt::new(v))
                }
                Value::String(s) => Self::Int(KustoInt::new(
                    s.parse::<i32>().map_err(ParseError::Int)?,
                )),
                _ => return Err(mismatch("int", value)),
            },
            ColumnType::Long => match value {
                Value::Number(n) => Self::Long(KustoLong::new(
                    n.as_i64().ok_or_else(|| mismatch("long", value))?,
                )),
                Value::String(s) => Self::Long(KustoLong::new(
                    s.parse::<i64>().map_err(ParseError::Int)?,
                )),
                _ => return Err(mismatch("long", value)),
            },
            ColumnType::Real => match value {
                Value::Number(n) => Self::Real(KustoReal::new(
                    n.as_f64().ok_or_else(|| mismatch("real", value))?,
                )),
                // The service spells non-finite reals as strings.
                Value::String(s) => Self::Real(KustoReal::new(match s.as_str() {
                    "NaN" => f64::NAN,
                    "Infinity" => f64::INFINITY,
                    "-Infinity" => f64::NEG_INFINITY,
                    other => other.parse::<f64>().map_err(ParseError::Float)?,
                })),
                _ => return Err(mismatch("real", value)),
            },
            ColumnType::Decimal => match value {
                Value::String(s) => Self::Decimal(KustoDecimal::new(s.clone())?),
                Value::Number(n) => Self::Decimal(KustoDecimal::new(n.to_string())?),
                _ => return Err(mismatch("decimal", value)),
            },
            ColumnType::String => match value {
                Value::String(s) => Self::String(KustoString::new(s.clone())),
                _ => return Err(mismatch("string", value)),
            },
            ColumnType::DateTime => match value {
                Value::String(s) => Self::DateTime(KustoDateTime::from_str(s)?),
                _ => return Err(mismatch("datetime", value)),
            },
            ColumnType::Timespan => match value {
                Value::String(s) => Self::Timespan(KustoTimespan::from_str(s)?),
                _ => return Err(mismatch("timespan", value)),
            },
            ColumnType::Guid => match value {
                Value::String(s) => Self::Guid(KustoGuid::new(
                    uuid::Uuid::parse_str(s).map_err(ParseError::Guid)?,
                )),
                _ => return Err(mismatch("guid", value)),
            },
            ColumnType::Dynamic => match value {
                Value::String(s) => Self::Dynamic(KustoDynamic::from_raw(s.clone().into_bytes())),
                other => Self::Dynamic(KustoDynamic::from_raw(serde_json::to_vec(other)?)),
            },
        })
    }

    /// The null value of the given column type.
    pub fn null_of(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Bool => Self::Bool(KustoBool::null()),
            ColumnType::Int => Self::Int(KustoInt::null()),
            ColumnType::Long => Self::Long(KustoLong::null()),
            ColumnType::Real => Self::Real(KustoReal::null()),
            ColumnType::Decimal => Self::Decimal(KustoDecimal::null()),
            ColumnType::String => Self::String(KustoString::null()),
            ColumnType::DateTime => Self::DateTime(KustoDateTime::null()),
            ColumnType::Timespan => Self::Timespan(KustoTimespan::null()),
            ColumnType::Dynamic => Self::Dynamic(KustoDynamic::null()),
            ColumnType::Guid => Self::Guid(KustoGuid::null()),
        }
    }

    /// The column type this value belongs to.
    pub fn column_type(&self) -> ColumnType {
        match self {
            Self::Bool(_) => ColumnType::Bool,
            Self::Int(_) => ColumnType::Int,
            Self::Long(_) => ColumnType::Long,
            Self::Real(_) => ColumnType::Real,
            Self::Decimal(_) => ColumnType::Decimal,
            Self::String(_) => ColumnType::String,
            Self::DateTime(_) => ColumnType::DateTime,
            Self::Timespan(_) => ColumnType::Timespan,
            Self::Dynamic(_) => ColumnType::Dynamic,
            Self::Guid(_) => ColumnType::Guid,
        }
    }

    /// Whether the value is null.
    pub fn is_null(&self) -> bool {
        match self {
            Self::Bool(v) => v.is_null(),
            Self::Int(v) => v.is_null(),
            Self::Long(v) => v.is_null(),
            Self::Real(v) => v.is_null(),
            Self::Decimal(v) => v.is_null(),
            Self::String(v) => v.is_null(),
            Self::DateTime(v) => v.is_null(),
            Self::Timespan(v) => v.is_null(),
            Self::Dynamic(v) => v.is_null(),
            Self::Guid(v) => v.is_null(),
        }
    }

    /// Encodes the value into its KQL literal form, e.g. `int(7)`,
    /// `datetime(2020-03-04T14:05:01.31Z)` or a quoted string.
    pub fn literal(&self) -> String {
        match self {
            Self::Bool(KustoBool(Some(b))) => format!("bool({b})"),
            Self::Bool(KustoBool(None)) => "bool(null)".to_string(),
            Self::Int(KustoInt(Some(v))) => format!("int({v})"),
            Self::Int(KustoInt(None)) => "int(null)".to_string(),
            Self::Long(KustoLong(Some(v))) => format!("long({v})"),
            Self::Long(KustoLong(None)) => "long(null)".to_string(),
            Self::Real(KustoReal(Some(v))) => format!("real({v})"),
            Self::Real(KustoReal(None)) => "real(null)".to_string(),
            Self::Decimal(KustoDecimal(Some(v))) => format!("decimal({v})"),
            Self::Decimal(KustoDecimal(None)) => "decimal(null)".to_string(),
            Self::String(KustoString(Some(v))) => crate::query::quote_string(v, false),
            Self::String(KustoString(None)) => "\"\"".to_string(),
            Self::DateTime(v @ KustoDateTime(Some(_))) => format!("datetime({v})"),
            Self::DateTime(KustoDateTime(None)) => "datetime(null)".to_string(),
            Self::Timespan(v @ KustoTimespan(Some(_))) => format!("timespan({v})"),
            Self::Timespan(KustoTimespan(None)) => "timespan(null)".to_string(),
            Self::Dynamic(v @ KustoDynamic(Some(_))) => format!("dynamic({v})"),
            Self::Dynamic(KustoDynamic(None)) => "dynamic(null)".to_string(),
            Self::Guid(KustoGuid(Some(v))) => format!("guid({v})"),
            Self::Guid(KustoGuid(None)) => "guid(null)".to_string(),
        }
    }
}

impl Display for KustoValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v}"),
            Self::DateTime(v) => write!(f, "{v}"),
            Self::Timespan(v) => write!(f, "{v}"),
            Self::Dynamic(v) => write!(f, "{v}"),
            Self::Guid(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! value_accessor {
    ($(#[$docs:meta])* $fn_name:ident, $checked:ident, $variant:ident, $payload:ty, $type_name:literal) => {
        $(#[$docs])*
        pub fn $fn_name(&self) -> Option<&$payload> {
            match self {
                Self::$variant(v) => v.0.as_ref(),
                _ => None,
            }
        }

        /// Like the optional accessor, but a null or mismatched value is an
        /// error.
        pub fn $checked(&self) -> Result<&$payload> {
            match self {
                Self::$variant(v) => v
                    .0
                    .as_ref()
                    .ok_or_else(|| ParseError::ValueNull($type_name.to_string()).into()),
                other => Err(ParseError::Mismatch {
                    column_type: $type_name,
                    value: other.to_string(),
                }
                .into()),
            }
        }
    };
}

impl KustoValue {
    value_accessor!(
        /// The boolean payload, when this is a non-null bool.
        as_bool, expect_bool, Bool, bool, "bool"
    );
    value_accessor!(
        /// The int payload, when this is a non-null int.
        as_i32, expect_i32, Int, i32, "int"
    );
    value_accessor!(
        /// The long payload, when this is a non-null long.
        as_i64, expect_i64, Long, i64, "long"
    );
    value_accessor!(
        /// The real payload, when this is a non-null real.
        as_f64, expect_f64, Real, f64, "real"
    );
    value_accessor!(
        /// The string payload, when this is a non-null string.
        as_string, expect_string, String, String, "string"
    );
    value_accessor!(
        /// The datetime payload, when this is a non-null datetime.
        as_datetime, expect_datetime, DateTime, time::OffsetDateTime, "datetime"
    );
    value_accessor!(
        /// The timespan payload, when this is a non-null timespan.
        as_timespan, expect_timespan, Timespan, time::Duration, "timespan"
    );
    value_accessor!(
        /// The guid payload, when this is a non-null guid.
        as_guid, expect_guid, Guid, uuid::Uuid, "guid"
    );

    /// The dynamic value, when this is a dynamic.
    pub fn as_dynamic(&self) -> Option<&KustoDynamic> {
        match self {
            Self::Dynamic(v) => Some(v),
            _ => None,
        }
    }

    /// The decimal value, when this is a decimal.
    pub fn as_decimal(&self) -> Option<&KustoDecimal> {
        match self {
            Self::Decimal(v) => Some(v),
            _ => None,
        }
    }
}

/// A named, typed column of a result table.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Column {
    /// Column name, non-empty.
    pub name: String,
    /// Data type of the column's values.
    pub column_type: ColumnType,
}

/// An ordered, immutable set of [Column]s shared by every row of one result.
///
/// Names are validated to be non-empty and unique at construction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Columns(Arc<Vec<Column>>);

impl Columns {
    /// Validates and freezes a column set.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut seen = hashbrown::HashSet::with_capacity(columns.len());
        for column in &columns {
            if column.name.is_empty() {
                return Err(ParseError::Frame("column with empty name".to_string()).into());
            }
            if !seen.insert(column.name.as_str()) {
                return Err(
                    ParseError::Frame(format!("duplicate column name: {}", column.name)).into(),
                );
            }
        }
        drop(seen);
        Ok(Self(Arc::new(columns)))
    }

    /// The position of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|c| c.name == name)
    }
}

impl Deref for Columns {
    type Target = [Column];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<&[crate::models::v2::Column]> for Columns {
    type Error = Error;

    fn try_from(columns: &[crate::models::v2::Column]) -> Result<Self> {
        Self::new(
            columns
                .iter()
                .map(|c| Column {
                    name: c.column_name.clone(),
                    column_type: c.column_type,
                })
                .collect(),
        )
    }
}

/// One decoded row of a primary result.
#[derive(Clone, PartialEq, Debug)]
pub struct Row {
    /// The columns shared by all rows of this result.
    pub columns: Columns,
    /// One value per column, in column order.
    pub values: Vec<KustoValue>,
    /// When true, all previously delivered rows of this result are to be
    /// discarded and iteration starts over.
    pub replace: bool,
}

impl Row {
    /// Decodes a wire row against its columns.
    pub fn decode(columns: Columns, cells: &[serde_json::Value]) -> Result<Self> {
        if cells.len() != columns.len() {
            return Err(ParseError::Frame(format!(
                "row has {} values but the table has {} columns",
                cells.len(),
                columns.len()
            ))
            .into());
        }
        let values = cells
            .iter()
            .zip(columns.iter())
            .map(|(cell, column)| KustoValue::decode(cell, column.column_type))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            columns,
            values,
            replace: false,
        })
    }

    /// The value of a column by name.
    pub fn get(&self, name: &str) -> Option<&KustoValue> {
        self.columns.index_of(name).map(|i| &self.values[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Columns {
        Columns::new(vec![
            Column {
                name: "Timestamp".to_string(),
                column_type: ColumnType::DateTime,
            },
            Column {
                name: "Name".to_string(),
                column_type: ColumnType::String,
            },
            Column {
                name: "ID".to_string(),
                column_type: ColumnType::Long,
            },
        ])
        .unwrap()
    }

    #[test]
    fn decodes_a_row() {
        let row = Row::decode(
            columns(),
            &[
                serde_json::json!("2020-03-04T14:05:01.3109965Z"),
                serde_json::json!("Doak"),
                serde_json::json!(10),
            ],
        )
        .unwrap();
        assert_eq!(row.get("Name").unwrap().as_string().unwrap(), "Doak");
        assert_eq!(row.get("ID").unwrap().as_i64(), Some(&10));
        assert!(!row.replace);
    }

    #[test]
    fn null_cells_decode_as_typed_nulls() {
        let row = Row::decode(
            columns(),
            &[
                serde_json::Value::Null,
                serde_json::json!("Dubovski"),
                serde_json::Value::Null,
            ],
        )
        .unwrap();
        assert!(row.values[0].is_null());
        assert_eq!(row.values[2], KustoValue::Long(KustoLong::null()));
        assert_eq!(row.get("ID").unwrap().as_i64(), None);
        assert!(row.get("ID").unwrap().expect_i64().is_err());
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        assert!(Row::decode(columns(), &[serde_json::json!("Doak")]).is_err());
    }

    #[test]
    fn column_names_must_be_unique_and_non_empty() {
        assert!(Columns::new(vec![
            Column {
                name: "a".to_string(),
                column_type: ColumnType::Int
            },
            Column {
                name: "a".to_string(),
                column_type: ColumnType::Int
            },
        ])
        .is_err());
        assert!(Columns::new(vec![Column {
            name: String::new(),
            column_type: ColumnType::Int
        }])
        .is_err());
    }

    #[test]
    fn literal_forms() {
        assert_eq!(
            KustoValue::Int(KustoInt::new(7)).literal(),
            "int(7)"
        );
        assert_eq!(
            KustoValue::Bool(KustoBool::new(true)).literal(),
            "bool(true)"
        );
        assert_eq!(
            KustoValue::Long(KustoLong::null()).literal(),
            "long(null)"
        );
        assert_eq!(
            KustoValue::String(KustoString::from("abcd")).literal(),
            "\"abcd\""
        );
        let ts = KustoValue::Timespan(KustoTimespan::from_str("01:23:45.6789000").unwrap());
        assert_eq!(ts.literal(), "timespan(01:23:45.6789)");
    }

    #[test]
    fn decodes_non_finite_reals() {
        let v = KustoValue::decode(&serde_json::json!("NaN"), ColumnType::Real).unwrap();
        assert!(v.as_f64().unwrap().is_nan());
        let v = KustoValue::decode(&serde_json::json!("Infinity"), ColumnType::Real).unwrap();
        assert!(v.as_f64().unwrap().is_infinite());
    }

    #[test]
    fn decodes_decimal_from_number_token() {
        let v = KustoValue::decode(&serde_json::json!(2.5), ColumnType::Decimal).unwrap();
        assert_eq!(v.as_decimal().unwrap().to_string(), "2.5");
    }

    #[test]
    fn type_mismatch_is_an_error() {
        assert!(KustoValue::decode(&serde_json::json!("abc"), ColumnType::Int).is_err());
        assert!(KustoValue::decode(&serde_json::json!(true), ColumnType::String).is_err());
    }
}
