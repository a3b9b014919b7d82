//! Wire models for the two response dialects.

pub mod v1;
pub mod v2;

use serde::{Deserialize, Serialize};

/// Represents the scalar data types of ADX. see [the docs for more information](https://docs.microsoft.com/en-us/azure/data-explorer/kusto/query/scalar-data-types/)
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Copy, Clone, Hash)]
pub enum ColumnType {
    /// Boolean type, true or false.
    #[serde(rename = "bool", alias = "boolean")]
    Bool,
    /// Datetime, represents a specific point in time.
    #[serde(rename = "datetime", alias = "date")]
    DateTime,
    /// A complex type, that is either an array or a dictionary of other values.
    #[serde(rename = "dynamic")]
    Dynamic,
    /// GUID type, represents a globally unique identifier.
    #[serde(rename = "guid", alias = "uniqueid")]
    Guid,
    /// 32 bit integer type.
    #[serde(rename = "int")]
    Int,
    /// 64 bit integer type.
    #[serde(rename = "long")]
    Long,
    /// 64 bit floating point type.
    #[serde(rename = "real")]
    Real,
    /// String type, represents a string of characters.
    #[serde(rename = "string")]
    String,
    /// Timespan type, represents a duration of time.
    #[serde(rename = "timespan", alias = "time")]
    Timespan,
    /// Decimal, represents a fixed-point number with a defined precision and scale.
    #[serde(rename = "decimal")]
    Decimal,
}

impl ColumnType {
    /// The lowercase KQL name of the type, as used in `declare
    /// query_parameters` declarations.
    pub fn kql_name(self) -> &'static str {
        match self {
            ColumnType::Bool => "bool",
            ColumnType::DateTime => "datetime",
            ColumnType::Dynamic => "dynamic",
            ColumnType::Guid => "guid",
            ColumnType::Int => "int",
            ColumnType::Long => "long",
            ColumnType::Real => "real",
            ColumnType::String => "string",
            ColumnType::Timespan => "timespan",
            ColumnType::Decimal => "decimal",
        }
    }
}

/// Common access to the column shape of both dialects.
pub trait Column {
    /// The column's name.
    fn column_name(&self) -> &str;
    /// The column's data type.
    fn column_type(&self) -> ColumnType;
}

impl Column for v1::Column {
    fn column_name(&self) -> &str {
        &self.column_name
    }

    fn column_type(&self) -> ColumnType {
        self.column_type
    }
}

impl Column for v2::Column {
    fn column_name(&self) -> &str {
        &self.column_name
    }

    fn column_type(&self) -> ColumnType {
        self.column_type
    }
}
