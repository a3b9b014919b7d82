//! Wire models for the V1 (management) response dialect.

use crate::error::{Error, ErrorKind, OpKind, Result};
use crate::models::v2::OneApiErrors;
use crate::models::ColumnType;
use serde::{Deserialize, Serialize};

/// A Kusto response dataset for V1: a list of tables.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct Dataset {
    /// The list of tables in the dataset.
    pub tables: Vec<Table>,
}

impl Dataset {
    /// Count the number of tables in the dataset.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Parses a raw management reply.
    ///
    /// The service answers either with `{"Tables": [...]}` or, for a few
    /// commands, with a single bare table object; anything else is an
    /// internal error.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Reply {
            Tables(Dataset),
            Single(Table),
        }

        match serde_json::from_slice::<Reply>(data) {
            Ok(Reply::Tables(dataset)) => Ok(dataset),
            Ok(Reply::Single(table)) => Ok(Dataset {
                tables: vec![table],
            }),
            Err(e) => Err(Error::wrapping(OpKind::Mgmt, ErrorKind::Internal, e)),
        }
    }
}

/// Represents a column in ADX, for a V1 (usually management) query.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct Column {
    /// Name of the column.
    pub column_name: String,
    /// Data type of the column.
    pub column_type: ColumnType,
    /// Type of the column in .net.
    pub data_type: Option<String>,
}

/// One wire row of a V1 table: cell values or an inline error.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(untagged)]
pub enum Row {
    /// A row in a table.
    Values(Vec<serde_json::Value>),
    /// An error in a table.
    Error(OneApiErrors),
}

/// Represents a table in ADX, for a V1 (usually management) query.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct Table {
    /// Name of the table.
    pub table_name: String,
    /// Columns in the table.
    pub columns: Vec<Column>,
    /// Rows in the table.
    pub rows: Vec<Row>,
}

/// The exact column names of a table of contents, in order.
const TOC_COLUMNS: [&str; 5] = ["Ordinal", "Kind", "Name", "Id", "PrettyName"];

impl Table {
    /// Whether this table is the trailing table of contents that indexes the
    /// other tables of the reply.
    pub fn is_table_of_contents(&self) -> bool {
        self.columns.len() == TOC_COLUMNS.len()
            && self
                .columns
                .iter()
                .zip(TOC_COLUMNS)
                .all(|(c, expected)| c.column_name == expected)
    }
}
