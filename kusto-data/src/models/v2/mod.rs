use crate::error::{Error, Partial};
use crate::models::ColumnType;
use serde::{Deserialize, Serialize};

mod consts;
mod errors;
mod frames;
mod known_tables;

pub use consts::*;
pub use errors::*;
pub use frames::*;
pub use known_tables::*;

/// A result of a V2 query.
/// Could be a table, a part of a table, or metadata about the dataset.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "PascalCase", tag = "FrameType")]
#[allow(clippy::enum_variant_names)]
pub enum Frame {
    /// The header of the dataset.
    DataSetHeader(DataSetHeader),
    /// A table in the dataset.
    DataTable(DataTable),
    /// The final frame of the dataset.
    DataSetCompletion(DataSetCompletion),
    /// A header of a table (in progressive mode).
    TableHeader(TableHeader),
    /// A part of a table (in progressive mode).
    TableFragment(TableFragment),
    /// Progress report for a table (in progressive mode).
    TableProgress(TableProgress),
    /// End of a table (in progressive mode).
    TableCompletion(TableCompletion),
}

impl Frame {
    pub(crate) fn frame_type(&self) -> &'static str {
        match self {
            Frame::DataSetHeader(_) => "DataSetHeader",
            Frame::DataTable(_) => "DataTable",
            Frame::DataSetCompletion(_) => "DataSetCompletion",
            Frame::TableHeader(_) => "TableHeader",
            Frame::TableFragment(_) => "TableFragment",
            Frame::TableProgress(_) => "TableProgress",
            Frame::TableCompletion(_) => "TableCompletion",
        }
    }
}

/// Represents a column in ADX, for a V2 query.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct Column {
    /// Column name.
    pub column_name: String,
    /// Data type of the column.
    pub column_type: ColumnType,
}

/// One wire row: either a list of cell values, or an inline error the
/// service attached at this position of the table.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(untagged)]
pub enum Row {
    /// A row in a table.
    Values(Vec<serde_json::Value>),
    /// An error in a table.
    Error(OneApiErrors),
}

impl Row {
    /// Splits the row into values or the carried error.
    pub fn into_result(self) -> Result<Vec<serde_json::Value>, OneApiErrors> {
        match self {
            Row::Values(v) => Ok(v),
            Row::Error(e) => Err(e),
        }
    }
}

impl DataTable {
    /// Deserializes every value row into `T`, collecting inline row errors
    /// on the side.
    ///
    /// This is a convenience for the typed secondary tables; the streaming
    /// iterator never goes through here.
    pub fn deserialize_values<T: serde::de::DeserializeOwned>(&self) -> Partial<Vec<T>> {
        let mut errors: Vec<Error> = vec![];
        let mut values = vec![];
        for row in &self.rows {
            match row.clone().into_result() {
                Ok(v) => match serde_json::from_value::<T>(serde_json::Value::Array(v)) {
                    Ok(v) => values.push(v),
                    Err(e) => errors.push(e.into()),
                },
                Err(e) => {
                    if let Some(e) = e.into_error(crate::error::OpKind::Query) {
                        errors.push(e);
                    }
                }
            }
        }

        match (values.is_empty(), errors.into_iter().next()) {
            (_, None) => Ok(values),
            (true, Some(e)) => Err((None, e)),
            (false, Some(e)) => Err((Some(values), e)),
        }
    }
}

/// A fully collected V2 response.
pub type DataSet = Vec<Frame>;
