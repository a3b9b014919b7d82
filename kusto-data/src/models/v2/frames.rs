//! The frame bodies of the V2 response stream.
//!
//! Field names and casing are fixed by the wire protocol; the helpers here
//! are what the state machines key their decisions on.

use crate::models::v2::consts::{ErrorReportingPlacement, TableFragmentType, TableKind};
use crate::models::v2::errors::OneApiError;
use crate::models::v2::{Column, Row};
use serde::{Deserialize, Serialize};

/// The first frame of every V2 response; decides which state machine runs
/// the rest of the stream.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct DataSetHeader {
    /// When set, primary tables arrive as a header followed by fragments
    /// instead of complete tables. Controlled by the
    /// `results_progressive_enabled` request option.
    pub is_progressive: bool,
    /// Protocol version, `v2.0` today.
    pub version: String,
    /// Whether the service fragmented the main table.
    pub is_fragmented: Option<bool>,
    /// Where inline errors are placed in the stream.
    pub error_reporting_placement: Option<ErrorReportingPlacement>,
}

/// A complete table, delivered in one frame.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct DataTable {
    /// Unique identifier of the table within the dataset.
    pub table_id: i32,
    /// Table name.
    pub table_name: String,
    /// The role the table plays in the dataset.
    pub table_kind: TableKind,
    /// Columns in the table.
    pub columns: Vec<Column>,
    /// Rows in the table; each is a list of values matching the columns, or
    /// an inline error.
    pub rows: Vec<Row>,
}

impl DataTable {
    /// Whether this table carries the user-requested query output.
    pub fn is_primary(&self) -> bool {
        self.table_kind == TableKind::PrimaryResult
    }
}

/// Opens a fragmented table; its fragments and completion carry the same
/// table id.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct TableHeader {
    /// Unique identifier of the table within the dataset.
    pub table_id: i32,
    /// Table name.
    pub table_name: String,
    /// The role the table plays in the dataset.
    pub table_kind: TableKind,
    /// Columns every fragment's rows decode against.
    pub columns: Vec<Column>,
}

impl TableHeader {
    /// Whether this header opens the user-requested query output.
    pub fn is_primary(&self) -> bool {
        self.table_kind == TableKind::PrimaryResult
    }
}

/// One slice of an open table.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct TableFragment {
    /// The table id of the opening [TableHeader].
    pub table_id: i32,
    /// How the fragment applies to what was already delivered.
    pub table_fragment_type: TableFragmentType,
    /// Rows of the slice, matching the columns of the opening header.
    pub rows: Vec<Row>,
}

impl TableFragment {
    /// Whether this fragment discards everything delivered before it.
    pub fn starts_replace(&self) -> bool {
        self.table_fragment_type == TableFragmentType::DataReplace
    }
}

/// How much of an open table was delivered so far.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct TableProgress {
    /// The table id of the opening [TableHeader].
    pub table_id: i32,
    /// Fraction of the table delivered so far. Monotonic within a table,
    /// but values may be skipped.
    pub table_progress: f64,
}

/// Closes an open table.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct TableCompletion {
    /// The table id of the opening [TableHeader].
    pub table_id: i32,
    /// Total row count of the completed table.
    pub row_count: i32,
    /// Errors attached to the table, if any.
    pub one_api_errors: Option<Vec<OneApiError>>,
}

/// Closes the dataset; nothing may follow it.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct DataSetCompletion {
    /// Did the query error.
    pub has_errors: bool,
    /// Was the query cancelled.
    pub cancelled: bool,
    /// Errors attached to the dataset, if any.
    pub one_api_errors: Option<Vec<OneApiError>>,
}
