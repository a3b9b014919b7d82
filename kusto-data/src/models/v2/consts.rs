use serde::{Deserialize, Serialize};

/// Where inline errors are reported - within the data, at the end of the
/// table, or at the end of the dataset.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReportingPlacement {
    /// Errors are reported within the data.
    InData,
    /// Errors are reported at the end of the table.
    EndOfTable,
    /// Errors are reported at the end of the dataset.
    EndOfDataSet,
}

/// The type of a table fragment (in progressive mode), instructing how to
/// apply it.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub enum TableFragmentType {
    /// Append the rows to the previously delivered fragments.
    DataAppend,
    /// Discard all previously delivered rows and start over with this
    /// fragment.
    DataReplace,
}

/// Categorizes data tables according to the role they play in the data set
/// that a Kusto query returns.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Clone, Copy, Hash)]
pub enum TableKind {
    /// The table contains the actual data returned by the query.
    PrimaryResult,
    /// Information about the runtime of the query.
    QueryCompletionInformation,
    /// Trace log for the query.
    QueryTraceLog,
    /// Perf log for the query.
    QueryPerfLog,
    /// Table of contents for the other parts.
    TableOfContents,
    /// Properties of the query.
    QueryProperties,
    /// Execution plan for the query.
    QueryPlan,
    /// Extended properties of the query.
    ExtendedProperties,
    /// Unknown table kind.
    #[serde(other)]
    Unknown,
}
