#![allow(missing_docs)]

use crate::types::{KustoDateTime, KustoDynamic, KustoGuid, KustoInt, KustoString};
use serde::{Deserialize, Serialize};

/// One row of the `QueryProperties` secondary table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryProperties {
    pub table_id: KustoInt,
    pub key: KustoString,
    pub value: KustoDynamic,
}

/// One row of the `QueryCompletionInformation` secondary table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryCompletionInformation {
    pub timestamp: KustoDateTime,
    pub client_request_id: KustoString,
    pub activity_id: KustoGuid,
    pub sub_activity_id: KustoGuid,
    pub parent_activity_id: KustoGuid,
    pub level: KustoInt,
    pub level_name: KustoString,
    pub status_code: KustoInt,
    pub status_code_name: KustoString,
    pub event_type: KustoInt,
    pub event_type_name: KustoString,
    pub payload: KustoString,
}
