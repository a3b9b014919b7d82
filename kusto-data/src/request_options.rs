//! Request options for queries and management commands.

use crate::types::{KustoDateTime, KustoTimespan};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::borrow::Cow;

/// The server-side timeout cap; larger values are rejected at build time.
pub const MAX_SERVER_TIMEOUT: time::Duration = time::Duration::hours(1);

/// Controls the hot or cold cache for the scope of the query.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub enum DataScope {
    /// Default cache behavior.
    Default,
    /// Query over all data.
    All,
    /// Query over the hot cache only.
    #[serde(rename = "hotcache")]
    HotCache,
}

/// Controls the language of the query.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub enum QueryLanguage {
    /// Old name for KQL.
    Csl,
    /// Kusto Query Language - the recommended language for querying.
    Kql,
    /// Structured Query Language - can be used, but is not recommended.
    Sql,
}

/// The consistency level for the query.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum QueryConsistency {
    /// Strong consistency - the results of this query can be observed in following queries immediately.
    #[serde(rename = "strongconsistency")]
    StrongConsistency,
    /// Weak consistency - can execute on any node on the cluster, which improves performance but with weaker guarantees.
    #[serde(rename = "weakconsistency")]
    WeakConsistency,
    /// Same as weak consistency, but affinitized by the query text.
    #[serde(rename = "affinitizedweakconsistency")]
    AffinitizedWeakConsistency,
    /// Same as weak consistency, but affinitized by the database.
    #[serde(rename = "databaseaffinitizedweakconsistency")]
    DatabaseAffinitizedWeakConsistency,
}

/// Properties accompanying a single request.
#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, Default, derive_builder::Builder)]
#[builder(setter(into, strip_option, prefix = "with"), default)]
#[serde(rename_all = "PascalCase")]
pub struct ClientRequestProperties {
    /// Options to control the query.
    pub options: Option<Options>,
    /// Out-of-band parameter values, name mapped to literal form.
    pub parameters: Option<serde_json::Map<String, serde_json::Value>>,
    /// Client request id; generated when absent.
    #[serde(skip)]
    pub client_request_id: Option<String>,
    /// Application name for tracing.
    #[serde(skip)]
    pub application: Option<String>,
    /// User name for tracing.
    #[serde(skip)]
    pub user: Option<String>,
}

impl From<Options> for ClientRequestProperties {
    fn from(options: Options) -> Self {
        Self {
            options: Some(options),
            ..Default::default()
        }
    }
}

/// Request options for queries; the recognised server knobs plus a free-form
/// escape hatch for anything newer than this list.
#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, Default, derive_builder::Builder)]
#[builder(
    setter(into, strip_option, prefix = "with"),
    default,
    build_fn(validate = "Self::validate")
)]
pub struct Options {
    /// If set and positive, indicates the maximum number of HTTP redirects that the client will process.
    pub client_max_redirect_count: Option<i64>,
    /// If true, disables reporting partial query failures as part of the result set.
    #[serde(rename = "deferpartialqueryfailures")]
    pub defer_partial_query_failures: Option<bool>,
    /// A hint to use shuffle strategy for materialized views that are referenced in the query.
    pub materialized_view_shuffle: Option<serde_json::Value>,
    /// Overrides the default maximum amount of memory a whole query may allocate per node.
    pub max_memory_consumption_per_query_per_node: Option<u64>,
    /// Overrides the default maximum amount of memory a query operator may allocate.
    #[serde(rename = "maxmemoryconsumptionperiterator")]
    pub max_memory_consumption_per_iterator: Option<u64>,
    /// Overrides the default maximum number of columns a query is allowed to produce.
    #[serde(rename = "maxoutputcolumns")]
    pub max_output_columns: Option<u64>,
    /// Enables setting the request timeout to its maximum value.
    #[serde(rename = "norequesttimeout")]
    pub no_request_timeout: Option<bool>,
    /// Enables suppressing truncation of the query results returned to the caller.
    #[serde(rename = "notruncation")]
    pub no_truncation: Option<bool>,
    /// If true, push simple selection through aggregation.
    pub push_selection_through_aggregation: Option<bool>,
    /// When evaluating the bin_auto() function, the start value to use.
    pub query_bin_auto_at: Option<String>,
    /// When evaluating the bin_auto() function, the bin size value to use.
    pub query_bin_auto_size: Option<String>,
    /// The default parameter value of the cursor_after() function when called without parameters.
    pub query_cursor_after_default: Option<String>,
    /// The default parameter value of the cursor_before_or_at() function when called without parameters.
    pub query_cursor_before_or_at_default: Option<String>,
    /// Overrides the cursor value returned by the cursor_current() or current_cursor() functions.
    pub query_cursor_current: Option<String>,
    /// Disables usage of cursor functions in the context of the query.
    pub query_cursor_disabled: Option<bool>,
    /// List of table names that should be scoped to cursor_after_default .. cursor_before_or_at_default (upper bound is optional).
    pub query_cursor_scoped_tables: Option<Vec<String>>,
    /// Controls the query's datascope - whether the query applies to all data or just part of it.
    #[serde(rename = "query_datascope")]
    pub query_data_scope: Option<DataScope>,
    /// Controls the column name for the query's datetime scope.
    #[serde(rename = "query_datetimescope_column")]
    pub query_datetime_scope_column: Option<String>,
    /// Controls the query's datetime scope (earliest).
    #[serde(rename = "query_datetimescope_from")]
    pub query_datetime_scope_from: Option<KustoDateTime>,
    /// Controls the query's datetime scope (latest).
    #[serde(rename = "query_datetimescope_to")]
    pub query_datetime_scope_to: Option<KustoDateTime>,
    /// If set, controls the way the subquery merge behaves: the executing node will introduce an
    /// additional level in the query hierarchy for each subgroup of nodes; the size of the subgroup
    /// is set by this option.
    pub query_distribution_nodes_span: Option<i32>,
    /// The percentage of nodes to fan out execution to.
    pub query_fanout_nodes_percent: Option<i32>,
    /// The percentage of threads to fan out execution to.
    pub query_fanout_threads_percent: Option<i32>,
    /// If specified, forces row level security rules, even if the policy is disabled.
    pub query_force_row_level_security: Option<bool>,
    /// Controls how the query text is to be interpreted.
    pub query_language: Option<QueryLanguage>,
    /// Enables logging of the query parameters, so that they can be viewed later in the .show queries journal.
    pub query_log_query_parameters: Option<bool>,
    /// Overrides the default maximum number of entities in a union.
    pub query_max_entities_in_union: Option<i64>,
    /// Overrides the datetime value returned by the now() function.
    pub query_now: Option<KustoDateTime>,
    /// If set, generate python debug query for the enumerated python node (default first).
    pub query_python_debug: Option<i32>,
    /// If set, retrieves the schema of each tabular data in the results of the query instead of the data itself.
    pub query_results_apply_getschema: Option<bool>,
    /// If positive, controls the maximum age of the cached query results the service is allowed to return.
    pub query_results_cache_max_age: Option<KustoTimespan>,
    /// If set, enables per-shard query cache.
    pub query_results_cache_per_shard: Option<bool>,
    /// Hint for the service as to how many records to send in each update.
    pub query_results_progressive_row_count: Option<i64>,
    /// Hint for the service as to how often to send progress frames.
    pub query_results_progressive_update_period: Option<i32>,
    /// Enables limiting query results to this number of records.
    pub query_take_max_records: Option<i64>,
    /// Controls query consistency.
    #[serde(rename = "queryconsistency")]
    pub query_consistency: Option<QueryConsistency>,
    /// Request application name to be used in the reporting (e.g. show queries).
    pub request_app_name: Option<String>,
    /// If specified, blocks access to tables for which a row level security policy is enabled.
    pub request_block_row_level_security: Option<bool>,
    /// If specified, indicates that the request can't call-out to a user-provided service.
    pub request_callout_disabled: Option<bool>,
    /// Arbitrary text that the author of the request wants to include as the request description.
    pub request_description: Option<String>,
    /// If specified, indicates that the request can't invoke code in the ExternalTable.
    pub request_external_table_disabled: Option<bool>,
    /// If specified, indicates that the service should not impersonate the caller's identity.
    pub request_impersonation_disabled: Option<bool>,
    /// If specified, indicates that the request can't write anything.
    pub request_readonly: Option<bool>,
    /// If specified, indicates that the request can't access remote databases and clusters.
    pub request_remote_entities_disabled: Option<bool>,
    /// If specified, indicates that the request can't invoke code in the sandbox.
    pub request_sandboxed_execution_disabled: Option<bool>,
    /// Request user to be used in the reporting (e.g. show queries).
    pub request_user: Option<String>,
    /// If set, enables the progressive query stream.
    pub results_progressive_enabled: Option<bool>,
    /// Overrides the default request timeout. Capped at one hour.
    #[serde(rename = "servertimeout")]
    pub server_timeout: Option<KustoTimespan>,
    /// Overrides the default maximum number of records a query is allowed to return to the caller (truncation).
    #[serde(rename = "truncation_max_records")]
    pub truncation_max_records: Option<i64>,
    /// Overrides the default maximum data size a query is allowed to return to the caller (truncation).
    #[serde(rename = "truncation_max_size")]
    pub truncation_max_size: Option<i64>,
    /// Validates the user's permissions to perform the query without running it.
    pub validate_permissions: Option<bool>,
    /// Additional options to be passed to the service verbatim.
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

impl Options {
    /// Adds a free-form option for server knobs this list does not know.
    pub fn add_custom(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.additional.insert(name.into(), value.into());
    }
}

impl OptionsBuilder {
    /// Adds a free-form option for server knobs this list does not know.
    pub fn with_custom(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        value: impl Into<serde_json::Value>,
    ) -> &mut Self {
        self.additional
            .get_or_insert_with(HashMap::new)
            .insert(name.into().into_owned(), value.into());
        self
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(Some(KustoTimespan(Some(timeout)))) = &self.server_timeout {
            if *timeout > MAX_SERVER_TIMEOUT {
                return Err(format!(
                    "servertimeout {} exceeds the one hour cap",
                    KustoTimespan(Some(*timeout))
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_wire_names() {
        let options = OptionsBuilder::default()
            .with_no_truncation(true)
            .with_server_timeout(KustoTimespan::new(time::Duration::minutes(5)))
            .with_query_consistency(QueryConsistency::WeakConsistency)
            .build()
            .unwrap();
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["notruncation"], serde_json::json!(true));
        assert_eq!(json["servertimeout"], serde_json::json!("00:05:00"));
        assert_eq!(
            json["queryconsistency"],
            serde_json::json!("weakconsistency")
        );
    }

    #[test]
    fn server_timeout_is_capped() {
        let too_long = OptionsBuilder::default()
            .with_server_timeout(KustoTimespan::new(time::Duration::hours(2)))
            .build();
        assert!(too_long.is_err());

        let ok = OptionsBuilder::default()
            .with_server_timeout(KustoTimespan::new(time::Duration::hours(1)))
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn custom_options_flatten() {
        let mut options = Options::default();
        options.add_custom("future_knob", "on");
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["future_knob"], serde_json::json!("on"));
    }

    #[test]
    fn applying_options_twice_is_idempotent() {
        let options = OptionsBuilder::default()
            .with_no_truncation(true)
            .with_query_take_max_records(100i64)
            .build()
            .unwrap();
        let first = serde_json::to_value(&options).unwrap();
        let second = serde_json::to_value(&options).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn properties_skip_local_fields() {
        let properties = ClientRequestProperties {
            options: Some(Options::default()),
            parameters: None,
            client_request_id: Some("id".to_string()),
            application: Some("app".to_string()),
            user: Some("user".to_string()),
        };
        let json = serde_json::to_value(&properties).unwrap();
        assert!(json.get("ClientRequestId").is_none());
        assert!(json.get("Options").is_some());
    }
}
