//! This module contains the client for the Azure Kusto Data service.

use crate::authorization_policy::AuthorizationPolicy;
use crate::client_details::{ClientDetails, ConnectorDetails};
use crate::connection_string::ConnectionString;
use crate::error::Result;
use crate::operations::request::{KustoResponseDataSetV1, KustoResponseDataSetV2, QueryRunner};
use crate::operations::streaming::KustoRowIterator;
use crate::query::KustoQuery;
use crate::request_options::ClientRequestProperties;

use azure_core::{ClientOptions, Pipeline};

use std::fmt::Debug;
use std::sync::Arc;

/// Options for specifying how a Kusto client will behave.
#[derive(Clone, Default)]
pub struct KustoClientOptions {
    options: ClientOptions,
    application: Option<String>,
    user: Option<String>,
}

impl From<ClientOptions> for KustoClientOptions {
    fn from(options: ClientOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }
}

impl KustoClientOptions {
    /// Create new options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the application name reported in the `x-ms-app` header.
    #[must_use]
    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.application = Some(application.into());
        self
    }

    /// Overrides the user reported in the `x-ms-user` header.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Reports a connector identity in the tracing headers instead of the
    /// process defaults.
    #[must_use]
    pub fn with_connector_details(mut self, details: ConnectorDetails) -> Self {
        let (application, user) = details.identity();
        self.application = Some(application);
        self.user = Some(user);
        self
    }
}

fn new_pipeline_from_options(
    auth: crate::connection_string::ConnectionStringAuth,
    resource: String,
    options: ClientOptions,
) -> Pipeline {
    let auth_policy = Arc::new(AuthorizationPolicy::new(auth, resource));
    // The authorization policy must be the last per-retry policy, so every
    // retry re-signs with a fresh token.
    let per_retry_policies: Vec<Arc<(dyn azure_core::Policy + 'static)>> = vec![auth_policy];

    Pipeline::new(
        option_env!("CARGO_PKG_NAME"),
        option_env!("CARGO_PKG_VERSION"),
        options,
        Vec::new(),
        per_retry_policies,
    )
}

/// Kusto client for Rust.
/// The client is a wrapper around the Kusto REST API.
/// To read more about it, go to [https://docs.microsoft.com/en-us/azure/kusto/api/rest/](https://docs.microsoft.com/en-us/azure/kusto/api/rest/)
///
/// The primary methods are:
/// [execute_query](KustoClient::execute_query) for KQL queries,
/// [execute_command](KustoClient::execute_command) for management commands,
/// and their streaming variants [iter_query](KustoClient::iter_query) and
/// [iter_command](KustoClient::iter_command).
#[derive(Clone, Debug)]
pub struct KustoClient {
    pipeline: Arc<Pipeline>,
    bare_pipeline: Arc<Pipeline>,
    service_url: Arc<String>,
    query_url: Arc<String>,
    management_url: Arc<String>,
    client_details: Arc<ClientDetails>,
}

/// Denotes what kind of query is being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// A management command, answered in the V1 dialect.
    Management,
    /// A KQL query, answered in the V2 dialect.
    Query,
}

impl KustoClient {
    /// Create a new Kusto client.
    /// This method accepts a connection string, which includes the cluster
    /// and the authentication information for it.
    /// # Example
    /// ```rust
    /// use kusto_data::prelude::*;
    ///
    /// let client = KustoClient::new(
    ///    ConnectionString::with_default_auth("https://mycluster.region.kusto.windows.net/"),
    ///    KustoClientOptions::default());
    ///
    /// assert!(client.is_ok());
    /// ```
    pub fn new(connection_string: ConnectionString, options: KustoClientOptions) -> Result<Self> {
        let (data_source, auth) = connection_string.into_data_source_and_auth();
        let service_url = data_source.trim_end_matches('/').to_string();
        let query_url = format!("{service_url}/v2/rest/query");
        let management_url = format!("{service_url}/v1/rest/mgmt");
        let pipeline =
            new_pipeline_from_options(auth, service_url.clone(), options.options.clone());
        let bare_pipeline = Pipeline::new(
            option_env!("CARGO_PKG_NAME"),
            option_env!("CARGO_PKG_VERSION"),
            options.options,
            Vec::new(),
            Vec::new(),
        );

        Ok(Self {
            pipeline: pipeline.into(),
            bare_pipeline: bare_pipeline.into(),
            service_url: Arc::new(service_url),
            query_url: Arc::new(query_url),
            management_url: Arc::new(management_url),
            client_details: Arc::new(ClientDetails::new(options.application, options.user)),
        })
    }

    /// The service root this client talks to, without a trailing slash.
    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    pub(crate) fn query_url(&self) -> &str {
        &self.query_url
    }

    pub(crate) fn management_url(&self) -> &str {
        &self.management_url
    }

    /// The authenticated pipeline; companion crates use it to hit endpoints
    /// this client does not wrap.
    #[doc(hidden)]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// An unauthenticated pipeline, for metadata calls that must not carry
    /// credentials.
    pub(crate) fn bare_pipeline(&self) -> &Pipeline {
        &self.bare_pipeline
    }

    pub(crate) fn client_details(&self) -> &ClientDetails {
        &self.client_details
    }

    /// Execute a KQL query and collect the whole response.
    /// To learn more about KQL go to [https://docs.microsoft.com/en-us/azure/kusto/query/](https://docs.microsoft.com/en-us/azure/kusto/query/)
    ///
    /// # Example
    /// ```no_run
    /// use kusto_data::prelude::*;
    ///
    /// # #[tokio::main] async fn main() -> Result<(), Error> {
    /// let client = KustoClient::new(
    ///    ConnectionString::with_default_auth("https://mycluster.region.kusto.windows.net/"),
    ///    KustoClientOptions::default())?;
    ///
    /// let result = client.execute_query("some_database", "MyTable | take 10").await?;
    ///
    /// for table in result.into_primary_results() {
    ///     println!("{}", table.table_name);
    /// }
    /// # Ok(())}
    /// ```
    pub async fn execute_query(
        &self,
        database: impl Into<String>,
        query: impl KustoQuery,
    ) -> Result<KustoResponseDataSetV2> {
        self.execute_query_with_options(database, query, None).await
    }

    /// Execute a KQL query with additional request options and collect the
    /// whole response.
    pub async fn execute_query_with_options(
        &self,
        database: impl Into<String>,
        query: impl KustoQuery,
        options: impl Into<Option<ClientRequestProperties>>,
    ) -> Result<KustoResponseDataSetV2> {
        QueryRunner::new(
            self.clone(),
            database,
            query,
            QueryKind::Query,
            options.into(),
        )
        .into_v2_dataset()
        .await
    }

    /// Execute a KQL query and stream the primary rows as they arrive.
    ///
    /// # Example
    /// ```no_run
    /// use kusto_data::prelude::*;
    ///
    /// # #[tokio::main] async fn main() -> Result<(), Error> {
    /// let client = KustoClient::new(
    ///    ConnectionString::with_default_auth("https://mycluster.region.kusto.windows.net/"),
    ///    KustoClientOptions::default())?;
    ///
    /// let mut rows = client.iter_query("some_database", "MyTable | take 10").await?;
    /// while let Some(row) = rows.next().await {
    ///     println!("{:?}", row?);
    /// }
    /// # Ok(())}
    /// ```
    pub async fn iter_query(
        &self,
        database: impl Into<String>,
        query: impl KustoQuery,
    ) -> Result<KustoRowIterator> {
        self.iter_query_with_options(database, query, None).await
    }

    /// Execute a KQL query with additional request options and stream the
    /// primary rows as they arrive.
    pub async fn iter_query_with_options(
        &self,
        database: impl Into<String>,
        query: impl KustoQuery,
        options: impl Into<Option<ClientRequestProperties>>,
    ) -> Result<KustoRowIterator> {
        QueryRunner::new(
            self.clone(),
            database,
            query,
            QueryKind::Query,
            options.into(),
        )
        .into_stream()
        .await
    }

    /// Execute a management command and collect the reply.
    /// To learn more see [commands](https://docs.microsoft.com/en-us/azure/data-explorer/kusto/management/).
    pub async fn execute_command(
        &self,
        database: impl Into<String>,
        query: impl KustoQuery,
    ) -> Result<KustoResponseDataSetV1> {
        self.execute_command_with_options(database, query, None)
            .await
    }

    /// Execute a management command with additional request options and
    /// collect the reply.
    pub async fn execute_command_with_options(
        &self,
        database: impl Into<String>,
        query: impl KustoQuery,
        options: impl Into<Option<ClientRequestProperties>>,
    ) -> Result<KustoResponseDataSetV1> {
        QueryRunner::new(
            self.clone(),
            database,
            query,
            QueryKind::Management,
            options.into(),
        )
        .into_v1_dataset()
        .await
    }

    /// Execute a management command and stream the primary rows, with
    /// secondaries selected by the reply's table of contents.
    pub async fn iter_command(
        &self,
        database: impl Into<String>,
        query: impl KustoQuery,
    ) -> Result<KustoRowIterator> {
        QueryRunner::new(self.clone(), database, query, QueryKind::Management, None)
            .into_v1_stream()
            .await
    }
}

impl TryFrom<ConnectionString> for KustoClient {
    type Error = crate::error::Error;

    fn try_from(value: ConnectionString) -> Result<Self> {
        Self::new(value, KustoClientOptions::new())
    }
}
