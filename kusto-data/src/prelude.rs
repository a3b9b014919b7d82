//! The kusto prelude.
//!
//! The prelude re-exports most commonly used items from this crate.
//!
//! # Examples
//!
//! Import the prelude with:
//!
//! ```
//! # #[allow(unused_imports)]
//! use kusto_data::prelude::*;
//! ```

pub use crate::client::{KustoClient, KustoClientOptions, QueryKind};
pub use crate::client_details::{ConnectorDetails, ConnectorDetailsBuilder};
pub use crate::connection_string::{
    ConnectionString, ConnectionStringAuth, DeviceCodeFunction, TokenCallbackFunction,
};
pub use crate::error::{Error, ErrorKind, OpKind};
pub use crate::models::v2::{DataTable, Frame, TableKind};
pub use crate::models::ColumnType;
pub use crate::operations::request::{KustoResponseDataSetV1, KustoResponseDataSetV2};
pub use crate::operations::streaming::{KustoRowIterator, StreamEntry};
pub use crate::query::{KqlBuilder, KustoQuery, ParamType, Statement};
pub use crate::request_options::{
    ClientRequestProperties, ClientRequestPropertiesBuilder, Options, OptionsBuilder,
};
pub use crate::value::{Column, Columns, KustoValue, Row};

// Token credentials are re-exported for user convenience.
pub use azure_identity::{
    AzureCliCredential, ClientSecretCredential, DefaultAzureCredential,
    DefaultAzureCredentialBuilder, EnvironmentCredential, TokenCredentialOptions,
};
