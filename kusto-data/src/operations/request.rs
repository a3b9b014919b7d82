//! The request engine: builds the wire body, signs and posts it through the
//! pipeline, and hands the response to the right decoder and state machine.

use crate::client::{KustoClient, QueryKind};
use crate::endpoint_validator::validate_endpoint;
use crate::error::{Error, ErrorKind, OpKind, Result};
use crate::models::v1;
use crate::models::v2::{DataTable, Frame};
use crate::operations::frame_decoder::{parse_frames_full, spawn_frame_decoder};
use crate::operations::nonprogressive::NonProgressiveStateMachine;
use crate::operations::progressive::ProgressiveStateMachine;
use crate::operations::streaming::{KustoRowIterator, DEFAULT_ROW_BUFFER};
use crate::operations::v1::V1StateMachine;
use crate::request_options::ClientRequestProperties;
use azure_core::error::Error as CoreError;
use azure_core::prelude::*;
use azure_core::{Context, Method, Request, Response as HttpResponse, StatusCode};
use futures::TryStreamExt;
use serde::Serialize;
use std::borrow::Cow;
use std::io::ErrorKind as IoErrorKind;

/// The REST protocol version sent with every request.
pub(crate) const KUSTO_API_VERSION: &str = "2019-02-13";

#[derive(Serialize, Debug)]
struct QueryBody<'a> {
    /// Name of the database in scope that is the target of the query or command.
    db: &'a str,
    /// Text of the query or command to execute.
    csl: &'a str,
    /// Per-request properties: options and parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    properties: Option<&'a ClientRequestProperties>,
}

/// Replaces every non-ASCII code point with `?`; header values must be
/// plain ASCII.
pub(crate) fn scrub_ascii(value: &str) -> Cow<'_, str> {
    if value.is_ascii() {
        return Cow::Borrowed(value);
    }
    Cow::Owned(
        value
            .chars()
            .map(|c| if c.is_ascii() { c } else { '?' })
            .collect(),
    )
}

/// A single prepared request against the cluster.
pub(crate) struct QueryRunner {
    client: KustoClient,
    database: String,
    query: String,
    kind: QueryKind,
    properties: Option<ClientRequestProperties>,
}

impl QueryRunner {
    pub(crate) fn new(
        client: KustoClient,
        database: impl Into<String>,
        query: impl crate::query::KustoQuery,
        kind: QueryKind,
        properties: Option<ClientRequestProperties>,
    ) -> Self {
        let mut properties = properties;
        // The statement's declared values travel under properties.Parameters.
        if let Some(values) = query.parameter_values() {
            properties
                .get_or_insert_with(Default::default)
                .parameters
                .get_or_insert_with(Default::default)
                .extend(values);
        }
        Self {
            client,
            database: database.into(),
            query: query.query_text().into_owned(),
            kind,
            properties,
        }
    }

    fn op(&self) -> OpKind {
        match self.kind {
            QueryKind::Query => OpKind::Query,
            QueryKind::Management => OpKind::Mgmt,
        }
    }

    async fn into_response(self) -> Result<(HttpResponse, OpKind)> {
        let op = self.op();
        validate_endpoint(self.client.bare_pipeline(), self.client.service_url()).await?;

        let url = match self.kind {
            QueryKind::Query => self.client.query_url(),
            QueryKind::Management => self.client.management_url(),
        };
        let mut request = Request::new(url.parse().map_err(CoreError::from)?, Method::Post);

        request.insert_headers(&Accept::from("application/json"));
        request.insert_headers(&AcceptEncoding::from("gzip, deflate"));
        request.insert_headers(&ContentType::from("application/json; charset=utf-8"));
        request.insert_header("x-ms-version", KUSTO_API_VERSION);

        let client_request_id = self
            .properties
            .as_ref()
            .and_then(|p| p.client_request_id.clone())
            .unwrap_or_else(|| format!("KGC.execute;{}", uuid::Uuid::new_v4()));
        request.insert_header(
            "x-ms-client-request-id",
            scrub_ascii(&client_request_id).into_owned(),
        );

        let details = self.client.client_details();
        let application = self
            .properties
            .as_ref()
            .and_then(|p| p.application.as_deref())
            .unwrap_or(&details.application);
        let user = self
            .properties
            .as_ref()
            .and_then(|p| p.user.as_deref())
            .unwrap_or(&details.user);
        request.insert_header("x-ms-app", scrub_ascii(application).into_owned());
        request.insert_header("x-ms-user", scrub_ascii(user).into_owned());
        request.insert_header(
            "x-ms-client-version",
            scrub_ascii(&details.version).into_owned(),
        );

        let body = QueryBody {
            db: &self.database,
            csl: &self.query,
            properties: self.properties.as_ref(),
        };
        let bytes = bytes::Bytes::from(serde_json::to_string(&body)?);
        request.insert_headers(&ContentLength::new(bytes.len() as i32));
        request.set_body(bytes);

        tracing::debug!(
            database = %self.database,
            client_request_id = %client_request_id,
            kind = ?self.kind,
            "sending kusto request"
        );

        let response = self
            .client
            .pipeline()
            .send(&mut Context::new(), &mut request)
            .await
            .map_err(|e| Error::wrapping(op, ErrorKind::Io, e))?;

        let status = response.status();
        if status != StatusCode::Ok {
            let (_status, _headers, pinned_stream) = response.deconstruct();
            let body = pinned_stream
                .collect()
                .await
                .map_err(|e| Error::wrapping(op, ErrorKind::Io, e))?;
            return Err(Error::http(op, status, &body));
        }
        Ok((response, op))
    }

    /// Runs a V2 query and returns the streaming row iterator.
    pub(crate) async fn into_stream(self) -> Result<KustoRowIterator> {
        let (response, op) = self.into_response().await?;
        let (_status, _headers, pinned_stream) = response.deconstruct();
        let reader = pinned_stream
            .map_err(|e| std::io::Error::new(IoErrorKind::Other, e))
            .into_async_read();

        let mut frames = spawn_frame_decoder(reader, op);
        // The DataSetHeader picks the state machine; it never reaches it.
        let header = match frames.recv().await {
            Some(Ok(Frame::DataSetHeader(header))) => header,
            Some(Ok(other)) => {
                return Err(Error::new(
                    op,
                    ErrorKind::Internal,
                    format!("expected a DataSetHeader, got {}", other.frame_type()),
                ))
            }
            Some(Err(e)) => return Err(e),
            None => return Err(Error::new(op, ErrorKind::Internal, "empty response stream")),
        };

        let (senders, iterator) = KustoRowIterator::channel(DEFAULT_ROW_BUFFER);
        if header.is_progressive {
            tokio::spawn(ProgressiveStateMachine::new(frames, senders, op).run());
        } else {
            tokio::spawn(NonProgressiveStateMachine::new(frames, senders, op).run());
        }
        Ok(iterator)
    }

    /// Runs a V2 query and collects the whole frame set.
    pub(crate) async fn into_v2_dataset(self) -> Result<KustoResponseDataSetV2> {
        let (response, op) = self.into_response().await?;
        let (_status, _headers, pinned_stream) = response.deconstruct();
        let reader = pinned_stream
            .map_err(|e| std::io::Error::new(IoErrorKind::Other, e))
            .into_async_read();
        let frames = parse_frames_full(reader).await.map_err(|e| e.with_op(op))?;
        Ok(KustoResponseDataSetV2 { frames })
    }

    /// Runs a V1 management command and collects the reply tables.
    pub(crate) async fn into_v1_dataset(self) -> Result<KustoResponseDataSetV1> {
        let (response, op) = self.into_response().await?;
        let (_status, _headers, pinned_stream) = response.deconstruct();
        let body = pinned_stream
            .collect()
            .await
            .map_err(|e| Error::wrapping(op, ErrorKind::Io, e))?;
        let dataset = v1::Dataset::from_slice(&body)?;
        Ok(KustoResponseDataSetV1 {
            tables: dataset.tables,
        })
    }

    /// Runs a V1 management command and returns the streaming row iterator,
    /// with secondaries selected by the table of contents.
    pub(crate) async fn into_v1_stream(self) -> Result<KustoRowIterator> {
        let op = self.op();
        let dataset = self.into_v1_dataset().await?;
        let (senders, iterator) = KustoRowIterator::channel(DEFAULT_ROW_BUFFER);
        tokio::spawn(
            V1StateMachine::new(
                v1::Dataset {
                    tables: dataset.tables,
                },
                senders,
                op,
            )
            .run(),
        );
        Ok(iterator)
    }
}

/// A fully collected V2 response.
#[derive(Debug, Clone)]
pub struct KustoResponseDataSetV2 {
    /// All frames of the response, in arrival order.
    pub frames: Vec<Frame>,
}

impl KustoResponseDataSetV2 {
    /// The number of tables in the response.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.frames
            .iter()
            .filter(|f| matches!(f, Frame::DataTable(_)))
            .count()
    }

    /// Consumes the response into an iterator over the primary result tables.
    pub fn into_primary_results(self) -> impl Iterator<Item = DataTable> {
        self.frames.into_iter().filter_map(|frame| match frame {
            Frame::DataTable(table) if table.is_primary() => Some(table),
            _ => None,
        })
    }
}

/// A fully collected V1 (management) response.
#[derive(Debug, Clone, PartialEq)]
pub struct KustoResponseDataSetV1 {
    /// The reply tables, in arrival order.
    pub tables: Vec<v1::Table>,
}

impl KustoResponseDataSetV1 {
    /// The number of tables in the response.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrubbing_replaces_non_ascii() {
        assert_eq!(scrub_ascii("plain"), "plain");
        assert_eq!(scrub_ascii("naïve"), "na?ve");
        assert_eq!(scrub_ascii("データ"), "???");
    }

    #[test]
    fn body_shape() {
        let body = QueryBody {
            db: "db",
            csl: "T | take 1",
            properties: None,
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"db":"db","csl":"T | take 1"}"#
        );
    }

    #[test]
    fn body_with_properties() {
        let mut properties = ClientRequestProperties::default();
        properties
            .parameters
            .get_or_insert_with(Default::default)
            .insert(
                "id".to_string(),
                serde_json::Value::String("int(1)".to_string()),
            );
        let body = QueryBody {
            db: "db",
            csl: "declare query_parameters(id:int);\nT | where x == id",
            properties: Some(&properties),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["properties"]["Parameters"]["id"], "int(1)");
    }
}
