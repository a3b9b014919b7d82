//! Ingestion status: the persistent record schema and the wait-for-result
//! primitive.

use crate::error::{Error, Result};
use azure_data_tables::prelude::TableClient;
use azure_storage_queues::QueueClient;
use futures::StreamExt;
use kusto_data::error::OpKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// The state of an ingestion submission.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IngestionStatus {
    /// The submission was accepted but not yet queued.
    #[default]
    Pending,
    /// The submission was queued for aggregation.
    Queued,
    /// All data was ingested.
    Succeeded,
    /// Nothing was ingested.
    Failed,
    /// Some of the data was ingested.
    PartiallySucceeded,
}

impl IngestionStatus {
    /// Whether this status is final.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            IngestionStatus::Succeeded
                | IngestionStatus::Failed
                | IngestionStatus::PartiallySucceeded
        )
    }

    /// Whether this status reports a failure.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            IngestionStatus::Failed | IngestionStatus::PartiallySucceeded
        )
    }
}

/// Classifies a failed ingestion.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FailureStatus {
    /// The failure class is not known.
    #[default]
    Unknown,
    /// Retrying will not help.
    Permanent,
    /// The failure may resolve on retry.
    Transient,
    /// Retries were attempted and gave up.
    Exhausted,
}

/// The status of one ingestion submission, keyed by its source id.
///
/// Persists to the ingestion status table as a flat property set and round
/// trips losslessly.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct StatusRecord {
    /// The state of the submission.
    pub status: IngestionStatus,
    /// Failure class, when failed.
    pub failure_status: FailureStatus,
    /// The unique id of this submission.
    pub ingestion_source_id: Uuid,
    /// Path (or name) of the submitted source, without secrets.
    pub ingestion_source_path: String,
    /// Target database.
    pub database: String,
    /// Target table.
    pub table: String,
    /// The service-side operation id.
    pub operation_id: Uuid,
    /// The service-side activity id.
    pub activity_id: Uuid,
    /// When the record was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_on: OffsetDateTime,
    /// Numeric error code, zero when successful.
    pub error_code: i32,
    /// Human-readable details.
    pub details: String,
}

impl StatusRecord {
    /// A fresh record for a submission that was just handed off.
    pub(crate) fn pending(
        source_id: Uuid,
        source_path: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            status: IngestionStatus::Pending,
            failure_status: FailureStatus::Unknown,
            ingestion_source_id: source_id,
            ingestion_source_path: source_path.into(),
            database: database.into(),
            table: table.into(),
            operation_id: Uuid::new_v4(),
            activity_id: Uuid::nil(),
            updated_on: OffsetDateTime::now_utc(),
            error_code: 0,
            details: String::new(),
        }
    }

    pub(crate) fn with_status(mut self, status: IngestionStatus) -> Self {
        self.status = status;
        self.updated_on = OffsetDateTime::now_utc();
        self
    }

    /// Synthesises the record of a submission that failed on the client
    /// before any service hand-off.
    pub(crate) fn client_error(
        source_id: Uuid,
        source_path: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            status: IngestionStatus::Failed,
            failure_status: FailureStatus::Permanent,
            details: details.into(),
            ..Self::pending(source_id, source_path, database, table)
        }
    }
}

const POLL_INITIAL_INTERVAL: Duration = Duration::from_secs(1);
const POLL_MAX_INTERVAL: Duration = Duration::from_secs(30);

enum Inner {
    /// The outcome is already known.
    Resolved(Box<StatusRecord>),
    /// Poll the ingestion status table by source id.
    TablePolling {
        record: Box<StatusRecord>,
        table: TableClient,
    },
    /// Consume the completion message from the secured notification queues.
    QueueReporting {
        record: Box<StatusRecord>,
        queues: Vec<QueueClient>,
    },
}

/// The future-like handle returned by every submission.
///
/// [wait](IngestionResult::wait) resolves to the terminal status: `Ok` on
/// success (or on hand-off for unreported queued submissions), a
/// status-carrying error on failure. Wrap the call in `tokio::time::timeout`
/// or a `select!` to bound or cancel the wait.
pub struct IngestionResult {
    inner: Inner,
    op: OpKind,
}

impl IngestionResult {
    pub(crate) fn resolved(op: OpKind, record: StatusRecord) -> Self {
        Self {
            inner: Inner::Resolved(Box::new(record)),
            op,
        }
    }

    pub(crate) fn table_polling(op: OpKind, record: StatusRecord, table: TableClient) -> Self {
        Self {
            inner: Inner::TablePolling {
                record: Box::new(record),
                table,
            },
            op,
        }
    }

    pub(crate) fn queue_reporting(
        op: OpKind,
        record: StatusRecord,
        queues: Vec<QueueClient>,
    ) -> Self {
        Self {
            inner: Inner::QueueReporting {
                record: Box::new(record),
                queues,
            },
            op,
        }
    }

    /// The source id of the tracked submission.
    pub fn source_id(&self) -> Uuid {
        self.record().ingestion_source_id
    }

    /// The latest known status record.
    pub fn record(&self) -> &StatusRecord {
        match &self.inner {
            Inner::Resolved(record) => record,
            Inner::TablePolling { record, .. } => record,
            Inner::QueueReporting { record, .. } => record,
        }
    }

    fn settle(op: OpKind, record: StatusRecord) -> Result<StatusRecord> {
        if record.status.is_failure() {
            Err(Error::Status {
                record: Box::new(record),
                op,
            })
        } else {
            Ok(record)
        }
    }

    /// Waits for the terminal status of the submission.
    pub async fn wait(self) -> Result<StatusRecord> {
        let op = self.op;
        match self.inner {
            Inner::Resolved(record) => Self::settle(op, *record),
            Inner::TablePolling { record, table } => {
                Self::settle(op, poll_status_table(*record, &table).await?)
            }
            Inner::QueueReporting { record, queues } => {
                Self::settle(op, poll_notification_queues(*record, &queues).await?)
            }
        }
    }
}

fn next_interval(current: Duration) -> Duration {
    POLL_MAX_INTERVAL.min(current * 2)
}

/// Polls the status table by source id until the record turns terminal.
async fn poll_status_table(record: StatusRecord, table: &TableClient) -> Result<StatusRecord> {
    let filter = format!(
        "IngestionSourceId eq guid'{}'",
        record.ingestion_source_id
    );
    let mut interval = POLL_INITIAL_INTERVAL;
    loop {
        let mut stream = table
            .query()
            .filter(filter.clone())
            .into_stream::<StatusRecord>();
        while let Some(page) = stream.next().await {
            let page = page.map_err(azure_core::error::Error::from)?;
            for entity in page.entities {
                if entity.ingestion_source_id != record.ingestion_source_id {
                    continue;
                }
                if entity.status.is_terminal() {
                    return Ok(entity);
                }
            }
        }
        tracing::trace!(
            source_id = %record.ingestion_source_id,
            "status table has no terminal record yet"
        );
        tokio::time::sleep(interval).await;
        interval = next_interval(interval);
    }
}

/// Consumes completion messages from the secured notification queues until
/// one matches the submission.
async fn poll_notification_queues(
    record: StatusRecord,
    queues: &[QueueClient],
) -> Result<StatusRecord> {
    let mut interval = POLL_INITIAL_INTERVAL;
    loop {
        for queue in queues {
            let response = queue
                .get_messages()
                .number_of_messages(32)
                .await
                .map_err(azure_core::error::Error::from)?;
            for message in response.messages {
                let raw = match azure_core::base64::decode(&message.message_text) {
                    Ok(raw) => raw,
                    Err(_) => continue,
                };
                let Ok(completion) = serde_json::from_slice::<StatusRecord>(&raw) else {
                    continue;
                };
                if completion.ingestion_source_id != record.ingestion_source_id {
                    continue;
                }
                // The completion message is ours; take it off the queue.
                let _ = queue
                    .pop_receipt_client(message)
                    .delete()
                    .await;
                return Ok(completion);
            }
        }
        tokio::time::sleep(interval).await;
        interval = next_interval(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> StatusRecord {
        StatusRecord::pending(Uuid::new_v4(), "data.csv", "db", "table")
    }

    #[tokio::test]
    async fn resolved_success_settles_ok() {
        let result = IngestionResult::resolved(
            OpKind::IngestStream,
            record().with_status(IngestionStatus::Succeeded),
        );
        let settled = result.wait().await.unwrap();
        assert_eq!(settled.status, IngestionStatus::Succeeded);
    }

    #[tokio::test]
    async fn resolved_queued_settles_ok() {
        let result = IngestionResult::resolved(
            OpKind::FileIngest,
            record().with_status(IngestionStatus::Queued),
        );
        assert!(result.wait().await.is_ok());
    }

    #[tokio::test]
    async fn client_error_short_circuits() {
        let failure = StatusRecord::client_error(
            Uuid::new_v4(),
            "no-such.csv",
            "db",
            "table",
            "file does not exist",
        );
        let result = IngestionResult::resolved(OpKind::FileIngest, failure);
        let error = result.wait().await.unwrap_err();
        let status = error.status().unwrap();
        assert_eq!(status.status, IngestionStatus::Failed);
        assert_eq!(status.failure_status, FailureStatus::Permanent);
        assert_eq!(error.op(), OpKind::FileIngest);
    }

    #[tokio::test]
    async fn partial_success_is_a_failure() {
        let result = IngestionResult::resolved(
            OpKind::FileIngest,
            record().with_status(IngestionStatus::PartiallySucceeded),
        );
        assert!(result.wait().await.is_err());
    }

    #[test]
    fn record_round_trips_through_flat_properties() {
        let record = StatusRecord {
            status: IngestionStatus::Succeeded,
            failure_status: FailureStatus::Unknown,
            ingestion_source_id: Uuid::new_v4(),
            ingestion_source_path: "https://account.blob.core.windows.net/c/b".to_string(),
            database: "db".to_string(),
            table: "table".to_string(),
            operation_id: Uuid::new_v4(),
            activity_id: Uuid::new_v4(),
            updated_on: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
            error_code: 0,
            details: String::new(),
        };
        let json = serde_json::to_string(&record).unwrap();
        let parsed: StatusRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn backoff_is_capped() {
        let mut interval = POLL_INITIAL_INTERVAL;
        for _ in 0..10 {
            interval = next_interval(interval);
        }
        assert_eq!(interval, POLL_MAX_INTERVAL);
    }
}
