//! The consumer half of a streaming query: a lazy row sequence with
//! metadata side channels.

use crate::error::{Error, ErrorKind, OpKind, Result};
use crate::models::v2::{DataSetCompletion, DataTable, TableKind};
use crate::value::{Columns, Row};
use hashbrown::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot, watch};

/// Default capacity of the row channel.
pub const DEFAULT_ROW_BUFFER: usize = 1000;

/// One delivery of the row stream: a decoded row, or a non-fatal error the
/// service attached at this position of the table.
#[derive(Debug)]
pub enum StreamEntry {
    /// A decoded primary-result row.
    Row(Row),
    /// An inline row error, interleaved in delivery order.
    RowError(Error),
}

type NonPrimaryMap = HashMap<(TableKind, String), DataTable>;

/// The error used when the consumer stopped the query.
pub(crate) fn cancelled_error(op: OpKind) -> Error {
    Error::new(op, ErrorKind::Other, "the operation was cancelled")
}

/// Resolves once cancellation was requested, or the iterator was dropped.
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) {
    // An Err means the sending half is gone, which cancels just the same.
    let _ = rx.wait_for(|stop| *stop).await;
}

/// The producer half handed to a state machine.
pub(crate) struct StreamSenders {
    pub columns: Option<oneshot::Sender<Columns>>,
    pub rows: mpsc::Sender<Result<StreamEntry>>,
    pub progress: watch::Sender<f64>,
    pub completion: watch::Sender<Option<DataSetCompletion>>,
    pub non_primary: Arc<RwLock<NonPrimaryMap>>,
    pub cancel: watch::Receiver<bool>,
}

impl StreamSenders {
    /// Latches the columns; only the first call has an effect.
    pub fn send_columns(&mut self, columns: &Columns) {
        if let Some(tx) = self.columns.take() {
            let _ = tx.send(columns.clone());
        }
    }

    /// Sends one entry, observing cancellation.
    ///
    /// Returns `Err` with the cancellation error when the consumer stopped
    /// or went away.
    pub async fn send_entry(&mut self, op: OpKind, entry: StreamEntry) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancelled(&mut self.cancel) => Err(cancelled_error(op)),
            sent = self.rows.send(Ok(entry)) => sent.map_err(|_| cancelled_error(op)),
        }
    }

    /// Delivers the terminal error; the channel closes when the senders drop.
    pub async fn terminal(&mut self, error: Error) {
        let _ = self.rows.send(Err(error)).await;
    }

    /// Publishes the latest progress fraction.
    pub fn send_progress(&mut self, fraction: f64) {
        let _ = self.progress.send(fraction);
    }

    /// Stashes a secondary table for later lookup.
    pub fn stash_non_primary(&mut self, table: DataTable) {
        let mut map = self
            .non_primary
            .write()
            .expect("non-primary table map lock is never poisoned");
        map.insert((table.table_kind, table.table_name.clone()), table);
    }

    /// Records the dataset completion frame.
    pub fn send_completion(&mut self, completion: DataSetCompletion) {
        let _ = self.completion.send(Some(completion));
    }
}

/// A lazy sequence of primary-result rows produced by a running query.
///
/// Metadata accumulates on the side while iterating: the latest progress
/// fraction, the stashed secondary tables and the dataset completion.
/// After the first terminal error every subsequent [next](Self::next)
/// returns that same error.
pub struct KustoRowIterator {
    columns_rx: Option<oneshot::Receiver<Columns>>,
    columns: Option<Columns>,
    rows: mpsc::Receiver<Result<StreamEntry>>,
    progress: watch::Receiver<f64>,
    completion: watch::Receiver<Option<DataSetCompletion>>,
    non_primary: Arc<RwLock<NonPrimaryMap>>,
    cancel: watch::Sender<bool>,
    error: Option<Error>,
}

impl KustoRowIterator {
    /// Creates the channel pair connecting a state machine to an iterator.
    pub(crate) fn channel(row_buffer: usize) -> (StreamSenders, Self) {
        let (columns_tx, columns_rx) = oneshot::channel();
        let (rows_tx, rows_rx) = mpsc::channel(row_buffer);
        let (progress_tx, progress_rx) = watch::channel(0.0);
        let (completion_tx, completion_rx) = watch::channel(None);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let non_primary = Arc::new(RwLock::new(HashMap::new()));

        let senders = StreamSenders {
            columns: Some(columns_tx),
            rows: rows_tx,
            progress: progress_tx,
            completion: completion_tx,
            non_primary: non_primary.clone(),
            cancel: cancel_rx,
        };
        let iterator = Self {
            columns_rx: Some(columns_rx),
            columns: None,
            rows: rows_rx,
            progress: progress_rx,
            completion: completion_rx,
            non_primary,
            cancel: cancel_tx,
            error: None,
        };
        (senders, iterator)
    }

    /// The next row or inline row error, in delivery order.
    ///
    /// The first call waits until the column metadata was observed, so
    /// [columns](Self::columns) is always set before any row is seen.
    /// Returns `None` when the stream completed cleanly.
    pub async fn next_entry(&mut self) -> Option<Result<StreamEntry>> {
        if let Some(error) = &self.error {
            return Some(Err(error.clone()));
        }
        if let Some(columns_rx) = self.columns_rx.take() {
            // A dropped sender means the stream ended before any primary
            // table; fall through to drain the terminal state.
            if let Ok(columns) = columns_rx.await {
                self.columns = Some(columns);
            }
        }
        match self.rows.recv().await {
            Some(Ok(entry)) => Some(Ok(entry)),
            Some(Err(error)) => {
                self.error = Some(error.clone());
                Some(Err(error))
            }
            None => None,
        }
    }

    /// The next primary-result row, skipping inline row errors.
    pub async fn next(&mut self) -> Option<Result<Row>> {
        loop {
            match self.next_entry().await? {
                Ok(StreamEntry::Row(row)) => return Some(Ok(row)),
                Ok(StreamEntry::RowError(_)) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// Drives the stream to completion with a dual callback: rows go to
    /// `on_row`, inline row errors to `on_row_error`, in delivery order.
    pub async fn do2(
        mut self,
        mut on_row: impl FnMut(Row),
        mut on_row_error: impl FnMut(Error),
    ) -> Result<()> {
        while let Some(entry) = self.next_entry().await {
            match entry? {
                StreamEntry::Row(row) => on_row(row),
                StreamEntry::RowError(error) => on_row_error(error),
            }
        }
        Ok(())
    }

    /// Collects all remaining rows, failing on the first terminal error.
    pub async fn collect_rows(mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// The primary result's columns, available once the first
    /// [next](Self::next) returned.
    pub fn columns(&self) -> Option<&Columns> {
        self.columns.as_ref()
    }

    /// The latest reported progress fraction.
    pub fn progress(&self) -> f64 {
        *self.progress.borrow()
    }

    /// Looks up a stashed secondary table by kind and name.
    pub fn non_primary(&self, kind: TableKind, name: &str) -> Option<DataTable> {
        self.non_primary
            .read()
            .expect("non-primary table map lock is never poisoned")
            .get(&(kind, name.to_string()))
            .cloned()
    }

    /// The dataset completion frame, once it arrived.
    pub fn completion(&self) -> Option<DataSetCompletion> {
        self.completion.borrow().clone()
    }

    /// Requests cancellation of the driving tasks.
    ///
    /// The state machine observes the request at its next suspension point
    /// and resolves the stream with a cancellation error.
    pub fn stop(&self) {
        let _ = self.cancel.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnType;
    use crate::value::Column;

    fn columns() -> Columns {
        Columns::new(vec![Column {
            name: "a".to_string(),
            column_type: ColumnType::Int,
        }])
        .unwrap()
    }

    fn row(columns: &Columns, value: i32) -> Row {
        Row::decode(columns.clone(), &[serde_json::json!(value)]).unwrap()
    }

    #[tokio::test]
    async fn columns_precede_rows() {
        let (mut senders, mut iterator) = KustoRowIterator::channel(4);
        let cols = columns();
        let producer = {
            let cols = cols.clone();
            tokio::spawn(async move {
                senders.send_columns(&cols);
                senders
                    .send_entry(OpKind::Query, StreamEntry::Row(row(&cols, 1)))
                    .await
                    .unwrap();
            })
        };

        let first = iterator.next().await.unwrap().unwrap();
        assert_eq!(iterator.columns(), Some(&cols));
        assert_eq!(first.get("a").unwrap().as_i32(), Some(&1));
        producer.await.unwrap();
        assert!(iterator.next().await.is_none());
    }

    #[tokio::test]
    async fn terminal_error_is_sticky() {
        let (mut senders, mut iterator) = KustoRowIterator::channel(4);
        tokio::spawn(async move {
            senders
                .terminal(Error::new(OpKind::Query, ErrorKind::Internal, "boom"))
                .await;
        });

        let first = iterator.next().await.unwrap().unwrap_err();
        assert_eq!(first.kind(), ErrorKind::Internal);
        let second = iterator.next().await.unwrap().unwrap_err();
        assert_eq!(second.message(), first.message());
    }

    #[tokio::test]
    async fn do2_interleaves_rows_and_errors() {
        let (mut senders, iterator) = KustoRowIterator::channel(8);
        let cols = columns();
        {
            let cols = cols.clone();
            tokio::spawn(async move {
                senders.send_columns(&cols);
                senders
                    .send_entry(OpKind::Query, StreamEntry::Row(row(&cols, 1)))
                    .await
                    .unwrap();
                senders
                    .send_entry(
                        OpKind::Query,
                        StreamEntry::RowError(Error::new(
                            OpKind::Query,
                            ErrorKind::LimitsExceeded,
                            "too big",
                        )),
                    )
                    .await
                    .unwrap();
                senders
                    .send_entry(OpKind::Query, StreamEntry::Row(row(&cols, 2)))
                    .await
                    .unwrap();
            });
        }

        let mut rows = Vec::new();
        let mut errors = Vec::new();
        iterator
            .do2(|r| rows.push(r), |e| errors.push(e))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::LimitsExceeded);
    }

    #[tokio::test]
    async fn stop_cancels_a_blocked_producer() {
        let (mut senders, mut iterator) = KustoRowIterator::channel(1);
        let cols = columns();
        let producer = {
            let cols = cols.clone();
            tokio::spawn(async move {
                senders.send_columns(&cols);
                // Fill the bounded channel, then block on the next send until
                // cancellation is observed.
                senders
                    .send_entry(OpKind::Query, StreamEntry::Row(row(&cols, 1)))
                    .await
                    .unwrap();
                let blocked = senders
                    .send_entry(OpKind::Query, StreamEntry::Row(row(&cols, 2)))
                    .await;
                match blocked {
                    Err(e) => senders.terminal(e).await,
                    Ok(()) => {
                        let second = senders
                            .send_entry(OpKind::Query, StreamEntry::Row(row(&cols, 3)))
                            .await;
                        if let Err(e) = second {
                            senders.terminal(e).await;
                        }
                    }
                }
            })
        };

        let first = iterator.next().await.unwrap().unwrap();
        assert_eq!(first.get("a").unwrap().as_i32(), Some(&1));
        iterator.stop();
        // Drain until the cancellation error surfaces.
        let error = loop {
            match iterator.next().await {
                Some(Err(e)) => break e,
                Some(Ok(_)) => continue,
                None => panic!("expected a cancellation error"),
            }
        };
        assert!(error.message().contains("cancelled"));
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn progress_and_completion_are_observable() {
        let (mut senders, iterator) = KustoRowIterator::channel(4);
        senders.send_progress(0.5);
        senders.send_completion(DataSetCompletion {
            has_errors: false,
            cancelled: false,
            one_api_errors: None,
        });
        assert_eq!(iterator.progress(), 0.5);
        assert!(iterator.completion().is_some());
    }
}
