//! State machine for non-progressive V2 streams: complete tables only.

use crate::error::{Error, ErrorKind, OpKind, Result};
use crate::models::v2::{DataTable, Frame, Row as WireRow, TableKind};
use crate::operations::streaming::{cancelled, cancelled_error, StreamEntry, StreamSenders};
use crate::value::{Columns, Row};
use tokio::sync::mpsc;

/// Drives the iterator from a channel of non-progressive frames.
///
/// The well-formed shape is: zero or more `DataTable` frames followed by
/// exactly one `DataSetCompletion`; the `DataSetHeader` was already consumed
/// by the request engine. The row channel closes exactly once, when this
/// machine returns.
pub(crate) struct NonProgressiveStateMachine {
    frames: mpsc::Receiver<Result<Frame>>,
    out: StreamSenders,
    op: OpKind,
}

enum State {
    Process,
    Done,
}

impl NonProgressiveStateMachine {
    pub(crate) fn new(
        frames: mpsc::Receiver<Result<Frame>>,
        out: StreamSenders,
        op: OpKind,
    ) -> Self {
        Self { frames, out, op }
    }

    /// Runs the machine to completion, reporting the terminal error through
    /// the iterator.
    pub(crate) async fn run(mut self) {
        if let Err(error) = self.process().await {
            self.out.terminal(error).await;
        }
    }

    async fn process(&mut self) -> Result<()> {
        let mut state = State::Process;
        let mut completed = false;
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancelled(&mut self.out.cancel) => return Err(cancelled_error(self.op)),
                frame = self.frames.recv() => frame,
            };
            let Some(frame) = frame else {
                if completed {
                    return Ok(());
                }
                return Err(Error::new(
                    self.op,
                    ErrorKind::Internal,
                    "stream ended without a DataSetCompletion frame",
                ));
            };
            let frame = frame?;

            match state {
                State::Process => match frame {
                    Frame::DataTable(table) if table.is_primary() => {
                        self.emit_primary(table).await?;
                    }
                    Frame::DataTable(table) => self.out.stash_non_primary(table),
                    Frame::DataSetCompletion(completion) => {
                        self.out.send_completion(completion);
                        completed = true;
                        state = State::Done;
                    }
                    other => {
                        return Err(Error::new(
                            self.op,
                            ErrorKind::Internal,
                            format!(
                                "unexpected {} frame in a non-progressive stream",
                                other.frame_type()
                            ),
                        ))
                    }
                },
                State::Done => {
                    return Err(Error::new(
                        self.op,
                        ErrorKind::Internal,
                        format!(
                            "received a {} frame after the DataSetCompletion",
                            frame.frame_type()
                        ),
                    ))
                }
            }
        }
    }

    async fn emit_primary(&mut self, table: DataTable) -> Result<()> {
        let columns = Columns::try_from(&table.columns[..])?;
        self.out.send_columns(&columns);
        emit_rows(&mut self.out, self.op, &columns, table.rows, false).await
    }
}

/// Forwards wire rows as decoded rows and inline row errors, in order.
///
/// When `replace_first` is set the first value row is marked as replacing
/// all previously delivered rows.
pub(crate) async fn emit_rows(
    out: &mut StreamSenders,
    op: OpKind,
    columns: &Columns,
    rows: Vec<WireRow>,
    replace_first: bool,
) -> Result<()> {
    let mut replace = replace_first;
    for wire_row in rows {
        match wire_row {
            WireRow::Values(cells) => {
                let mut row = Row::decode(columns.clone(), &cells)?;
                row.replace = replace;
                replace = false;
                out.send_entry(op, StreamEntry::Row(row)).await?;
            }
            WireRow::Error(errors) => {
                for error in errors.errors {
                    out.send_entry(op, StreamEntry::RowError(error.into_error(op)))
                        .await?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::v2::{Column, DataSetCompletion};
    use crate::models::ColumnType;
    use crate::operations::streaming::KustoRowIterator;

    fn primary_table() -> Frame {
        Frame::DataTable(DataTable {
            table_id: 1,
            table_name: "PrimaryResult".to_string(),
            table_kind: TableKind::PrimaryResult,
            columns: vec![
                Column {
                    column_name: "Timestamp".to_string(),
                    column_type: ColumnType::DateTime,
                },
                Column {
                    column_name: "Name".to_string(),
                    column_type: ColumnType::String,
                },
                Column {
                    column_name: "ID".to_string(),
                    column_type: ColumnType::Long,
                },
            ],
            rows: vec![
                WireRow::Values(vec![
                    serde_json::json!("2020-03-04T14:05:01.3109965Z"),
                    serde_json::json!("Doak"),
                    serde_json::json!(10),
                ]),
                WireRow::Values(vec![
                    serde_json::json!("2020-03-04T14:05:01.3109965Z"),
                    serde_json::json!("Dubovski"),
                    serde_json::Value::Null,
                ]),
            ],
        })
    }

    fn query_properties_table() -> Frame {
        Frame::DataTable(DataTable {
            table_id: 0,
            table_name: "@ExtendedProperties".to_string(),
            table_kind: TableKind::QueryProperties,
            columns: vec![
                Column {
                    column_name: "TableId".to_string(),
                    column_type: ColumnType::Int,
                },
                Column {
                    column_name: "Key".to_string(),
                    column_type: ColumnType::String,
                },
                Column {
                    column_name: "Value".to_string(),
                    column_type: ColumnType::Dynamic,
                },
            ],
            rows: vec![WireRow::Values(vec![
                serde_json::json!(1),
                serde_json::json!("Visualization"),
                serde_json::json!("{\"Visualization\":null}"),
            ])],
        })
    }

    fn completion() -> Frame {
        Frame::DataSetCompletion(DataSetCompletion {
            has_errors: false,
            cancelled: false,
            one_api_errors: None,
        })
    }

    async fn run_frames(frames: Vec<Result<Frame>>) -> KustoRowIterator {
        let (frames_tx, frames_rx) = mpsc::channel(16);
        let (senders, iterator) = KustoRowIterator::channel(16);
        tokio::spawn(async move {
            for frame in frames {
                if frames_tx.send(frame).await.is_err() {
                    return;
                }
            }
        });
        tokio::spawn(NonProgressiveStateMachine::new(frames_rx, senders, OpKind::Query).run());
        iterator
    }

    #[tokio::test]
    async fn two_row_query() {
        let mut iterator = run_frames(vec![
            Ok(query_properties_table()),
            Ok(primary_table()),
            Ok(completion()),
        ])
        .await;

        let first = iterator.next().await.unwrap().unwrap();
        assert_eq!(first.get("Name").unwrap().as_string().unwrap(), "Doak");
        let second = iterator.next().await.unwrap().unwrap();
        assert_eq!(second.get("Name").unwrap().as_string().unwrap(), "Dubovski");
        assert!(second.get("ID").unwrap().is_null());
        assert!(iterator.next().await.is_none());

        let secondary = iterator
            .non_primary(TableKind::QueryProperties, "@ExtendedProperties")
            .unwrap();
        assert_eq!(secondary.rows.len(), 1);
        assert!(iterator.completion().is_some());
    }

    #[tokio::test]
    async fn missing_completion_is_internal() {
        let mut iterator = run_frames(vec![Ok(primary_table())]).await;
        let mut terminal = None;
        while let Some(entry) = iterator.next().await {
            match entry {
                Ok(_) => continue,
                Err(e) => {
                    terminal = Some(e);
                    break;
                }
            }
        }
        assert_eq!(terminal.unwrap().kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn frames_after_completion_are_internal() {
        let mut iterator = run_frames(vec![
            Ok(completion()),
            Ok(primary_table()),
        ])
        .await;
        let error = iterator.next().await.unwrap().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn progressive_frames_are_illegal() {
        let header = Frame::TableHeader(crate::models::v2::TableHeader {
            table_id: 1,
            table_name: "t".to_string(),
            table_kind: TableKind::PrimaryResult,
            columns: vec![],
        });
        let mut iterator = run_frames(vec![Ok(header)]).await;
        let error = iterator.next().await.unwrap().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn inline_row_errors_reach_the_dual_callback() {
        let row_errors = WireRow::Error(crate::models::v2::OneApiErrors {
            errors: vec![
                serde_json::from_value(serde_json::json!({
                    "error": {
                        "code": "LimitsExceeded",
                        "message": "Request is invalid and cannot be executed.",
                        "@permanent": false
                    }
                }))
                .unwrap(),
                serde_json::from_value(serde_json::json!({
                    "error": {
                        "code": "Some other code",
                        "message": "Some other error",
                        "@permanent": false
                    }
                }))
                .unwrap(),
            ],
        });
        let Frame::DataTable(mut table) = primary_table() else {
            unreachable!()
        };
        table.rows.push(row_errors);

        let iterator = run_frames(vec![Ok(Frame::DataTable(table)), Ok(completion())]).await;

        let mut rows = Vec::new();
        let mut errors = Vec::new();
        iterator
            .do2(|r| rows.push(r), |e| errors.push(e))
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].kind(), ErrorKind::LimitsExceeded);
        assert_eq!(
            errors[0].message(),
            "Request is invalid and cannot be executed.;See https://docs.microsoft.com/en-us/azure/kusto/concepts/querylimits"
        );
        assert_eq!(errors[1].message(), "Some other error");
    }

    #[tokio::test]
    async fn decoder_error_is_terminal() {
        let mut iterator = run_frames(vec![Err(Error::new(
            OpKind::Query,
            ErrorKind::Internal,
            "bad frame",
        ))])
        .await;
        let error = iterator.next().await.unwrap().unwrap_err();
        assert_eq!(error.message(), "bad frame");
    }
}
