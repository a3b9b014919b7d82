//! State machine for progressive V2 streams: header + fragments + completion.

use crate::error::{Error, ErrorKind, OpKind, Result};
use crate::models::v2::{
    DataTable, Frame, TableFragment, TableFragmentType, TableHeader, TableKind,
};
use crate::operations::nonprogressive::emit_rows;
use crate::operations::streaming::{cancelled, cancelled_error, StreamSenders};
use crate::value::Columns;
use tokio::sync::mpsc;

/// What the machine is currently inside of.
enum OpenTable {
    /// No table is open.
    None,
    /// A primary table: fragments stream straight to the iterator.
    Primary { columns: Columns },
    /// A non-primary table: fragments buffer until completion.
    Secondary { table: DataTable },
}

/// Drives the iterator from a channel of progressive frames.
///
/// A primary table arrives as `TableHeader` + `TableFragment`* +
/// `TableCompletion`; complete `DataTable` frames are only legal for
/// non-primary kinds, and only outside an open table.
pub(crate) struct ProgressiveStateMachine {
    frames: mpsc::Receiver<Result<Frame>>,
    out: StreamSenders,
    op: OpKind,
}

impl ProgressiveStateMachine {
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

    fn internal(&self, message: impl Into<String>) -> Error {
        Error::new(self.op, ErrorKind::Internal, message)
    }

    async fn process(&mut self) -> Result<()> {
        let mut open = OpenTable::None;
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
                return Err(self.internal("stream ended without a DataSetCompletion frame"));
            };
            let frame = frame?;

            if completed {
                return Err(self.internal(format!(
                    "received a {} frame after the DataSetCompletion",
                    frame.frame_type()
                )));
            }

            match frame {
                Frame::TableHeader(header) => {
                    if !matches!(open, OpenTable::None) {
                        return Err(self.internal("TableHeader inside an open table"));
                    }
                    open = self.open_table(header)?;
                }
                Frame::TableFragment(fragment) => match &mut open {
                    OpenTable::None => {
                        return Err(self.internal("TableFragment before a TableHeader"))
                    }
                    OpenTable::Primary { columns } => {
                        let columns = columns.clone();
                        self.emit_fragment(&columns, fragment).await?;
                    }
                    OpenTable::Secondary { table } => table.rows.extend(fragment.rows),
                },
                Frame::TableProgress(progress) => {
                    if matches!(open, OpenTable::None) {
                        return Err(self.internal("TableProgress before a TableHeader"));
                    }
                    self.out.send_progress(progress.table_progress);
                }
                Frame::TableCompletion(_) => match std::mem::replace(&mut open, OpenTable::None) {
                    OpenTable::None => {
                        return Err(self.internal("TableCompletion before a TableHeader"))
                    }
                    OpenTable::Primary { .. } => {}
                    OpenTable::Secondary { table } => self.out.stash_non_primary(table),
                },
                Frame::DataTable(table) => {
                    if !matches!(open, OpenTable::None) {
                        return Err(self.internal("DataTable inside an open table"));
                    }
                    if table.is_primary() {
                        return Err(
                            self.internal("complete primary DataTable in a progressive stream")
                        );
                    }
                    self.out.stash_non_primary(table);
                }
                Frame::DataSetCompletion(completion) => {
                    self.out.send_completion(completion);
                    completed = true;
                }
                Frame::DataSetHeader(_) => {
                    return Err(self.internal("unexpected second DataSetHeader"))
                }
            }
        }
    }

    fn open_table(&mut self, header: TableHeader) -> Result<OpenTable> {
        if header.is_primary() {
            let columns = Columns::try_from(&header.columns[..])?;
            self.out.send_columns(&columns);
            Ok(OpenTable::Primary { columns })
        } else {
            Ok(OpenTable::Secondary {
                table: DataTable {
                    table_id: header.table_id,
                    table_name: header.table_name,
                    table_kind: header.table_kind,
                    columns: header.columns,
                    rows: Vec::new(),
                },
            })
        }
    }

    async fn emit_fragment(&mut self, columns: &Columns, fragment: TableFragment) -> Result<()> {
        let replace_first = fragment.starts_replace();
        emit_rows(&mut self.out, self.op, columns, fragment.rows, replace_first).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::v2::{Column, DataSetCompletion, OneApiError, OneApiErrors, Row as WireRow, TableCompletion};
    use crate::models::ColumnType;
    use crate::operations::streaming::KustoRowIterator;

    fn primary_header() -> Frame {
        Frame::TableHeader(TableHeader {
            table_id: 1,
            table_name: "PrimaryResult".to_string(),
            table_kind: TableKind::PrimaryResult,
            columns: vec![
                Column {
                    column_name: "Name".to_string(),
                    column_type: ColumnType::String,
                },
                Column {
                    column_name: "ID".to_string(),
                    column_type: ColumnType::Long,
                },
            ],
        })
    }

    fn fragment(fragment_type: TableFragmentType, names: &[&str]) -> Frame {
        Frame::TableFragment(TableFragment {
            table_id: 1,
            table_fragment_type: fragment_type,
            rows: names
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    WireRow::Values(vec![serde_json::json!(name), serde_json::json!(i as i64)])
                })
                .collect(),
        })
    }

    fn table_completion() -> Frame {
        Frame::TableCompletion(TableCompletion {
            table_id: 1,
            row_count: 3,
            one_api_errors: None,
        })
    }

    fn dataset_completion() -> Frame {
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
        tokio::spawn(ProgressiveStateMachine::new(frames_rx, senders, OpKind::Query).run());
        iterator
    }

    #[tokio::test]
    async fn replace_fragment_marks_its_first_row() {
        let mut iterator = run_frames(vec![
            Ok(primary_header()),
            Ok(fragment(TableFragmentType::DataAppend, &["Doak"])),
            Ok(fragment(
                TableFragmentType::DataReplace,
                &["Dubovski", "Evcpwtlj"],
            )),
            Ok(table_completion()),
            Ok(dataset_completion()),
        ])
        .await;

        let rows = [
            iterator.next().await.unwrap().unwrap(),
            iterator.next().await.unwrap().unwrap(),
            iterator.next().await.unwrap().unwrap(),
        ];
        assert!(iterator.next().await.is_none());

        assert_eq!(rows[0].get("Name").unwrap().as_string().unwrap(), "Doak");
        assert!(!rows[0].replace);
        assert_eq!(
            rows[1].get("Name").unwrap().as_string().unwrap(),
            "Dubovski"
        );
        assert!(rows[1].replace);
        assert_eq!(
            rows[2].get("Name").unwrap().as_string().unwrap(),
            "Evcpwtlj"
        );
        assert!(!rows[2].replace);
    }

    #[tokio::test]
    async fn complete_primary_table_is_illegal() {
        let table = Frame::DataTable(DataTable {
            table_id: 1,
            table_name: "PrimaryResult".to_string(),
            table_kind: TableKind::PrimaryResult,
            columns: vec![],
            rows: vec![],
        });
        let mut iterator = run_frames(vec![Ok(table)]).await;
        let error = iterator.next().await.unwrap().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn fragment_before_header_is_illegal() {
        let mut iterator =
            run_frames(vec![Ok(fragment(TableFragmentType::DataAppend, &["x"]))]).await;
        let error = iterator.next().await.unwrap().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn progress_before_header_is_illegal() {
        let progress = Frame::TableProgress(crate::models::v2::TableProgress {
            table_id: 1,
            table_progress: 0.2,
        });
        let mut iterator = run_frames(vec![Ok(progress)]).await;
        let error = iterator.next().await.unwrap().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn secondary_tables_buffer_until_completion() {
        let header = Frame::TableHeader(TableHeader {
            table_id: 2,
            table_name: "QueryCompletionInformation".to_string(),
            table_kind: TableKind::QueryCompletionInformation,
            columns: vec![Column {
                column_name: "Payload".to_string(),
                column_type: ColumnType::String,
            }],
        });
        let frag = Frame::TableFragment(TableFragment {
            table_id: 2,
            table_fragment_type: TableFragmentType::DataAppend,
            rows: vec![WireRow::Values(vec![serde_json::json!("stats")])],
        });
        let completion = Frame::TableCompletion(TableCompletion {
            table_id: 2,
            row_count: 1,
            one_api_errors: None,
        });
        let mut iterator = run_frames(vec![
            Ok(header),
            Ok(frag),
            Ok(completion),
            Ok(dataset_completion()),
        ])
        .await;

        assert!(iterator.next().await.is_none());
        let table = iterator
            .non_primary(
                TableKind::QueryCompletionInformation,
                "QueryCompletionInformation",
            )
            .unwrap();
        assert_eq!(table.rows.len(), 1);
    }

    #[tokio::test]
    async fn inline_row_errors_are_interleaved() {
        let errors = WireRow::Error(OneApiErrors {
            errors: vec![serde_json::from_value::<OneApiError>(serde_json::json!({
                "error": {
                    "code": "LimitsExceeded",
                    "message": "Request is invalid and cannot be executed.",
                    "@permanent": false
                }
            }))
            .unwrap()],
        });
        let frag = Frame::TableFragment(TableFragment {
            table_id: 1,
            table_fragment_type: TableFragmentType::DataAppend,
            rows: vec![
                WireRow::Values(vec![serde_json::json!("Doak"), serde_json::json!(10)]),
                errors,
            ],
        });
        let iterator = run_frames(vec![
            Ok(primary_header()),
            Ok(frag),
            Ok(table_completion()),
            Ok(dataset_completion()),
        ])
        .await;

        let mut rows = Vec::new();
        let mut row_errors = Vec::new();
        iterator
            .do2(|r| rows.push(r), |e| row_errors.push(e))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(row_errors.len(), 1);
        assert_eq!(row_errors[0].kind(), ErrorKind::LimitsExceeded);
        assert_eq!(
            row_errors[0].message(),
            "Request is invalid and cannot be executed.;See https://docs.microsoft.com/en-us/azure/kusto/concepts/querylimits"
        );
    }

    #[tokio::test]
    async fn frames_after_dataset_completion_are_illegal() {
        let mut iterator = run_frames(vec![
            Ok(dataset_completion()),
            Ok(primary_header()),
        ])
        .await;
        let error = iterator.next().await.unwrap().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Internal);
    }
}
