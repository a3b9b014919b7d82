//! State machine for the V1 (management) dialect.
//!
//! A V1 reply is a whole array of tables. The trailing table of contents,
//! when present, selects which of the prior tables are primary; without it
//! the first table is primary and the rest are secondary.

use crate::error::{Error, ErrorKind, OpKind, Result};
use crate::models::v1::{Dataset, Row as V1Row, Table};
use crate::models::v2::{Column as V2Column, DataTable, Row as V2Row, TableKind};
use crate::operations::nonprogressive::emit_rows;
use crate::operations::streaming::StreamSenders;
use crate::value::{Column as ValueColumn, Columns};

/// The role a table plays in the reply, as selected by the table of contents.
struct TableRole {
    primary: bool,
    kind: TableKind,
    name: String,
}

pub(crate) struct V1StateMachine {
    dataset: Dataset,
    out: StreamSenders,
    op: OpKind,
}

impl V1StateMachine {
    pub(crate) fn new(dataset: Dataset, out: StreamSenders, op: OpKind) -> Self {
        Self { dataset, out, op }
    }

    /// Runs the machine to completion, reporting the terminal error through
    /// the iterator.
    pub(crate) async fn run(mut self) {
        if let Err(error) = self.process().await {
            self.out.terminal(error).await;
        }
    }

    async fn process(&mut self) -> Result<()> {
        let mut tables = std::mem::take(&mut self.dataset.tables);
        let toc = match tables.last() {
            Some(last) if tables.len() > 1 && last.is_table_of_contents() => tables.pop(),
            _ => None,
        };

        let roles = match &toc {
            Some(toc) => self.roles_from_toc(toc, tables.len())?,
            None => default_roles(&tables),
        };

        for (table, role) in tables.into_iter().zip(roles) {
            if role.primary {
                let columns = Columns::new(
                    table
                        .columns
                        .iter()
                        .map(|c| ValueColumn {
                            name: c.column_name.clone(),
                            column_type: c.column_type,
                        })
                        .collect(),
                )?;
                self.out.send_columns(&columns);
                let rows = table.rows.into_iter().map(v2_row).collect();
                emit_rows(&mut self.out, self.op, &columns, rows, false).await?;
            } else {
                self.out.stash_non_primary(as_data_table(table, role));
            }
        }

        if let Some(toc) = toc {
            let name = toc.table_name.clone();
            self.out.stash_non_primary(as_data_table(
                toc,
                TableRole {
                    primary: false,
                    kind: TableKind::TableOfContents,
                    name,
                },
            ));
        }
        Ok(())
    }

    /// Reads the roles out of the table of contents.
    ///
    /// Each row names one prior table: Ordinal selects it, Kind
    /// `QueryResult` marks it primary, Name becomes the lookup name of a
    /// secondary.
    fn roles_from_toc(&self, toc: &Table, table_count: usize) -> Result<Vec<TableRole>> {
        let mut roles: Vec<TableRole> = (0..table_count)
            .map(|_| TableRole {
                primary: false,
                kind: TableKind::Unknown,
                name: String::new(),
            })
            .collect();

        for row in &toc.rows {
            let V1Row::Values(cells) = row else {
                continue;
            };
            let ordinal = cells.first().and_then(cell_as_index).ok_or_else(|| {
                Error::new(
                    self.op,
                    ErrorKind::Internal,
                    "table of contents row without a valid Ordinal",
                )
            })?;
            if ordinal >= table_count {
                return Err(Error::new(
                    self.op,
                    ErrorKind::Internal,
                    format!("table of contents points at table {ordinal} of {table_count}"),
                ));
            }
            let kind = cells.get(1).and_then(|v| v.as_str()).unwrap_or_default();
            let name = cells.get(2).and_then(|v| v.as_str()).unwrap_or_default();

            roles[ordinal] = TableRole {
                primary: kind == "QueryResult" || name == "PrimaryResult",
                kind: kind_from_name(name),
                name: name.to_string(),
            };
        }
        Ok(roles)
    }
}

fn default_roles(tables: &[Table]) -> Vec<TableRole> {
    tables
        .iter()
        .enumerate()
        .map(|(i, table)| TableRole {
            primary: i == 0,
            kind: TableKind::Unknown,
            name: table.table_name.clone(),
        })
        .collect()
}

fn cell_as_index(cell: &serde_json::Value) -> Option<usize> {
    match cell {
        serde_json::Value::Number(n) => n.as_u64().map(|v| v as usize),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn kind_from_name(name: &str) -> TableKind {
    // TableKind names match the wire spelling; unknown names fall through
    // to the catch-all variant.
    serde_json::from_value(serde_json::Value::String(name.to_string()))
        .unwrap_or(TableKind::Unknown)
}

fn v2_row(row: V1Row) -> V2Row {
    match row {
        V1Row::Values(cells) => V2Row::Values(cells),
        V1Row::Error(errors) => V2Row::Error(errors),
    }
}

fn as_data_table(table: Table, role: TableRole) -> DataTable {
    DataTable {
        table_id: 0,
        table_name: if role.name.is_empty() {
            table.table_name
        } else {
            role.name
        },
        table_kind: role.kind,
        columns: table
            .columns
            .into_iter()
            .map(|c| V2Column {
                column_name: c.column_name,
                column_type: c.column_type,
            })
            .collect(),
        rows: table.rows.into_iter().map(v2_row).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::v1::Column as V1Column;
    use crate::models::ColumnType;
    use crate::operations::streaming::KustoRowIterator;

    fn string_column(name: &str) -> V1Column {
        V1Column {
            column_name: name.to_string(),
            column_type: ColumnType::String,
            data_type: None,
        }
    }

    fn values_table(name: &str, rows: &[&str]) -> Table {
        Table {
            table_name: name.to_string(),
            columns: vec![string_column("Text")],
            rows: rows
                .iter()
                .map(|v| V1Row::Values(vec![serde_json::json!(v)]))
                .collect(),
        }
    }

    fn toc(rows: Vec<(u64, &str, &str)>) -> Table {
        Table {
            table_name: "Table_3".to_string(),
            columns: ["Ordinal", "Kind", "Name", "Id", "PrettyName"]
                .iter()
                .copied()
                .map(string_column)
                .collect(),
            rows: rows
                .into_iter()
                .map(|(ordinal, kind, name)| {
                    V1Row::Values(vec![
                        serde_json::json!(ordinal.to_string()),
                        serde_json::json!(kind),
                        serde_json::json!(name),
                        serde_json::json!(ordinal.to_string()),
                        serde_json::json!(name),
                    ])
                })
                .collect(),
        }
    }

    async fn run(dataset: Dataset) -> KustoRowIterator {
        let (senders, iterator) = KustoRowIterator::channel(16);
        tokio::spawn(V1StateMachine::new(dataset, senders, OpKind::Mgmt).run());
        iterator
    }

    #[tokio::test]
    async fn toc_selects_primaries() {
        let dataset = Dataset {
            tables: vec![
                values_table("Table_0", &["one", "two"]),
                values_table("Table_1", &["props"]),
                toc(vec![
                    (0, "QueryResult", "PrimaryResult"),
                    (1, "QueryProperties", "QueryProperties"),
                ]),
            ],
        };
        let mut iterator = run(dataset).await;
        let mut names = Vec::new();
        while let Some(row) = iterator.next().await {
            let row = row.unwrap();
            names.push(row.get("Text").unwrap().as_string().unwrap().clone());
        }
        assert_eq!(names, ["one", "two"]);
        assert!(iterator
            .non_primary(TableKind::QueryProperties, "QueryProperties")
            .is_some());
        assert!(iterator
            .non_primary(TableKind::TableOfContents, "Table_3")
            .is_some());
    }

    #[tokio::test]
    async fn without_toc_first_table_is_primary() {
        let dataset = Dataset {
            tables: vec![
                values_table("Table_0", &["only"]),
                values_table("Table_1", &["extra"]),
            ],
        };
        let mut iterator = run(dataset).await;
        let row = iterator.next().await.unwrap().unwrap();
        assert_eq!(row.get("Text").unwrap().as_string().unwrap(), "only");
        assert!(iterator.next().await.is_none());
        assert!(iterator
            .non_primary(TableKind::Unknown, "Table_1")
            .is_some());
    }

    #[tokio::test]
    async fn toc_pointing_out_of_range_is_internal() {
        let dataset = Dataset {
            tables: vec![
                values_table("Table_0", &["x"]),
                toc(vec![(7, "QueryResult", "PrimaryResult")]),
            ],
        };
        let mut iterator = run(dataset).await;
        let error = iterator.next().await.unwrap().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn lone_toc_shaped_table_is_primary() {
        // A single table is never a table of contents, even with the shape.
        let dataset = Dataset {
            tables: vec![toc(vec![(0, "QueryResult", "PrimaryResult")])],
        };
        let mut iterator = run(dataset).await;
        let row = iterator.next().await.unwrap().unwrap();
        assert_eq!(row.get("Kind").unwrap().as_string().unwrap(), "QueryResult");
    }
}
