use std::sync::Arc;

use super::changes::{commit_partitions, partition_commits};
use super::table_diff::{current_table, project};
use super::{Filter, Partition, PartitionIter, RowIter, TableSource, partition_list};
use crate::error::Result;
use crate::types::{Column, ColumnType, Row, Value};
use crate::versioned::{Commit, TableSchema, VersionedStore};

/// `dolt_history_<table>`: every row of a user table at every commit.
pub struct HistoryTable {
    store: Arc<dyn VersionedStore>,
    name: String,
    table: String,
    schema: TableSchema,
}

impl HistoryTable {
    /// Opens the history table of `table`, or `None` if the user table is
    /// unknown.
    pub fn open(store: Arc<dyn VersionedStore>, table: &str) -> Result<Option<Self>> {
        let Some(current) = current_table(store.as_ref(), table)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            name: format!("{}{}", super::HISTORY_PREFIX, current.name),
            table: current.name.clone(),
            schema: current.schema.clone(),
            store,
        }))
    }

    fn commit_rows(&self, commit: &Commit) -> Vec<Row> {
        let Some(table) = commit.root.table(&self.table) else {
            return Vec::new();
        };
        table
            .rows
            .values()
            .map(|row| {
                let mut out = project(&self.schema, &table.schema, Some(row));
                out.push(Value::text(commit.hash.to_hex()));
                out.push(Value::text(&commit.meta.name));
                out.push(Value::Timestamp(commit.meta.timestamp));
                out
            })
            .collect()
    }
}

impl TableSource for HistoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> Vec<Column> {
        let mut columns: Vec<Column> = self
            .schema
            .columns
            .iter()
            .map(|c| {
                let column = Column::new(&c.name, c.column_type);
                if c.primary_key { column.primary_key() } else { column.nullable() }
            })
            .collect();
        columns.push(Column::new("commit_hash", ColumnType::Text).primary_key());
        columns.push(Column::new("committer", ColumnType::Text));
        columns.push(Column::new("commit_date", ColumnType::Timestamp));
        columns
    }

    fn partitions(&self) -> Result<PartitionIter<'_>> {
        Ok(partition_list(vec![Partition::CommitHistory]))
    }

    fn partitions_with(&self, filters: &[Filter]) -> Result<PartitionIter<'_>> {
        Ok(partition_list(commit_partitions(self.store.as_ref(), filters)?))
    }

    fn rows(&self, partition: Partition) -> Result<RowIter<'_>> {
        let commits = partition_commits(self.store.as_ref(), partition)?;
        Ok(RowIter::new(commits.flat_map(move |commit| match commit {
            Ok(commit) => self.commit_rows(&commit).into_iter().map(Ok).collect::<Vec<_>>(),
            Err(e) => vec![Err(e)],
        })))
    }
}
