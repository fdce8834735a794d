use std::sync::Arc;

use super::changes::{commit_partitions, partition_commits};
use super::{Filter, Partition, PartitionIter, RowIter, TableSource, partition_list};
use crate::error::Result;
use crate::types::{Column, ColumnType, Row, Value};
use crate::versioned::{Commit, VersionedStore};

/// `dolt_log`: the commits reachable from HEAD, newest first.
pub struct LogTable {
    store: Arc<dyn VersionedStore>,
}

impl LogTable {
    pub fn new(store: Arc<dyn VersionedStore>) -> Self {
        Self { store }
    }
}

fn log_row(commit: Commit) -> Row {
    vec![
        Value::text(commit.hash.to_hex()),
        Value::Text(commit.meta.name),
        Value::Text(commit.meta.email),
        Value::Timestamp(commit.meta.timestamp),
        Value::Text(commit.meta.description),
    ]
}

impl TableSource for LogTable {
    fn name(&self) -> &str {
        super::LOG
    }

    fn columns(&self) -> Vec<Column> {
        vec![
            Column::new("commit_hash", ColumnType::Text).primary_key(),
            Column::new("committer", ColumnType::Text),
            Column::new("email", ColumnType::Text),
            Column::new("date", ColumnType::Timestamp),
            Column::new("message", ColumnType::Text),
        ]
    }

    fn partitions(&self) -> Result<PartitionIter<'_>> {
        Ok(partition_list(vec![Partition::CommitHistory]))
    }

    fn partitions_with(&self, filters: &[Filter]) -> Result<PartitionIter<'_>> {
        Ok(partition_list(commit_partitions(self.store.as_ref(), filters)?))
    }

    fn rows(&self, partition: Partition) -> Result<RowIter<'_>> {
        let commits = partition_commits(self.store.as_ref(), partition)?;
        Ok(RowIter::new(commits.map(|commit| commit.map(log_row))))
    }
}
