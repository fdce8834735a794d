use std::sync::Arc;

use super::{Partition, PartitionIter, RowIter, TableSource, partition_list};
use crate::error::{Error, Result};
use crate::types::{Column, ColumnType, Value};
use crate::versioned::VersionedStore;

/// `dolt_branches`: each branch with its head commit's metadata.
pub struct BranchesTable {
    store: Arc<dyn VersionedStore>,
}

impl BranchesTable {
    pub fn new(store: Arc<dyn VersionedStore>) -> Self {
        Self { store }
    }
}

impl TableSource for BranchesTable {
    fn name(&self) -> &str {
        super::BRANCHES
    }

    fn columns(&self) -> Vec<Column> {
        vec![
            Column::new("name", ColumnType::Text).primary_key(),
            Column::new("hash", ColumnType::Text),
            Column::new("latest_committer", ColumnType::Text),
            Column::new("latest_committer_email", ColumnType::Text),
            Column::new("latest_commit_date", ColumnType::Timestamp),
            Column::new("latest_commit_message", ColumnType::Text),
        ]
    }

    fn partitions(&self) -> Result<PartitionIter<'_>> {
        Ok(partition_list(vec![Partition::Rows]))
    }

    fn rows(&self, partition: Partition) -> Result<RowIter<'_>> {
        let Partition::Rows = partition else {
            return Err(Error::UnknownPartition);
        };
        let branches = self.store.branches()?;
        Ok(RowIter::new(branches.into_iter().map(|branch| {
            let commit = self.store.resolve_hash(&branch.head)?.into_commit()?;
            Ok(vec![
                Value::Text(branch.name),
                Value::text(commit.hash.to_hex()),
                Value::Text(commit.meta.name),
                Value::Text(commit.meta.email),
                Value::Timestamp(commit.meta.timestamp),
                Value::Text(commit.meta.description),
            ])
        })))
    }
}
