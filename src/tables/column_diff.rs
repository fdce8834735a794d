use std::collections::HashSet;
use std::sync::Arc;

use super::changes::{ChangeSet, ChangeSets, change_rows, diff_partitions};
use super::{Filter, Partition, PartitionIter, RowIter, TableSource, partition_list};
use crate::error::Result;
use crate::types::{Column, ColumnType, Row, Value};
use crate::versioned::{
    DeltaKind, RowChange, RowDiff, TableDelta, TableSchema, VersionedStore, diff_rows,
};

/// `dolt_column_diff`: one row per column changed by each commit and by the
/// working set.
pub struct ColumnDiffTable {
    store: Arc<dyn VersionedStore>,
}

impl ColumnDiffTable {
    pub fn new(store: Arc<dyn VersionedStore>) -> Self {
        Self { store }
    }
}

/// Columns of one table that a delta touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColumnChange {
    pub name: String,
    pub change: RowChange,
}

impl ColumnChange {
    fn new(name: &str, change: RowChange) -> Self {
        Self {
            name: name.to_string(),
            change,
        }
    }
}

/// Lists the changed columns of a delta: added columns, then removed ones,
/// then columns present on both sides whose cells differ in some row.
pub(crate) fn column_changes(delta: &TableDelta) -> Vec<ColumnChange> {
    let (from, to) = match (delta.kind(), delta.from_schema(), delta.to_schema()) {
        (DeltaKind::Drop, Some(from), _) => {
            return from
                .columns
                .iter()
                .map(|c| ColumnChange::new(&c.name, RowChange::Removed))
                .collect();
        }
        (DeltaKind::Add, _, Some(to)) => {
            return to
                .columns
                .iter()
                .map(|c| ColumnChange::new(&c.name, RowChange::Added))
                .collect();
        }
        (_, Some(from), Some(to)) => (from, to),
        _ => return Vec::new(),
    };

    let mut changes = Vec::new();
    let mut candidates = Vec::new();
    for column in &to.columns {
        if from.index_of_tag(column.tag).is_some() {
            candidates.push(column.tag);
        } else {
            changes.push(ColumnChange::new(&column.name, RowChange::Added));
        }
    }
    for column in &from.columns {
        if to.index_of_tag(column.tag).is_none() {
            changes.push(ColumnChange::new(&column.name, RowChange::Removed));
        }
    }

    if candidates.is_empty() || !delta.has_data_change() {
        return changes;
    }

    let rows = diff_rows(delta.from_table.as_deref(), delta.to_table.as_deref());
    let modified = modified_tags(&candidates, from, to, rows);
    changes.extend(
        to.columns
            .iter()
            .filter(|c| modified.contains(&c.tag))
            .map(|c| ColumnChange::new(&c.name, RowChange::Modified)),
    );
    changes
}

/// Compares candidate columns cell by cell across changed rows, stopping as
/// soon as every candidate has been seen differing.
fn modified_tags<'a>(
    candidates: &[u64],
    from: &TableSchema,
    to: &TableSchema,
    rows: impl Iterator<Item = RowDiff<'a>>,
) -> HashSet<u64> {
    let mut modified = HashSet::new();
    for diff in rows {
        for &tag in candidates {
            if modified.contains(&tag) {
                continue;
            }
            let before = cell(from, diff.from, tag);
            let after = cell(to, diff.to, tag);
            if before != after {
                modified.insert(tag);
            }
        }
        if modified.len() == candidates.len() {
            break;
        }
    }
    modified
}

fn cell<'a>(schema: &TableSchema, row: Option<&'a Row>, tag: u64) -> &'a Value {
    static NULL: Value = Value::Null;
    schema
        .index_of_tag(tag)
        .and_then(|idx| row?.get(idx))
        .unwrap_or(&NULL)
}

fn render(set: &ChangeSet) -> Vec<Row> {
    let mut rows = Vec::new();
    for delta in &set.deltas {
        for change in column_changes(delta) {
            let [hash, committer, email, date, message] = set.commit_cells();
            rows.push(vec![
                hash,
                Value::text(delta.name()),
                Value::text(change.name),
                committer,
                email,
                date,
                message,
                Value::text(change.change.as_str()),
            ]);
        }
    }
    rows
}

impl TableSource for ColumnDiffTable {
    fn name(&self) -> &str {
        super::COLUMN_DIFF
    }

    fn columns(&self) -> Vec<Column> {
        vec![
            Column::new("commit_hash", ColumnType::Text).primary_key(),
            Column::new("table_name", ColumnType::Text).primary_key(),
            Column::new("column_name", ColumnType::Text).primary_key(),
            Column::new("committer", ColumnType::Text).nullable(),
            Column::new("email", ColumnType::Text).nullable(),
            Column::new("date", ColumnType::Timestamp).nullable(),
            Column::new("message", ColumnType::Text).nullable(),
            Column::new("diff_type", ColumnType::Text),
        ]
    }

    fn partitions(&self) -> Result<PartitionIter<'_>> {
        Ok(partition_list(vec![Partition::WorkingSet, Partition::CommitHistory]))
    }

    fn partitions_with(&self, filters: &[Filter]) -> Result<PartitionIter<'_>> {
        Ok(partition_list(diff_partitions(self.store.as_ref(), filters)?))
    }

    fn rows(&self, partition: Partition) -> Result<RowIter<'_>> {
        let sets = ChangeSets::new(self.store.as_ref(), partition)?;
        Ok(change_rows(sets, render))
    }
}
