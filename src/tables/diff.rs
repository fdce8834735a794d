use std::sync::Arc;

use super::changes::{ChangeSet, ChangeSets, change_rows, diff_partitions};
use super::{Filter, Partition, PartitionIter, RowIter, TableSource, partition_list};
use crate::error::Result;
use crate::types::{Column, ColumnType, Row, Value};
use crate::versioned::VersionedStore;

/// `dolt_diff`: one row per table changed by each commit and by the working
/// set.
pub struct DiffTable {
    store: Arc<dyn VersionedStore>,
}

impl DiffTable {
    pub fn new(store: Arc<dyn VersionedStore>) -> Self {
        Self { store }
    }
}

fn render(set: &ChangeSet) -> Vec<Row> {
    set.deltas
        .iter()
        .filter_map(|delta| {
            let data_change = delta.has_data_change();
            let schema_change = delta.has_schema_change();
            if !data_change && !schema_change {
                return None;
            }
            let [hash, committer, email, date, message] = set.commit_cells();
            Some(vec![
                hash,
                Value::text(delta.name()),
                committer,
                email,
                date,
                message,
                Value::Bool(data_change),
                Value::Bool(schema_change),
            ])
        })
        .collect()
}

impl TableSource for DiffTable {
    fn name(&self) -> &str {
        super::DIFF
    }

    fn columns(&self) -> Vec<Column> {
        vec![
            Column::new("commit_hash", ColumnType::Text).primary_key(),
            Column::new("table_name", ColumnType::Text).primary_key(),
            Column::new("committer", ColumnType::Text).nullable(),
            Column::new("email", ColumnType::Text).nullable(),
            Column::new("date", ColumnType::Timestamp).nullable(),
            Column::new("message", ColumnType::Text).nullable(),
            Column::new("data_change", ColumnType::Bool),
            Column::new("schema_change", ColumnType::Bool),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::scan;
    use crate::versioned::{CommitMeta, MemoryStore, RootValue, TableColumn, TableSchema, TableSnapshot, WORKING};
    use chrono::{TimeZone, Utc};

    fn meta(secs: i64) -> CommitMeta {
        CommitMeta::new("Ann", "ann@example.com", Utc.timestamp_opt(secs, 0).unwrap(), "change")
    }

    fn people(rows: &[(i64, &str)]) -> TableSnapshot {
        let schema = TableSchema::new(vec![
            TableColumn::pk("id", 1, ColumnType::Int),
            TableColumn::new("name", 2, ColumnType::Text),
        ]);
        let rows = rows.iter().map(|(id, n)| vec![Value::Int(*id), Value::text(*n)]).collect();
        TableSnapshot::new("people", schema, rows).unwrap()
    }

    #[test]
    fn test_unchanged_tables_produce_no_rows() {
        let mut store = MemoryStore::new();
        let root = RootValue::new().with_table(people(&[(1, "a")]));
        store.commit("main", root.clone(), meta(1));
        store.commit("main", root.clone(), meta(2));
        store.commit("main", root, meta(3));

        let table = DiffTable::new(Arc::new(store));
        assert!(scan(&table, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_working_changes_have_null_metadata() {
        let mut store = MemoryStore::new();
        store.commit("main", RootValue::new(), meta(1));
        store.set_working(RootValue::new().with_table(people(&[])));

        let table = DiffTable::new(Arc::new(store));
        let rows = scan(&table, &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], Value::text(WORKING));
        assert_eq!(rows[0][2], Value::Null);
        assert_eq!(rows[0][6], Value::Bool(false));
        assert_eq!(rows[0][7], Value::Bool(true));
    }

    #[test]
    fn test_commit_hash_filter_limits_partitions() {
        let mut store = MemoryStore::new();
        store.commit("main", RootValue::new(), meta(1));
        let b = store.commit("main", RootValue::new().with_table(people(&[(1, "a")])), meta(2));
        store.set_working(RootValue::new().with_table(people(&[(1, "b")])));

        let table = DiffTable::new(Arc::new(store));
        let partitions: Vec<_> = table
            .partitions_with(&[Filter::eq("commit_hash", b.to_hex())])
            .unwrap()
            .map(|p| p.unwrap().key())
            .collect();
        assert_eq!(partitions, vec!["commits(1)".to_string()]);

        let rows = scan(&table, &[Filter::eq("commit_hash", b.to_hex())]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][2], Value::text("Ann"));

        let rows = scan(&table, &[Filter::eq("commit_hash", "working")]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][6], Value::Bool(true));
        assert_eq!(rows[0][7], Value::Bool(false));
    }
}
