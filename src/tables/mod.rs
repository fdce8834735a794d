//! System tables.
//!
//! Each table implements [`TableSource`]: a fixed set of columns, a list of
//! partitions, and a lazy row iterator per partition. A query engine (or the
//! [`scan`] helper) enumerates partitions, then pulls rows from each. The two
//! branch control tables also implement [`MutableTableSource`].

mod binlog;
mod branch_control;
mod branches;
mod changes;
mod column_diff;
mod diff;
mod history;
mod log;
mod table_diff;

pub use binlog::BinlogTable;
pub use branch_control::{BranchControlTable, NamespaceControlTable};
pub use branches::BranchesTable;
pub use column_diff::ColumnDiffTable;
pub use diff::DiffTable;
pub use history::HistoryTable;
pub use log::LogTable;
pub use table_diff::{DiffPartition, TableDiffTable};

use std::sync::Arc;

use crate::branch_control::{AuthContext, Controller};
use crate::error::{Error, Result};
use crate::types::{Column, Row, Value};
use crate::versioned::{Commit, VersionedStore};

pub const BRANCH_CONTROL: &str = "dolt_branch_control";
pub const BRANCH_CONTROL_BINLOG: &str = "dolt_branch_control_binlog";
pub const NAMESPACE_CONTROL: &str = "dolt_branch_namespace_control";
pub const NAMESPACE_CONTROL_BINLOG: &str = "dolt_branch_namespace_control_binlog";
pub const LOG: &str = "dolt_log";
pub const BRANCHES: &str = "dolt_branches";
pub const DIFF: &str = "dolt_diff";
pub const COLUMN_DIFF: &str = "dolt_column_diff";
pub const DIFF_PREFIX: &str = "dolt_diff_";
pub const HISTORY_PREFIX: &str = "dolt_history_";

const FIXED_TABLES: [&str; 8] = [
    BRANCH_CONTROL,
    BRANCH_CONTROL_BINLOG,
    NAMESPACE_CONTROL,
    NAMESPACE_CONTROL_BINLOG,
    LOG,
    BRANCHES,
    DIFF,
    COLUMN_DIFF,
];

/// A predicate pushed down from the query engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { column: String, value: Value },
    In { column: String, values: Vec<Value> },
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq {
            column: column.to_string(),
            value: value.into(),
        }
    }

    pub fn any_of(column: &str, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Filter::In {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq { column, .. } | Filter::In { column, .. } => column,
        }
    }

    pub fn values(&self) -> &[Value] {
        match self {
            Filter::Eq { value, .. } => std::slice::from_ref(value),
            Filter::In { values, .. } => values,
        }
    }

    /// Evaluates the filter against a row. Filters on unknown columns pass.
    pub fn matches(&self, columns: &[Column], row: &Row) -> bool {
        let Some(idx) = columns.iter().position(|c| c.name.eq_ignore_ascii_case(self.column())) else {
            return true;
        };
        let Some(cell) = row.get(idx) else {
            return false;
        };
        self.values().iter().any(|value| values_equal(cell, value))
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Text(a), Value::Text(b)) => a.eq_ignore_ascii_case(b),
        (Value::Int(a), Value::UInt(b)) | (Value::UInt(b), Value::Int(a)) => {
            u64::try_from(*a).is_ok_and(|a| a == *b)
        }
        _ => a == b,
    }
}

/// Text values of every filter on `column`, intersected. `None` when no
/// filter names the column.
pub(crate) fn filter_values(filters: &[Filter], column: &str) -> Option<Vec<String>> {
    let mut result: Option<Vec<String>> = None;
    for filter in filters.iter().filter(|f| f.column().eq_ignore_ascii_case(column)) {
        let values: Vec<String> = filter.values().iter().map(ToString::to_string).collect();
        result = Some(match result {
            None => values,
            Some(current) => current
                .into_iter()
                .filter(|v| values.iter().any(|w| w.eq_ignore_ascii_case(v)))
                .collect(),
        });
    }
    result
}

/// One independently iterable slice of a table.
#[derive(Debug, Clone)]
pub enum Partition {
    /// The whole table.
    Rows,
    /// Staged and unstaged changes.
    WorkingSet,
    /// Every commit reachable from HEAD.
    CommitHistory,
    /// Specific commits, resolved up front.
    Commits(Vec<Commit>),
    /// One table compared between two points in history.
    Diff(Box<DiffPartition>),
}

impl Partition {
    pub fn key(&self) -> String {
        match self {
            Partition::Rows => "rows".to_string(),
            Partition::WorkingSet => "working_set".to_string(),
            Partition::CommitHistory => "commit_history".to_string(),
            Partition::Commits(commits) => format!("commits({})", commits.len()),
            Partition::Diff(diff) => format!("{}..{}", diff.from_name, diff.to_name),
        }
    }
}

pub type PartitionIter<'a> = Box<dyn Iterator<Item = Result<Partition>> + 'a>;

pub(crate) fn partition_list<'a>(partitions: Vec<Partition>) -> PartitionIter<'a> {
    Box::new(partitions.into_iter().map(Ok))
}

/// A lazy, finite, non-restartable stream of rows.
pub struct RowIter<'a> {
    inner: Option<Box<dyn Iterator<Item = Result<Row>> + 'a>>,
}

impl<'a> RowIter<'a> {
    pub fn new(iter: impl Iterator<Item = Result<Row>> + 'a) -> Self {
        Self {
            inner: Some(Box::new(iter)),
        }
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self::new(rows.into_iter().map(Ok))
    }

    pub fn empty() -> Self {
        Self { inner: None }
    }

    /// Releases the underlying cursor. Later calls to `next` return `None`.
    pub fn close(&mut self) {
        self.inner = None;
    }
}

impl Iterator for RowIter<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.as_mut()?.next();
        if matches!(item, None | Some(Err(_))) {
            self.inner = None;
        }
        item
    }
}

pub trait TableSource: Send + Sync {
    fn name(&self) -> &str;

    fn columns(&self) -> Vec<Column>;

    fn partitions(&self) -> Result<PartitionIter<'_>>;

    /// Partitions narrowed by pushed-down filters. Tables that cannot use the
    /// filters return every partition; callers still apply the filters.
    fn partitions_with(&self, filters: &[Filter]) -> Result<PartitionIter<'_>> {
        let _ = filters;
        self.partitions()
    }

    fn rows(&self, partition: Partition) -> Result<RowIter<'_>>;
}

pub trait MutableTableSource: TableSource {
    fn insert(&self, ctx: Option<&dyn AuthContext>, row: &Row) -> Result<()>;

    fn update(&self, ctx: Option<&dyn AuthContext>, old: &Row, new: &Row) -> Result<()>;

    fn delete(&self, ctx: Option<&dyn AuthContext>, row: &Row) -> Result<()>;

    /// Flushes pending changes to the backing store.
    fn close(&self) -> Result<()>;
}

/// Reads every row matching `filters`.
pub fn scan(table: &dyn TableSource, filters: &[Filter]) -> Result<Vec<Row>> {
    let columns = table.columns();
    let mut rows = Vec::new();
    for partition in table.partitions_with(filters)? {
        let partition = partition?;
        tracing::debug!(table = table.name(), partition = %partition.key(), "Scanning partition");
        for row in table.rows(partition)? {
            let row = row?;
            if filters.iter().all(|f| f.matches(&columns, &row)) {
                rows.push(row);
            }
        }
    }
    Ok(rows)
}

/// The system tables of one database.
pub struct Database {
    name: String,
    store: Arc<dyn VersionedStore>,
    controller: Arc<Controller>,
}

impl Database {
    pub fn new(name: &str, store: Arc<dyn VersionedStore>, controller: Arc<Controller>) -> Self {
        Self {
            name: name.to_string(),
            store,
            controller,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn VersionedStore> {
        &self.store
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    /// User tables visible in the working set.
    pub fn user_tables(&self) -> Result<Vec<String>> {
        let roots = self.store.working_roots()?;
        Ok(roots.working.table_names().map(str::to_string).collect())
    }

    /// Every system table name, including the per-table diff and history
    /// tables of each user table.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = FIXED_TABLES.iter().map(|n| n.to_string()).collect();
        for table in self.user_tables()? {
            names.push(format!("{DIFF_PREFIX}{table}"));
            names.push(format!("{HISTORY_PREFIX}{table}"));
        }
        Ok(names)
    }

    /// Opens a system table by name, ignoring case. Unknown names and
    /// per-table names for missing user tables yield `None`.
    pub fn table(&self, name: &str) -> Result<Option<Box<dyn TableSource>>> {
        let lower = name.to_ascii_lowercase();
        let store = Arc::clone(&self.store);
        let table: Box<dyn TableSource> = match lower.as_str() {
            BRANCH_CONTROL => Box::new(BranchControlTable::new(Arc::clone(&self.controller))),
            NAMESPACE_CONTROL => Box::new(NamespaceControlTable::new(Arc::clone(&self.controller))),
            BRANCH_CONTROL_BINLOG => Box::new(BinlogTable::access(Arc::clone(&self.controller))),
            NAMESPACE_CONTROL_BINLOG => Box::new(BinlogTable::namespace(Arc::clone(&self.controller))),
            LOG => Box::new(LogTable::new(store)),
            BRANCHES => Box::new(BranchesTable::new(store)),
            DIFF => Box::new(DiffTable::new(store)),
            COLUMN_DIFF => Box::new(ColumnDiffTable::new(store)),
            _ => {
                if let Some(user_table) = lower.strip_prefix(DIFF_PREFIX) {
                    return Ok(TableDiffTable::open(store, user_table)?.map(|t| Box::new(t) as Box<dyn TableSource>));
                }
                if let Some(user_table) = lower.strip_prefix(HISTORY_PREFIX) {
                    return Ok(HistoryTable::open(store, user_table)?.map(|t| Box::new(t) as Box<dyn TableSource>));
                }
                return Ok(None);
            }
        };
        Ok(Some(table))
    }

    pub fn mutable_table(&self, name: &str) -> Option<Box<dyn MutableTableSource>> {
        let controller = Arc::clone(&self.controller);
        match name.to_ascii_lowercase().as_str() {
            BRANCH_CONTROL => Some(Box::new(BranchControlTable::new(controller))),
            NAMESPACE_CONTROL => Some(Box::new(NamespaceControlTable::new(controller))),
            _ => None,
        }
    }

    /// Like [`Database::table`], but unknown names are `Error::NotFound`.
    pub fn require_table(&self, name: &str) -> Result<Box<dyn TableSource>> {
        self.table(name)?
            .ok_or_else(|| Error::NotFound(format!("table {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType;

    #[test]
    fn test_filter_values_intersect() {
        let filters = vec![
            Filter::any_of("commit_hash", ["a", "b", "WORKING"]),
            Filter::any_of("COMMIT_HASH", ["b", "working"]),
            Filter::eq("other", 1i64),
        ];
        assert_eq!(
            filter_values(&filters, "commit_hash"),
            Some(vec!["b".to_string(), "WORKING".to_string()])
        );
        assert_eq!(filter_values(&filters, "missing"), None);
    }

    #[test]
    fn test_filter_matches_rows() {
        let columns = vec![
            Column::new("name", ColumnType::Text),
            Column::new("n", ColumnType::UInt),
        ];
        let row: Row = vec!["Main".into(), 3u64.into()];
        assert!(Filter::eq("name", "main").matches(&columns, &row));
        assert!(Filter::eq("n", 3i64).matches(&columns, &row));
        assert!(!Filter::any_of("n", [1u64, 2]).matches(&columns, &row));
        assert!(Filter::eq("unknown", "x").matches(&columns, &row));
    }

    #[test]
    fn test_row_iter_close_stops_iteration() {
        let mut rows = RowIter::from_rows(vec![vec![Value::Null], vec![Value::Null]]);
        assert!(rows.next().is_some());
        rows.close();
        assert!(rows.next().is_none());
        assert!(RowIter::empty().next().is_none());
    }
}
