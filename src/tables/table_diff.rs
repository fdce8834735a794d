use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::changes::History;
use super::{Filter, Partition, PartitionIter, RowIter, TableSource, filter_values};
use crate::error::{Error, Result};
use crate::types::{Column, ColumnType, Row, Value};
use crate::versioned::{Commit, Hash, TableSchema, TableSnapshot, VersionedStore, WORKING, diff_rows};

/// One table compared between two points in history.
#[derive(Debug, Clone)]
pub struct DiffPartition {
    /// The newer version. Absent when the table did not exist.
    pub to: Option<Arc<TableSnapshot>>,
    /// The older version. Absent when the table did not exist.
    pub from: Option<Arc<TableSnapshot>>,
    /// Commit hash of the newer version, or `WORKING`.
    pub to_name: String,
    pub from_name: String,
    pub to_date: Option<DateTime<Utc>>,
    pub from_date: Option<DateTime<Utc>>,
}

/// Copies the cells of `row` into the layout of `target`, matching columns
/// by tag. Columns missing from `source` are null.
pub(crate) fn project(target: &TableSchema, source: &TableSchema, row: Option<&Row>) -> Vec<Value> {
    target
        .columns
        .iter()
        .map(|column| {
            source
                .index_of_tag(column.tag)
                .and_then(|idx| row.and_then(|r| r.get(idx)))
                .cloned()
                .unwrap_or(Value::Null)
        })
        .collect()
}

/// Finds a user table in the working set, falling back to HEAD.
pub(crate) fn current_table(store: &dyn VersionedStore, name: &str) -> Result<Option<Arc<TableSnapshot>>> {
    let roots = store.working_roots()?;
    Ok(roots
        .working
        .table(name)
        .or_else(|| roots.head.table(name))
        .cloned())
}

/// `dolt_diff_<table>`: row-level history of one user table.
pub struct TableDiffTable {
    store: Arc<dyn VersionedStore>,
    name: String,
    table: String,
    schema: TableSchema,
}

impl TableDiffTable {
    /// Opens the diff table of `table`. `None` if the user table exists in
    /// neither the working set nor HEAD.
    pub fn open(store: Arc<dyn VersionedStore>, table: &str) -> Result<Option<Self>> {
        let Some(current) = current_table(store.as_ref(), table)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            name: format!("{}{}", super::DIFF_PREFIX, current.name),
            table: current.name.clone(),
            schema: current.schema.clone(),
            store,
        }))
    }

    fn render(&self, partition: &DiffPartition) -> Vec<Row> {
        let empty = TableSchema::default();
        let to_schema = partition.to.as_ref().map_or(&empty, |t| &t.schema);
        let from_schema = partition.from.as_ref().map_or(&empty, |t| &t.schema);

        diff_rows(partition.from.as_deref(), partition.to.as_deref())
            .map(|diff| {
                let mut row = project(&self.schema, to_schema, diff.to);
                row.push(Value::text(&partition.to_name));
                row.push(partition.to_date.into());
                row.extend(project(&self.schema, from_schema, diff.from));
                row.push(Value::text(&partition.from_name));
                row.push(partition.from_date.into());
                row.push(Value::text(diff.change.as_str()));
                row
            })
            .collect()
    }
}

impl TableSource for TableDiffTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> Vec<Column> {
        let side = |prefix: &str| {
            let mut columns: Vec<Column> = self
                .schema
                .columns
                .iter()
                .map(|c| Column::new(format!("{prefix}_{}", c.name), c.column_type).nullable())
                .collect();
            columns.push(Column::new(format!("{prefix}_commit"), ColumnType::Text).nullable());
            columns.push(Column::new(format!("{prefix}_commit_date"), ColumnType::Timestamp).nullable());
            columns
        };
        let mut columns = side("to");
        columns.extend(side("from"));
        columns.push(Column::new("diff_type", ColumnType::Text));
        columns
    }

    fn partitions(&self) -> Result<PartitionIter<'_>> {
        self.partitions_with(&[])
    }

    fn partitions_with(&self, filters: &[Filter]) -> Result<PartitionIter<'_>> {
        Ok(Box::new(DiffPartitions::new(self.store.as_ref(), &self.table, filters)?))
    }

    fn rows(&self, partition: Partition) -> Result<RowIter<'_>> {
        let Partition::Diff(partition) = partition else {
            return Err(Error::UnknownPartition);
        };
        Ok(RowIter::from_rows(self.render(&partition)))
    }
}

/// The table as seen by the child of the commit being visited.
#[derive(Debug, Clone)]
struct TableAtCommit {
    name: String,
    date: Option<DateTime<Utc>>,
    table: Option<Arc<TableSnapshot>>,
    hash: Hash,
}

/// Walks history from HEAD and emits a partition wherever the table's hash
/// differs between a commit and its child. The first child is the working
/// set.
struct DiffPartitions<'a> {
    history: Option<History<'a>>,
    table: String,
    children: HashMap<Hash, TableAtCommit>,
    to_commits: Option<Vec<String>>,
    from_commits: Option<Vec<String>>,
}

impl<'a> DiffPartitions<'a> {
    fn new(store: &'a dyn VersionedStore, table: &str, filters: &[Filter]) -> Result<Self> {
        let mut partitions = Self {
            history: None,
            table: table.to_string(),
            children: HashMap::new(),
            to_commits: filter_values(filters, "to_commit"),
            from_commits: filter_values(filters, "from_commit"),
        };
        let head = match store.head() {
            Ok(head) => head,
            Err(Error::NotFound(_)) => return Ok(partitions),
            Err(e) => return Err(e),
        };
        let working = store.working_roots()?.working;
        partitions.children.insert(
            head.hash,
            TableAtCommit {
                name: WORKING.to_string(),
                date: None,
                table: working.table(table).cloned(),
                hash: working.table_hash(table),
            },
        );
        partitions.history = Some(History::from_head(store)?);
        Ok(partitions)
    }

    fn selected(&self, partition: &DiffPartition) -> bool {
        let names = |filter: &Option<Vec<String>>, name: &str| {
            filter
                .as_ref()
                .is_none_or(|values| values.iter().any(|v| v.eq_ignore_ascii_case(name)))
        };
        names(&self.to_commits, &partition.to_name) && names(&self.from_commits, &partition.from_name)
    }

    /// Records `commit` as the child of each of its parents and returns the
    /// partition between it and its own child, if the table changed there.
    /// A commit reached before any of its children yields nothing.
    fn visit(&mut self, commit: &Commit) -> Option<DiffPartition> {
        let table = commit.root.table(&self.table).cloned();
        let hash = commit.root.table_hash(&self.table);
        let label = commit.hash.to_hex();
        let date = Some(commit.meta.timestamp);
        let child = self.children.remove(&commit.hash);

        for parent in &commit.parents {
            self.children.insert(
                *parent,
                TableAtCommit {
                    name: label.clone(),
                    date,
                    table: table.clone(),
                    hash,
                },
            );
        }

        let child = child.filter(|child| child.hash != hash)?;
        Some(DiffPartition {
            to: child.table,
            from: table,
            to_name: child.name,
            from_name: label,
            to_date: child.date,
            from_date: date,
        })
    }
}

impl Iterator for DiffPartitions<'_> {
    type Item = Result<Partition>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let commit = match self.history.as_mut()?.next()? {
                Ok(commit) => commit,
                Err(e) => {
                    self.history = None;
                    return Some(Err(e));
                }
            };
            let Some(partition) = self.visit(&commit) else {
                continue;
            };

            // A table dropped in a later commit is a different table.
            let Some(to) = &partition.to else {
                self.history = None;
                return None;
            };
            if let Some(from) = &partition.from {
                if from.schema.pk_tags() != to.schema.pk_tags() {
                    warn!(
                        table = %self.table,
                        from = %partition.from_name,
                        to = %partition.to_name,
                        "Primary key changed, diff history stops here"
                    );
                    self.history = None;
                }
            }
            if self.selected(&partition) {
                return Some(Ok(Partition::Diff(Box::new(partition))));
            }
            self.history.as_ref()?;
        }
    }
}
