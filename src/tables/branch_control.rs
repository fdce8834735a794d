use std::sync::Arc;

use tracing::debug;

use super::{MutableTableSource, Partition, PartitionIter, RowIter, TableSource, partition_list};
use crate::branch_control::{AccessRow, AuthContext, Controller, NamespaceRow};
use crate::error::{Error, Result};
use crate::types::{Column, ColumnType, Permissions, Row, Value};

fn pattern_columns() -> Vec<Column> {
    ["database", "branch", "user", "host"]
        .into_iter()
        .map(|name| Column::new(name, ColumnType::Text).primary_key())
        .collect()
}

fn text<'a>(row: &'a Row, idx: usize, column: &str) -> Result<&'a str> {
    match row.get(idx) {
        Some(Value::Text(s)) => Ok(s),
        Some(other) => Err(Error::InvalidRow(format!("{column} must be text, got {other}"))),
        None => Err(Error::InvalidRow(format!("missing {column}"))),
    }
}

fn check_arity(row: &Row, expected: usize) -> Result<()> {
    if row.len() != expected {
        return Err(Error::InvalidRow(format!(
            "expected {expected} values, got {}",
            row.len()
        )));
    }
    Ok(())
}

fn permissions(value: &Value) -> Result<Permissions> {
    match value {
        Value::Text(s) => Permissions::parse_set(s).ok_or_else(|| Error::InvalidPermission(s.clone())),
        Value::UInt(_) | Value::Int(_) => value
            .as_u64()
            .and_then(Permissions::from_bits)
            .ok_or_else(|| Error::InvalidPermission(value.to_string())),
        other => Err(Error::InvalidPermission(other.to_string())),
    }
}

/// Validates a raw row into an access record.
pub(crate) fn access_row(row: &Row) -> Result<AccessRow> {
    check_arity(row, 5)?;
    Ok(AccessRow::new(
        text(row, 0, "database")?,
        text(row, 1, "branch")?,
        text(row, 2, "user")?,
        text(row, 3, "host")?,
        permissions(&row[4])?,
    ))
}

/// Validates a raw row into a namespace record.
pub(crate) fn namespace_row(row: &Row) -> Result<NamespaceRow> {
    check_arity(row, 4)?;
    Ok(NamespaceRow::new(
        text(row, 0, "database")?,
        text(row, 1, "branch")?,
        text(row, 2, "user")?,
        text(row, 3, "host")?,
    ))
}

/// `dolt_branch_control`: who may do what on which branches.
pub struct BranchControlTable {
    controller: Arc<Controller>,
}

impl BranchControlTable {
    pub fn new(controller: Arc<Controller>) -> Self {
        Self { controller }
    }
}

impl TableSource for BranchControlTable {
    fn name(&self) -> &str {
        super::BRANCH_CONTROL
    }

    fn columns(&self) -> Vec<Column> {
        let mut columns = pattern_columns();
        columns.push(Column::new("permissions", ColumnType::Set));
        columns
    }

    fn partitions(&self) -> Result<PartitionIter<'_>> {
        Ok(partition_list(vec![Partition::Rows]))
    }

    fn rows(&self, partition: Partition) -> Result<RowIter<'_>> {
        let Partition::Rows = partition else {
            return Err(Error::UnknownPartition);
        };
        let rows = self
            .controller
            .access()
            .rows()
            .into_iter()
            .map(|row| {
                vec![
                    Value::Text(row.database),
                    Value::Text(row.branch),
                    Value::Text(row.user),
                    Value::Text(row.host),
                    Value::Text(row.permissions.to_string()),
                ]
            })
            .collect();
        Ok(RowIter::from_rows(rows))
    }
}

impl MutableTableSource for BranchControlTable {
    fn insert(&self, ctx: Option<&dyn AuthContext>, row: &Row) -> Result<()> {
        let row = access_row(row)?;
        self.controller.access().insert(ctx, &row)
    }

    fn update(&self, ctx: Option<&dyn AuthContext>, old: &Row, new: &Row) -> Result<()> {
        let old = access_row(old)?;
        let new = access_row(new)?;
        self.controller.access().update(ctx, &old, &new)
    }

    fn delete(&self, ctx: Option<&dyn AuthContext>, row: &Row) -> Result<()> {
        let row = access_row(row)?;
        let removed = self
            .controller
            .access()
            .delete(ctx, &row.database, &row.branch, &row.user, &row.host)?;
        if !removed {
            debug!(table = super::BRANCH_CONTROL, "Delete matched no row");
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.controller.save()
    }
}

/// `dolt_branch_namespace_control`: which users may create which branch names.
pub struct NamespaceControlTable {
    controller: Arc<Controller>,
}

impl NamespaceControlTable {
    pub fn new(controller: Arc<Controller>) -> Self {
        Self { controller }
    }
}

impl TableSource for NamespaceControlTable {
    fn name(&self) -> &str {
        super::NAMESPACE_CONTROL
    }

    fn columns(&self) -> Vec<Column> {
        pattern_columns()
    }

    fn partitions(&self) -> Result<PartitionIter<'_>> {
        Ok(partition_list(vec![Partition::Rows]))
    }

    fn rows(&self, partition: Partition) -> Result<RowIter<'_>> {
        let Partition::Rows = partition else {
            return Err(Error::UnknownPartition);
        };
        let rows = self
            .controller
            .namespace()
            .rows()
            .into_iter()
            .map(|row| {
                vec![
                    Value::Text(row.database),
                    Value::Text(row.branch),
                    Value::Text(row.user),
                    Value::Text(row.host),
                ]
            })
            .collect();
        Ok(RowIter::from_rows(rows))
    }
}

impl MutableTableSource for NamespaceControlTable {
    fn insert(&self, ctx: Option<&dyn AuthContext>, row: &Row) -> Result<()> {
        self.controller.namespace().insert(ctx, &namespace_row(row)?)
    }

    fn update(&self, ctx: Option<&dyn AuthContext>, old: &Row, new: &Row) -> Result<()> {
        let old = namespace_row(old)?;
        let new = namespace_row(new)?;
        self.controller.namespace().update(ctx, &old, &new)
    }

    fn delete(&self, ctx: Option<&dyn AuthContext>, row: &Row) -> Result<()> {
        if !self.controller.namespace().delete(ctx, &namespace_row(row)?)? {
            debug!(table = super::NAMESPACE_CONTROL, "Delete matched no row");
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.controller.save()
    }
}
