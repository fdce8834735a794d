use std::sync::Arc;

use super::{Partition, PartitionIter, RowIter, TableSource, partition_list};
use crate::branch_control::Controller;
use crate::error::{Error, Result};
use crate::types::{Column, ColumnType, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Access,
    Namespace,
}

/// Read-only view of one branch control table's binlog.
pub struct BinlogTable {
    controller: Arc<Controller>,
    source: Source,
}

impl BinlogTable {
    /// `dolt_branch_control_binlog`.
    pub fn access(controller: Arc<Controller>) -> Self {
        Self {
            controller,
            source: Source::Access,
        }
    }

    /// `dolt_branch_namespace_control_binlog`, which has no permissions
    /// column.
    pub fn namespace(controller: Arc<Controller>) -> Self {
        Self {
            controller,
            source: Source::Namespace,
        }
    }
}

impl TableSource for BinlogTable {
    fn name(&self) -> &str {
        match self.source {
            Source::Access => super::BRANCH_CONTROL_BINLOG,
            Source::Namespace => super::NAMESPACE_CONTROL_BINLOG,
        }
    }

    fn columns(&self) -> Vec<Column> {
        let mut columns = vec![
            Column::new("index", ColumnType::UInt).primary_key(),
            Column::new("operation", ColumnType::Enum),
            Column::new("database", ColumnType::Text),
            Column::new("branch", ColumnType::Text),
            Column::new("user", ColumnType::Text),
            Column::new("host", ColumnType::Text),
        ];
        if self.source == Source::Access {
            columns.push(Column::new("permissions", ColumnType::Set));
        }
        columns
    }

    fn partitions(&self) -> Result<PartitionIter<'_>> {
        Ok(partition_list(vec![Partition::Rows]))
    }

    fn rows(&self, partition: Partition) -> Result<RowIter<'_>> {
        let Partition::Rows = partition else {
            return Err(Error::UnknownPartition);
        };
        let entries = match self.source {
            Source::Access => self.controller.access().binlog(),
            Source::Namespace => self.controller.namespace().binlog(),
        };
        let with_permissions = self.source == Source::Access;
        let rows = entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let mut row = vec![
                    Value::UInt(index as u64),
                    Value::text(entry.operation.as_str()),
                    Value::Text(entry.database),
                    Value::Text(entry.branch),
                    Value::Text(entry.user),
                    Value::Text(entry.host),
                ];
                if with_permissions {
                    row.push(Value::Text(entry.permissions.to_string()));
                }
                row
            })
            .collect();
        Ok(RowIter::from_rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch_control::{AccessRow, NamespaceRow};
    use crate::tables::scan;
    use crate::types::Permissions;

    #[test]
    fn test_indexes_follow_mutation_order() {
        let controller = Arc::new(Controller::new());
        let access = controller.access();
        let old = AccessRow::new("%", "main", "a", "%", Permissions::WRITE);
        let new = AccessRow::new("%", "dev", "a", "%", Permissions::WRITE);
        access.insert(None, &old).unwrap();
        access.update(None, &old, &new).unwrap();

        let rows = scan(&BinlogTable::access(Arc::clone(&controller)), &[]).unwrap();
        let summary: Vec<_> = rows.iter().map(|r| (r[0].clone(), r[1].clone(), r[3].clone())).collect();
        assert_eq!(
            summary,
            vec![
                (Value::UInt(0), Value::text("insert"), Value::text("main")),
                (Value::UInt(1), Value::text("delete"), Value::text("main")),
                (Value::UInt(2), Value::text("insert"), Value::text("dev")),
            ]
        );
        assert_eq!(rows[0][6], Value::text("write"));
    }

    #[test]
    fn test_namespace_binlog_has_no_permissions_column() {
        let controller = Arc::new(Controller::new());
        controller
            .namespace()
            .insert(None, &NamespaceRow::new("%", "x", "a", "%"))
            .unwrap();
        let table = BinlogTable::namespace(controller);
        assert_eq!(table.columns().len(), 6);
        assert_eq!(scan(&table, &[]).unwrap()[0].len(), 6);
    }
}
