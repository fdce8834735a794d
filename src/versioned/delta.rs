use std::collections::BTreeSet;
use std::sync::Arc;

use super::{RootValue, TableSchema, TableSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    Drop,
    Rename,
    Add,
    Modify,
}

/// How one table differs between two roots.
#[derive(Debug, Clone)]
pub struct TableDelta {
    pub from_name: Option<String>,
    pub to_name: Option<String>,
    pub from_table: Option<Arc<TableSnapshot>>,
    pub to_table: Option<Arc<TableSnapshot>>,
}

impl TableDelta {
    /// Classifies the delta. Checks run in the order drop, rename, add,
    /// modify, and the first that applies wins.
    pub fn kind(&self) -> DeltaKind {
        match (&self.from_table, &self.to_table) {
            (Some(_), None) => DeltaKind::Drop,
            (Some(_), Some(_)) if self.from_name != self.to_name => DeltaKind::Rename,
            (None, _) => DeltaKind::Add,
            (Some(_), Some(_)) => DeltaKind::Modify,
        }
    }

    pub fn is_drop(&self) -> bool {
        self.kind() == DeltaKind::Drop
    }

    pub fn is_add(&self) -> bool {
        self.kind() == DeltaKind::Add
    }

    pub fn is_rename(&self) -> bool {
        self.kind() == DeltaKind::Rename
    }

    /// The name to report the change under: the new name, unless dropped.
    pub fn name(&self) -> &str {
        self.to_name
            .as_deref()
            .or(self.from_name.as_deref())
            .unwrap_or_default()
    }

    pub fn from_schema(&self) -> Option<&TableSchema> {
        self.from_table.as_deref().map(|t| &t.schema)
    }

    pub fn to_schema(&self) -> Option<&TableSchema> {
        self.to_table.as_deref().map(|t| &t.schema)
    }

    fn content_changed(&self) -> bool {
        self.from_table.as_ref().map(|t| t.content_hash) != self.to_table.as_ref().map(|t| t.content_hash)
    }

    /// True when the table's rows differ.
    pub fn has_data_change(&self) -> bool {
        match self.kind() {
            DeltaKind::Drop => self.from_table.as_ref().is_some_and(|t| t.has_rows()),
            DeltaKind::Add => self.to_table.as_ref().is_some_and(|t| t.has_rows()),
            DeltaKind::Rename | DeltaKind::Modify => self.content_changed(),
        }
    }

    /// True when the table's schema or name differs.
    pub fn has_schema_change(&self) -> bool {
        match self.kind() {
            DeltaKind::Drop | DeltaKind::Rename | DeltaKind::Add => true,
            DeltaKind::Modify => {
                self.from_table.as_ref().map(|t| t.schema_hash) != self.to_table.as_ref().map(|t| t.schema_hash)
            }
        }
    }
}

/// Computes one delta per table present in either root, ordered by the name
/// the change is reported under. A dropped table and an added table with
/// identical schemas are paired as a rename. Unchanged tables are included;
/// callers filter on [`TableDelta::has_data_change`] and
/// [`TableDelta::has_schema_change`].
pub fn table_deltas(from: &RootValue, to: &RootValue) -> Vec<TableDelta> {
    let mut deltas = Vec::new();
    let mut dropped = Vec::new();
    let mut added: BTreeSet<&str> = BTreeSet::new();

    for table in from.tables() {
        match to.tables.get(&table.name) {
            Some(to_table) => deltas.push(TableDelta {
                from_name: Some(table.name.clone()),
                to_name: Some(to_table.name.clone()),
                from_table: Some(Arc::clone(table)),
                to_table: Some(Arc::clone(to_table)),
            }),
            None => dropped.push(table),
        }
    }
    for table in to.tables() {
        if !from.tables.contains_key(&table.name) {
            added.insert(&table.name);
        }
    }

    for table in dropped {
        let renamed = added
            .iter()
            .copied()
            .find(|name| to.tables.get(*name).is_some_and(|t| t.schema_hash == table.schema_hash));
        let to_table = renamed.and_then(|name| to.tables.get(name));
        if let Some(name) = renamed {
            added.remove(name);
        }
        deltas.push(TableDelta {
            from_name: Some(table.name.clone()),
            to_name: to_table.map(|t| t.name.clone()),
            from_table: Some(Arc::clone(table)),
            to_table: to_table.cloned(),
        });
    }
    for name in added {
        if let Some(table) = to.tables.get(name) {
            deltas.push(TableDelta {
                from_name: None,
                to_name: Some(table.name.clone()),
                from_table: None,
                to_table: Some(Arc::clone(table)),
            });
        }
    }

    deltas.sort_by(|a, b| a.name().cmp(b.name()));
    deltas
}
