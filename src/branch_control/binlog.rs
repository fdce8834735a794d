use serde::{Deserialize, Serialize};

use super::table::PatternKey;
use crate::types::Permissions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinlogOperation {
    Insert,
    Delete,
}

impl BinlogOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            BinlogOperation::Insert => "insert",
            BinlogOperation::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinlogEntry {
    pub operation: BinlogOperation,
    pub database: String,
    pub branch: String,
    pub user: String,
    pub host: String,
    #[serde(default)]
    pub permissions: Permissions,
}

/// Append-only record of every row inserted into or removed from a pattern
/// table. Entries are never rewritten or compacted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Binlog {
    entries: Vec<BinlogEntry>,
}

impl Binlog {
    pub fn insert(&mut self, key: &PatternKey, permissions: Permissions) {
        self.append(BinlogOperation::Insert, key, permissions);
    }

    pub fn delete(&mut self, key: &PatternKey, permissions: Permissions) {
        self.append(BinlogOperation::Delete, key, permissions);
    }

    fn append(&mut self, operation: BinlogOperation, key: &PatternKey, permissions: Permissions) {
        self.entries.push(BinlogEntry {
            operation,
            database: key.database.clone(),
            branch: key.branch.clone(),
            user: key.user.clone(),
            host: key.host.clone(),
            permissions,
        });
    }

    pub fn entries(&self) -> &[BinlogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
