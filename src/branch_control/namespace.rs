use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::access::Access;
use super::binlog::{Binlog, BinlogEntry};
use super::context::AuthContext;
use super::table::{PatternKey, PatternTable};
use crate::error::{Error, Result};
use crate::types::Permissions;

/// One row of `dolt_branch_namespace_control`. A row reserves the branch
/// names its database and branch patterns match for the users its user and
/// host patterns match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceRow {
    pub database: String,
    pub branch: String,
    pub user: String,
    pub host: String,
}

impl NamespaceRow {
    pub fn new(database: &str, branch: &str, user: &str, host: &str) -> Self {
        Self {
            database: database.to_string(),
            branch: branch.to_string(),
            user: user.to_string(),
            host: host.to_string(),
        }
    }

    pub fn key(&self) -> Result<PatternKey> {
        PatternKey::fold(&self.database, &self.branch, &self.user, &self.host)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamespaceData {
    pub rows: Vec<NamespaceRow>,
    pub binlog: Binlog,
}

#[derive(Debug, Default)]
struct NamespaceState {
    rows: PatternTable<()>,
    binlog: Binlog,
}

impl NamespaceState {
    fn remove(&mut self, key: &PatternKey) -> bool {
        match self.rows.remove(key) {
            Some(row) => {
                self.binlog.delete(&row.key, Permissions::empty());
                true
            }
            None => false,
        }
    }

    fn push(&mut self, key: PatternKey) {
        self.binlog.insert(&key, Permissions::empty());
        self.rows.push(key, ());
    }
}

/// The branch namespace table. Changes are authorized against the shared
/// access table; the namespace lock is always taken before the access lock.
#[derive(Debug)]
pub struct Namespace {
    access: Arc<Access>,
    state: RwLock<NamespaceState>,
}

impl Namespace {
    pub fn new(access: Arc<Access>) -> Self {
        Self {
            access,
            state: RwLock::new(NamespaceState::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, NamespaceState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, NamespaceState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, ctx: Option<&dyn AuthContext>, row: &NamespaceRow) -> Result<()> {
        let key = row.key()?;
        let mut state = self.write();
        self.access.read().authorize(ctx, &key, "insert")?;
        if state.rows.contains(&key) {
            return Err(Error::Conflict {
                key,
                permissions: Permissions::empty(),
            });
        }
        debug!(key = %key, "Inserting branch namespace row");
        state.push(key);
        Ok(())
    }

    pub fn update(&self, ctx: Option<&dyn AuthContext>, old: &NamespaceRow, new: &NamespaceRow) -> Result<()> {
        let old_key = old.key()?;
        let new_key = new.key()?;
        let mut state = self.write();

        if old_key != new_key && state.rows.contains(&new_key) {
            return Err(Error::Conflict {
                key: new_key,
                permissions: Permissions::empty(),
            });
        }
        {
            let access = self.access.read();
            access.authorize(ctx, &old_key, "update")?;
            access.authorize(ctx, &new_key, "update")?;
        }

        debug!(from = %old_key, to = %new_key, "Updating branch namespace row");
        state.remove(&old_key);
        state.push(new_key);
        Ok(())
    }

    pub fn delete(&self, ctx: Option<&dyn AuthContext>, row: &NamespaceRow) -> Result<bool> {
        let key = row.key()?;
        let mut state = self.write();
        self.access.read().authorize(ctx, &key, "delete")?;
        let removed = state.remove(&key);
        if removed {
            debug!(key = %key, "Deleted branch namespace row");
        }
        Ok(removed)
    }

    /// Reports whether `user`@`host` may create `branch` in `database`.
    ///
    /// Branch names no row matches are unrestricted. Otherwise only the most
    /// specific matching rows count, and one of them must match the caller.
    pub fn can_create(&self, database: &str, branch: &str, user: &str, host: &str) -> bool {
        let state = self.read();
        let mut best: Option<usize> = None;
        let mut allowed = false;

        for row in state.rows.iter().filter(|row| row.pattern.matches_target(database, branch)) {
            let specificity = row.pattern.target_specificity();
            let caller_matches = row.pattern.matches_caller(user, host);
            match best {
                Some(current) if specificity < current => {}
                Some(current) if specificity == current => allowed |= caller_matches,
                _ => {
                    best = Some(specificity);
                    allowed = caller_matches;
                }
            }
        }
        best.is_none() || allowed
    }

    pub fn rows(&self) -> Vec<NamespaceRow> {
        self.read()
            .rows
            .iter()
            .map(|row| NamespaceRow {
                database: row.key.database.clone(),
                branch: row.key.branch.clone(),
                user: row.key.user.clone(),
                host: row.key.host.clone(),
            })
            .collect()
    }

    pub fn binlog(&self) -> Vec<BinlogEntry> {
        self.read().binlog.entries().to_vec()
    }

    pub fn len(&self) -> usize {
        self.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().rows.is_empty()
    }

    pub fn snapshot(&self) -> NamespaceData {
        NamespaceData {
            rows: self.rows(),
            binlog: self.read().binlog.clone(),
        }
    }

    pub fn restore(&self, data: NamespaceData) -> Result<()> {
        let mut rows = PatternTable::default();
        for row in &data.rows {
            let key = row.key()?;
            if rows.contains(&key) {
                return Err(Error::Corrupt(format!("duplicate namespace row {key}")));
            }
            rows.push(key, ());
        }
        let mut state = self.write();
        state.rows = rows;
        state.binlog = data.binlog;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch_control::access::AccessRow;
    use crate::branch_control::context::Session;

    fn namespace() -> Namespace {
        Namespace::new(Arc::new(Access::new()))
    }

    #[test]
    fn test_unclaimed_names_are_unrestricted() {
        let ns = namespace();
        assert!(ns.can_create("db", "anything", "bob", "localhost"));
        ns.insert(None, &NamespaceRow::new("%", "release%", "ci", "%")).unwrap();
        assert!(ns.can_create("db", "feature", "bob", "localhost"));
    }

    #[test]
    fn test_most_specific_rows_decide() {
        let ns = namespace();
        ns.insert(None, &NamespaceRow::new("%", "release%", "ci", "%")).unwrap();
        ns.insert(None, &NamespaceRow::new("%", "release-1%", "alice", "%")).unwrap();

        assert!(ns.can_create("db", "release-2", "ci", "h"));
        assert!(!ns.can_create("db", "release-2", "alice", "h"));
        // The longer pattern wins for release-1x, so ci loses access there.
        assert!(ns.can_create("db", "release-10", "alice", "h"));
        assert!(!ns.can_create("db", "release-10", "ci", "h"));
    }

    #[test]
    fn test_equally_specific_rows_all_count() {
        let ns = namespace();
        ns.insert(None, &NamespaceRow::new("%", "hot%", "a", "%")).unwrap();
        ns.insert(None, &NamespaceRow::new("%", "hot%", "b", "%")).unwrap();
        assert!(ns.can_create("db", "hotfix", "a", "h"));
        assert!(ns.can_create("db", "hotfix", "b", "h"));
        assert!(!ns.can_create("db", "hotfix", "c", "h"));
    }

    #[test]
    fn test_duplicate_conflicts_and_binlog_has_no_permissions() {
        let ns = namespace();
        let row = NamespaceRow::new("%", "x", "a", "%");
        ns.insert(None, &row).unwrap();
        assert!(matches!(ns.insert(None, &row), Err(Error::Conflict { .. })));
        assert!(ns.delete(None, &row).unwrap());

        let log = ns.binlog();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|e| e.permissions.is_empty()));
    }

    #[test]
    fn test_changes_are_authorized_against_access() {
        let access = Arc::new(Access::new());
        access
            .insert(None, &AccessRow::new("%", "team%", "lead", "%", Permissions::ADMIN))
            .unwrap();
        let ns = Namespace::new(access);
        let lead = Session::new("lead", "h");

        ns.insert(Some(&lead), &NamespaceRow::new("%", "team1", "x", "%")).unwrap();
        let err = ns
            .insert(Some(&lead), &NamespaceRow::new("%", "main", "x", "%"))
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));
    }
}
