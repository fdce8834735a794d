use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::binlog::{Binlog, BinlogEntry};
use super::context::{AuthContext, database_name_only};
use super::table::{MatchSet, PatternKey, PatternTable};
use crate::error::{Error, Result};
use crate::types::Permissions;

/// One row of `dolt_branch_control`, as supplied by or returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRow {
    pub database: String,
    pub branch: String,
    pub user: String,
    pub host: String,
    pub permissions: Permissions,
}

impl AccessRow {
    pub fn new(database: &str, branch: &str, user: &str, host: &str, permissions: Permissions) -> Self {
        Self {
            database: database.to_string(),
            branch: branch.to_string(),
            user: user.to_string(),
            host: host.to_string(),
            permissions,
        }
    }

    pub fn key(&self) -> Result<PatternKey> {
        PatternKey::fold(&self.database, &self.branch, &self.user, &self.host)
    }
}

/// Serialized form of the access table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessData {
    pub rows: Vec<AccessRow>,
    pub binlog: Binlog,
}

#[derive(Debug, Default)]
pub(crate) struct AccessState {
    pub(crate) rows: PatternTable<Permissions>,
    pub(crate) binlog: Binlog,
}

impl AccessState {
    /// Fails unless the caller may modify rows targeting `key`'s database and
    /// branch. A missing context bypasses the check.
    pub(crate) fn authorize(
        &self,
        ctx: Option<&dyn AuthContext>,
        key: &PatternKey,
        action: &'static str,
    ) -> Result<()> {
        let Some(ctx) = ctx else {
            return Ok(());
        };
        if ctx.has_database_privileges(database_name_only(&key.database)) {
            return Ok(());
        }

        let target = MatchSet::new(key);
        let granted = self
            .rows
            .iter()
            .filter(|row| {
                row.pattern.covers_target(&target) && row.pattern.matches_caller(ctx.user(), ctx.host())
            })
            .fold(Permissions::empty(), |acc, row| acc.union(row.value));
        if granted.has(Permissions::ADMIN) {
            return Ok(());
        }

        warn!(user = ctx.user(), host = ctx.host(), action, target = %key, "Branch control change denied");
        Err(Error::Unauthorized {
            user: ctx.user().to_string(),
            host: ctx.host().to_string(),
            action,
            target: key.clone(),
        })
    }

    pub(crate) fn match_permissions(
        &self,
        database: &str,
        branch: &str,
        user: &str,
        host: &str,
    ) -> (bool, Permissions) {
        self.rows
            .matching(database, branch, user, host)
            .fold((false, Permissions::empty()), |(_, acc), row| {
                (true, acc.union(row.value))
            })
    }

    /// Rejects `key` when it duplicates an existing row or when it lies
    /// inside rows that already grant admin over its whole match space.
    fn check_new_row(&self, key: &PatternKey, ignore: Option<&PatternKey>) -> Result<()> {
        if let Some(existing) = self.rows.get(key).filter(|row| Some(&row.key) != ignore) {
            return Err(Error::Conflict {
                key: existing.key.clone(),
                permissions: existing.value,
            });
        }

        let pattern = MatchSet::new(key);
        let mut covering = self.rows.covering(&pattern, ignore).peekable();
        let Some(first) = covering.peek().map(|row| row.key.clone()) else {
            return Ok(());
        };
        let combined = covering.fold(Permissions::empty(), |acc, row| acc.union(row.value));
        if combined.has(Permissions::ADMIN) {
            return Err(Error::Conflict {
                key: first,
                permissions: combined,
            });
        }
        Ok(())
    }

    fn push(&mut self, key: PatternKey, permissions: Permissions) {
        self.binlog.insert(&key, permissions);
        self.rows.push(key, permissions);
    }

    fn remove(&mut self, key: &PatternKey) -> bool {
        match self.rows.remove(key) {
            Some(row) => {
                self.binlog.delete(&row.key, row.value);
                true
            }
            None => false,
        }
    }
}

/// The branch access table: who may do what on which branches.
#[derive(Debug, Default)]
pub struct Access {
    state: RwLock<AccessState>,
}

impl Access {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, AccessState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, AccessState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, ctx: Option<&dyn AuthContext>, row: &AccessRow) -> Result<()> {
        let key = row.key()?;
        let mut state = self.write();
        state.authorize(ctx, &key, "insert")?;
        state.check_new_row(&key, None)?;
        debug!(key = %key, permissions = %row.permissions, "Inserting branch control row");
        state.push(key, row.permissions);
        Ok(())
    }

    /// Replaces `old` with `new`. A missing `old` row is not an error; `new`
    /// is inserted regardless.
    pub fn update(&self, ctx: Option<&dyn AuthContext>, old: &AccessRow, new: &AccessRow) -> Result<()> {
        let old_key = old.key()?;
        let new_key = new.key()?;
        let mut state = self.write();

        if old_key != new_key {
            if let Some(existing) = state.rows.get(&new_key) {
                return Err(Error::Conflict {
                    key: existing.key.clone(),
                    permissions: existing.value,
                });
            }
        }
        state.authorize(ctx, &old_key, "update")?;
        state.authorize(ctx, &new_key, "update")?;
        state.check_new_row(&new_key, Some(&old_key))?;

        debug!(from = %old_key, to = %new_key, permissions = %new.permissions, "Updating branch control row");
        state.remove(&old_key);
        state.push(new_key, new.permissions);
        Ok(())
    }

    /// Removes the row with the given patterns. Returns false when no such
    /// row exists.
    pub fn delete(
        &self,
        ctx: Option<&dyn AuthContext>,
        database: &str,
        branch: &str,
        user: &str,
        host: &str,
    ) -> Result<bool> {
        let key = PatternKey::fold(database, branch, user, host)?;
        let mut state = self.write();
        state.authorize(ctx, &key, "delete")?;
        let removed = state.remove(&key);
        if removed {
            debug!(key = %key, "Deleted branch control row");
        }
        Ok(removed)
    }

    /// Returns whether any row matches, and the union of the permissions of
    /// every matching row.
    pub fn match_permissions(&self, database: &str, branch: &str, user: &str, host: &str) -> (bool, Permissions) {
        self.read().match_permissions(database, branch, user, host)
    }

    /// Gives a concrete user admin rights on a concrete branch, unless some
    /// row already does. Returns true when a row was written.
    pub(crate) fn grant_admin(&self, database: &str, branch: &str, user: &str, host: &str) -> Result<bool> {
        use super::expression::escape;

        let mut state = self.write();
        let (_, existing) = state.match_permissions(database, branch, user, host);
        if existing.has(Permissions::ADMIN) {
            return Ok(false);
        }
        let key = PatternKey::fold(&escape(database), &escape(branch), &escape(user), &escape(host))?;
        let mut permissions = Permissions::ADMIN;
        if let Some(previous) = state.rows.get(&key).map(|row| row.value) {
            permissions = permissions.union(previous);
            state.remove(&key);
        }
        state.push(key, permissions);
        Ok(true)
    }

    pub fn rows(&self) -> Vec<AccessRow> {
        self.read()
            .rows
            .iter()
            .map(|row| AccessRow {
                database: row.key.database.clone(),
                branch: row.key.branch.clone(),
                user: row.key.user.clone(),
                host: row.key.host.clone(),
                permissions: row.value,
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

    pub fn snapshot(&self) -> AccessData {
        AccessData {
            rows: self.rows(),
            binlog: self.read().binlog.clone(),
        }
    }

    /// Replaces all rows and the binlog. The current state is left untouched
    /// if `data` holds an invalid or duplicate row.
    pub fn restore(&self, data: AccessData) -> Result<()> {
        let mut rows = PatternTable::default();
        for row in &data.rows {
            let key = row.key()?;
            if rows.contains(&key) {
                return Err(Error::Corrupt(format!("duplicate access row {key}")));
            }
            rows.push(key, row.permissions);
        }
        let mut state = self.write();
        state.rows = rows;
        state.binlog = data.binlog;
        Ok(())
    }
}
