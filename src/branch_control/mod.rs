//! Branch-level access control.
//!
//! Two pattern tables back this module. [`Access`] says what a user may do on
//! a branch; [`Namespace`] reserves branch names so only some users may
//! create them. Both keep an append-only [`Binlog`] of their changes and are
//! persisted together by the [`Controller`].

mod access;
mod binlog;
mod context;
pub mod expression;
mod namespace;
mod table;

use std::sync::Arc;

pub use access::{Access, AccessData, AccessRow};
pub use binlog::{Binlog, BinlogEntry, BinlogOperation};
pub use context::{AuthContext, Privilege, PrivilegeSet, Session, database_name_only};
pub use namespace::{Namespace, NamespaceData, NamespaceRow};
pub use table::{MatchSet, PatternKey, PatternRow, PatternTable};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::store::ControlStore;
use crate::types::Permissions;

const DATA_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct ControlData {
    version: u32,
    access: AccessData,
    namespace: NamespaceData,
}

/// Owns both branch control tables and, optionally, the store they persist to.
pub struct Controller {
    access: Arc<Access>,
    namespace: Namespace,
    store: Option<Box<dyn ControlStore>>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    /// An empty controller with no backing store.
    pub fn new() -> Self {
        let access = Arc::new(Access::new());
        let namespace = Namespace::new(Arc::clone(&access));
        Self {
            access,
            namespace,
            store: None,
        }
    }

    /// A controller holding the default row, which gives everyone write
    /// access to every branch.
    pub fn with_default_row() -> Self {
        let controller = Self::new();
        controller.insert_default_row();
        controller
    }

    fn insert_default_row(&self) {
        let default = AccessRow::new("%", "%", "%", "%", Permissions::WRITE);
        if let Err(e) = self.access.insert(None, &default) {
            tracing::error!("Failed to insert default branch control row: {e}");
        }
    }

    /// Loads state from `store` and keeps the store for later saves. An empty
    /// store yields the default row.
    pub fn load(store: Box<dyn ControlStore>) -> Result<Self> {
        let mut controller = Self::new();
        match store.load()? {
            Some(bytes) => controller.load_bytes(&bytes)?,
            None => {
                info!("No branch control data found, using the default row");
                controller.insert_default_row();
            }
        }
        controller.store = Some(store);
        info!(
            access_rows = controller.access.len(),
            namespace_rows = controller.namespace.len(),
            "Loaded branch control data"
        );
        Ok(controller)
    }

    pub fn access(&self) -> &Arc<Access> {
        &self.access
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let data = ControlData {
            version: DATA_VERSION,
            access: self.access.snapshot(),
            namespace: self.namespace.snapshot(),
        };
        Ok(serde_json::to_vec(&data)?)
    }

    /// Replaces both tables from serialized bytes. Nothing changes when the
    /// bytes cannot be decoded.
    pub fn load_bytes(&self, bytes: &[u8]) -> Result<()> {
        let data: ControlData =
            serde_json::from_slice(bytes).map_err(|e| Error::Corrupt(e.to_string()))?;
        if data.version != DATA_VERSION {
            return Err(Error::Corrupt(format!("unsupported version {}", data.version)));
        }

        let staged = Namespace::new(Arc::new(Access::new()));
        staged.restore(data.namespace.clone())?;
        self.access.restore(data.access)?;
        self.namespace.restore(data.namespace)
    }

    /// Writes both tables to the backing store, if there is one.
    pub fn save(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let bytes = self.to_bytes()?;
        store.save(&bytes)?;
        info!(bytes = bytes.len(), "Saved branch control data");
        Ok(())
    }

    /// Checks that the caller holds `flags`, or admin, on their current branch.
    pub fn check_access(&self, ctx: Option<&dyn AuthContext>, flags: Permissions) -> Result<()> {
        let Some(ctx) = ctx else {
            return Ok(());
        };
        let database = database_name_only(ctx.current_database());
        let branch = ctx.current_branch();
        let (_, perms) = self
            .access
            .match_permissions(database, branch, ctx.user(), ctx.host());
        if perms.has(flags) || perms.has(Permissions::ADMIN) {
            return Ok(());
        }
        Err(Error::IncorrectPermissions {
            user: ctx.user().to_string(),
            host: ctx.host().to_string(),
            branch: branch.to_string(),
        })
    }

    pub fn can_create_branch(&self, ctx: Option<&dyn AuthContext>, branch: &str) -> Result<()> {
        let Some(ctx) = ctx else {
            return Ok(());
        };
        let database = database_name_only(ctx.current_database());
        if self.namespace.can_create(database, branch, ctx.user(), ctx.host()) {
            return Ok(());
        }
        Err(Error::CannotCreateBranch {
            user: ctx.user().to_string(),
            host: ctx.host().to_string(),
            branch: branch.to_string(),
        })
    }

    /// Deleting a branch requires write or admin on it.
    pub fn can_delete_branch(&self, ctx: Option<&dyn AuthContext>, branch: &str) -> Result<()> {
        let Some(ctx) = ctx else {
            return Ok(());
        };
        let database = database_name_only(ctx.current_database());
        let (_, perms) = self
            .access
            .match_permissions(database, branch, ctx.user(), ctx.host());
        if perms.has(Permissions::WRITE) || perms.has(Permissions::ADMIN) {
            return Ok(());
        }
        Err(Error::CannotDeleteBranch {
            user: ctx.user().to_string(),
            host: ctx.host().to_string(),
            branch: branch.to_string(),
        })
    }

    /// Makes the caller admin of a branch they just created, then saves.
    pub fn add_admin_for_context(&self, ctx: Option<&dyn AuthContext>, branch: &str) -> Result<()> {
        let Some(ctx) = ctx else {
            return Ok(());
        };
        let database = database_name_only(ctx.current_database());
        if self
            .access
            .grant_admin(database, branch, ctx.user(), ctx.host())?
        {
            info!(user = ctx.user(), host = ctx.host(), branch, "Granted admin on new branch");
            self.save()?;
        }
        Ok(())
    }
}
