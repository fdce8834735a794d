//! Persistence for the branch control tables.
//!
//! Stores treat the controller's serialized state as an opaque blob.

mod file;
mod schema;
mod sqlite;

pub use file::FileStore;
pub use sqlite::SqliteStore;

use std::path::Path;

use crate::config::ControlBackend;
use crate::error::Result;

/// ControlStore defines where branch control state is kept between runs.
pub trait ControlStore: Send + Sync {
    /// Returns the last saved blob, or `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<Vec<u8>>>;

    /// Replaces the saved blob.
    fn save(&self, data: &[u8]) -> Result<()>;
}

/// Opens the store selected by configuration.
pub fn open(backend: ControlBackend, path: &Path) -> Result<Box<dyn ControlStore>> {
    match backend {
        ControlBackend::File => Ok(Box::new(FileStore::new(path))),
        ControlBackend::Sqlite => {
            let store = SqliteStore::new(path)?;
            store.initialize()?;
            Ok(Box::new(store))
        }
    }
}
