use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};

use super::ControlStore;
use super::schema::SCHEMA;
use crate::error::Result;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// An in-memory database, mostly useful in tests.
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }
}

impl ControlStore for SqliteStore {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        let data = self
            .conn()
            .query_row("SELECT data FROM branch_control WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(data)
    }

    fn save(&self, data: &[u8]) -> Result<()> {
        self.conn().execute(
            "INSERT INTO branch_control (id, data, updated_at) VALUES (1, ?1, datetime('now'))
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![data],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_initialize_creates_tables() {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize().unwrap();

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"branch_control".to_string()));
    }

    #[test]
    fn test_save_overwrites_single_row() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("nested").join("control.db")).unwrap();
        store.initialize().unwrap();

        assert!(store.load().unwrap().is_none());
        store.save(b"first").unwrap();
        store.save(b"second").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some(&b"second"[..]));

        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM branch_control", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
