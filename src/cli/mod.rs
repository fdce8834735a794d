mod commands;
mod control;
pub mod http_client;
mod namespace;
mod pickers;
mod query;

pub use commands::{ControlCommands, NamespaceCommands, PatternArgs};
pub use control::run_control;
pub use namespace::run_namespace;
pub use query::{run_query, run_tables};

use std::sync::Arc;

use crate::branch_control::{BinlogEntry, Controller};
use crate::config::Config;
use crate::store;
use crate::tables::Database;
use crate::versioned::GitStore;

/// Loads the branch control tables from the configured backend.
pub fn open_controller(config: &Config) -> anyhow::Result<Controller> {
    let store = store::open(config.control.backend, &config.control.path)?;
    Ok(Controller::load(store)?)
}

/// Opens the configured repository together with its branch control tables.
pub fn open_database(config: &Config) -> anyhow::Result<Database> {
    let repo = GitStore::open(&config.repo).map_err(|e| {
        anyhow::anyhow!(
            "Failed to open repository at {}: {e}",
            config.repo.display()
        )
    })?;
    let controller = open_controller(config)?;
    Ok(Database::new(
        &config.database_name(),
        Arc::new(repo),
        Arc::new(controller),
    ))
}

fn print_binlog(entries: &[BinlogEntry], with_permissions: bool, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("Binlog is empty");
        return Ok(());
    }
    for (index, entry) in entries.iter().enumerate() {
        let mut line = format!(
            "{index:>4}  {:<6}  {}  {}  {}  {}",
            entry.operation.as_str(),
            entry.database,
            entry.branch,
            entry.user,
            entry.host
        );
        if with_permissions {
            line.push_str(&format!("  [{}]", entry.permissions));
        }
        println!("{line}");
    }
    Ok(())
}
