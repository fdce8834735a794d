//! # systables
//!
//! System tables over a versioned database: branch-level access control with
//! SQL `LIKE` style patterns, append-only binlogs of every control change,
//! and read-only views of commit history (log, branches, table and row
//! diffs). Usable both as a standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! systables = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use systables::branch_control::Controller;
//! use systables::tables::{Database, scan};
//! use systables::versioned::GitStore;
//!
//! let store = Arc::new(GitStore::open("./repo")?);
//! let database = Database::new("mydb", store, Arc::new(Controller::with_default_row()));
//! let log = database.require_table("dolt_log")?;
//! for row in scan(log.as_ref(), &[])? {
//!     println!("{row:?}");
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes the CLI module. Disable with `default-features = false`.

pub mod branch_control;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod tables;
pub mod types;
pub mod versioned;
