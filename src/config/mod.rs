mod server;

pub use server::ServerConfig;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlBackend {
    #[default]
    File,
    Sqlite,
}

impl std::str::FromStr for ControlBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(ControlBackend::File),
            "sqlite" => Ok(ControlBackend::Sqlite),
            other => Err(Error::Config(format!("unknown control backend: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub backend: ControlBackend,
    pub path: PathBuf,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            backend: ControlBackend::File,
            path: PathBuf::from("./data/branch_control.json"),
        }
    }
}

/// Top-level settings, read from an optional TOML file. Every field has a
/// default, so an empty file is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Git repository backing the versioned store.
    pub repo: PathBuf,
    /// Name the tables are served under. Defaults to the repository's
    /// directory name.
    pub database: Option<String>,
    pub server: ServerConfig,
    pub control: ControlConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo: PathBuf::from("./repo"),
            database: None,
            server: ServerConfig::default(),
            control: ControlConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn database_name(&self) -> String {
        if let Some(name) = &self.database {
            return name.clone();
        }
        let repo = self.repo.canonicalize().unwrap_or_else(|_| self.repo.clone());
        repo.file_name()
            .map_or_else(|| "systables".to_string(), |n| n.to_string_lossy().into_owned())
    }

    /// Loads `path` if given, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }
}
