use anyhow::{bail, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use telemon_storage::RestorePolicy;

/// Command-line flags. Each one can also be set through the environment
/// variable named next to it and wins over the config file.
#[derive(Debug, Default, Parser)]
#[command(name = "telemon-server", about = "Aggregates metrics pushed by telemon agents")]
pub struct ServerArgs {
    /// Optional TOML config file
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Listen address
    #[arg(short = 'a', long = "address", env = "ADDRESS")]
    pub address: Option<String>,

    /// Metric log flush interval in seconds (0 writes every record immediately)
    #[arg(short = 'i', long = "store-interval", env = "STORE_INTERVAL")]
    pub store_interval: Option<u64>,

    /// Metric log path
    #[arg(short = 'f', long = "file-storage-path", env = "FILE_STORAGE_PATH")]
    pub file_storage_path: Option<PathBuf>,

    /// Replay the metric log into the store at startup
    #[arg(
        short = 'r',
        long = "restore",
        env = "RESTORE",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub restore: Option<bool>,

    /// SQLite database path; metrics are kept in memory when unset
    #[arg(short = 'd', long = "database-path", env = "DATABASE_PATH")]
    pub database_path: Option<PathBuf>,

    /// How the metric log is written and replayed (replay or last_value)
    #[arg(long = "restore-policy", env = "RESTORE_POLICY")]
    pub restore_policy: Option<RestorePolicy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_store_interval")]
    pub store_interval_secs: u64,
    #[serde(default = "default_file_storage_path")]
    pub file_storage_path: PathBuf,
    #[serde(default)]
    pub restore: bool,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub restore_policy: RestorePolicy,
}

fn default_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_store_interval() -> u64 {
    300
}

fn default_file_storage_path() -> PathBuf {
    PathBuf::from("metrics.jsonl")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            store_interval_secs: default_store_interval(),
            file_storage_path: default_file_storage_path(),
            restore: false,
            database_path: None,
            restore_policy: RestorePolicy::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Builds the effective config: file (if any), then flags/environment.
    pub fn from_args(args: &ServerArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(args);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, args: &ServerArgs) {
        if let Some(address) = &args.address {
            self.address = address.clone();
        }
        if let Some(secs) = args.store_interval {
            self.store_interval_secs = secs;
        }
        if let Some(path) = &args.file_storage_path {
            self.file_storage_path = path.clone();
        }
        if let Some(restore) = args.restore {
            self.restore = restore;
        }
        if let Some(path) = &args.database_path {
            self.database_path = Some(path.clone());
        }
        if let Some(policy) = args.restore_policy {
            self.restore_policy = policy;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            bail!("listen address must not be empty");
        }
        if self.file_storage_path.as_os_str().is_empty() {
            bail!("file storage path must not be empty");
        }
        Ok(())
    }

    /// Zero means every record is written synchronously.
    pub fn store_interval(&self) -> Duration {
        Duration::from_secs(self.store_interval_secs)
    }
}
