//! Configuration for the replay node
//!
//! Loaded from TOML; every section and field is optional.
//!
//! ```toml
//! data_dir = "./rewind-data"
//!
//! [storage]
//! events_path = "./rewind-data/events.redb"
//! index_path = "./rewind-data/sessions.db"
//!
//! [retention]
//! max_age = "14days"
//! sweep_interval = "1h"
//! compaction_interval = "5m"
//!
//! [logging]
//! default_level = "info"
//!
//! [logging.targets]
//! rewind_query = "debug"
//!
//! [logging.file]          # written to {data_dir}/logs unless `directory` is set
//! rotation = "daily"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rewind_logging::LogConfig;
use rewind_storage::ReplayStorageConfig;

use crate::error::{NodeError, NodeResult};

/// Configuration for a RewindNode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Base directory for all node data
    pub data_dir: PathBuf,
    /// Storage file locations
    pub storage: StorageSettings,
    /// Retention and maintenance schedule
    pub retention: RetentionConfig,
    /// Logging configuration
    pub logging: LogConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::with_data_dir("./rewind-data")
    }
}

impl NodeConfig {
    /// Create a configuration with a custom data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            storage: StorageSettings::default(),
            retention: RetentionConfig::default(),
            logging: LogConfig::default(),
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(input: &str) -> NodeResult<Self> {
        toml::from_str(input).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> NodeResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    /// Set the retention configuration
    pub fn with_retention(mut self, retention: RetentionConfig) -> Self {
        self.retention = retention;
        self
    }

    /// Set how long sessions are kept after their last update
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.retention.max_age = max_age;
        self
    }

    /// Set the logging configuration
    pub fn with_logging(mut self, logging: LogConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Logging configuration with file output placed under `data_dir` and
    /// kept for the retention window
    pub fn log_config(&self) -> LogConfig {
        self.logging
            .clone()
            .resolve(&self.data_dir, self.retention.max_age)
    }

    /// Resolve file locations into a storage configuration
    ///
    /// Paths left unset default to files inside `data_dir`.
    pub fn storage_config(&self) -> ReplayStorageConfig {
        let mut config = ReplayStorageConfig::with_base_dir(&self.data_dir);
        if let Some(path) = &self.storage.events_path {
            config.events.db_path = path.clone();
        }
        if let Some(path) = &self.storage.index_path {
            config.sessions.db_path = path.clone();
        }
        if let Some(cache_size) = self.storage.cache_size {
            config.events.cache_size = cache_size;
        }
        config
    }

    /// Reject settings the node cannot run with
    pub fn validate(&self) -> NodeResult<()> {
        let retention = &self.retention;
        if retention.max_age.is_zero() {
            return Err(NodeError::Config("retention.max_age must be positive".into()));
        }
        if retention.sweep_interval.is_zero() {
            return Err(NodeError::Config("retention.sweep_interval must be positive".into()));
        }
        if retention.compaction_interval.is_zero() {
            return Err(NodeError::Config(
                "retention.compaction_interval must be positive".into(),
            ));
        }
        if chrono::Duration::from_std(retention.max_age).is_err() {
            return Err(NodeError::Config("retention.max_age is out of range".into()));
        }
        Ok(())
    }
}

/// Storage file locations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Event log file, `{data_dir}/events.redb` when unset
    pub events_path: Option<PathBuf>,
    /// Session index file, `{data_dir}/sessions.db` when unset
    pub index_path: Option<PathBuf>,
    /// Event log cache size in bytes
    pub cache_size: Option<usize>,
}

/// Retention and maintenance schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Sessions not updated for this long are deleted
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
    /// Time between retention sweeps
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// Time between event log compactions
    #[serde(with = "humantime_serde")]
    pub compaction_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(14 * 24 * 60 * 60), // 14 days
            sweep_interval: Duration::from_secs(60 * 60),
            compaction_interval: rewind_storage::DEFAULT_COMPACTION_INTERVAL,
        }
    }
}
