//! Combined replay storage
//!
//! [`ReplayStorage`] opens the event log and the session index side by side
//! under one base directory:
//!
//! ```text
//! {base_dir}/events.redb    event log (redb)
//! {base_dir}/sessions.db    session index (SQLite)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, instrument};

use rewind_core::{Clock, EventStore, SessionIndex, SessionRecord, StorageError};

use crate::events::{EventLog, EventLogConfig};
use crate::sessions::{SessionIndexConfig, SqliteSessionIndex};

/// Configuration for [`ReplayStorage`]
#[derive(Debug, Clone)]
pub struct ReplayStorageConfig {
    /// Base directory for all storage
    pub base_dir: PathBuf,
    /// Event log configuration
    pub events: EventLogConfig,
    /// Session index configuration
    pub sessions: SessionIndexConfig,
}

impl Default for ReplayStorageConfig {
    fn default() -> Self {
        Self::with_base_dir("./data")
    }
}

impl ReplayStorageConfig {
    /// Create a configuration with a custom base directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            events: EventLogConfig {
                db_path: base_dir.join("events.redb"),
                ..Default::default()
            },
            sessions: SessionIndexConfig {
                db_path: base_dir.join("sessions.db"),
                ..Default::default()
            },
            base_dir,
        }
    }
}

/// Event log and session index opened together
pub struct ReplayStorage {
    events: Arc<EventLog>,
    sessions: Arc<SqliteSessionIndex>,
    config: ReplayStorageConfig,
}

impl ReplayStorage {
    /// Open both stores
    #[instrument(skip(config), fields(base_dir = %config.base_dir.display()))]
    pub fn open(config: ReplayStorageConfig) -> Result<Self, StorageError> {
        Self::open_with_clock(config, None)
    }

    /// Open both stores, stamping session updates with `clock`
    pub fn open_with_clock(
        config: ReplayStorageConfig,
        clock: Option<Arc<dyn Clock>>,
    ) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&config.base_dir)?;

        let events = EventLog::open(config.events.clone())?;
        let mut sessions = SqliteSessionIndex::open(&config.sessions)?;
        if let Some(clock) = clock {
            sessions = sessions.with_clock(clock);
        }

        info!("Opened replay storage");
        Ok(Self {
            events: Arc::new(events),
            sessions: Arc::new(sessions),
            config,
        })
    }

    /// Get the event log
    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    /// Get the session index
    pub fn sessions(&self) -> &Arc<SqliteSessionIndex> {
        &self.sessions
    }

    /// Get the configuration
    pub fn config(&self) -> &ReplayStorageConfig {
        &self.config
    }

    /// Record a batch of events for a session
    ///
    /// Refreshes the session record first so a batch is never stored for a
    /// session the index does not know. Returns the last sequence written.
    #[instrument(skip(self, record, payloads), fields(session = %record.id, count = payloads.len()))]
    pub fn ingest(&self, record: &SessionRecord, payloads: &[Bytes]) -> Result<u64, StorageError> {
        self.sessions.upsert(record)?;
        let last = self.events.append(&record.id, payloads)?;
        debug!(last, "Ingested batch");
        Ok(last)
    }
}
