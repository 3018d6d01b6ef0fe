//! # Rewind Node
//!
//! Runs the storage side of session replay: opens the event log and session
//! index, answers searches, and keeps the two stores inside the retention
//! window.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 RewindNode                   │
//! │  ┌─────────────┐        ┌──────────────────┐ │
//! │  │  EventLog   │        │ SqliteSessionIdx │ │
//! │  │   (redb)    │        │    (SQLite)      │ │
//! │  └──────▲──────┘        └────────▲─────────┘ │
//! │         │   RetentionSweeper     │           │
//! │         └──────────┴─────────────┘           │
//! │  Compactor ──► EventLog                      │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use rewind_node::{NodeConfig, RewindNode};
//!
//! let node = RewindNode::new(NodeConfig::with_data_dir("./rewind-data")).await?;
//! node.start().await?;
//!
//! let pro = node.search("meta.plan = 'pro'", 0, 50).await?;
//!
//! node.stop().await?;
//! ```

pub mod config;
pub mod error;
pub mod sweeper;

pub use config::{NodeConfig, RetentionConfig, StorageSettings};
pub use error::{NodeError, NodeResult, SweepPhase};
pub use sweeper::{RetentionSweeper, SweepReport};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use rewind_core::{Clock, SessionId, SessionIndex, SessionRecord, SystemClock};
use rewind_storage::{Compactor, EventLog, ReplayStorage, SqliteSessionIndex};

/// Session replay storage node
pub struct RewindNode {
    /// Node configuration
    config: NodeConfig,
    /// Event log and session index
    storage: Arc<ReplayStorage>,
    /// Time source for retention and `updated_at`
    clock: Arc<dyn Clock>,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
    /// Background task handles
    background_tasks: RwLock<Vec<JoinHandle<()>>>,
    /// Whether the node has been started
    started: AtomicBool,
}

impl RewindNode {
    /// Create a new node
    ///
    /// Opens both stores. Call [`start`](Self::start) to begin background
    /// retention and compaction.
    #[instrument(skip(config), fields(data_dir = %config.data_dir.display()))]
    pub async fn new(config: NodeConfig) -> NodeResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// Create a node on an explicit clock
    pub async fn with_clock(config: NodeConfig, clock: Arc<dyn Clock>) -> NodeResult<Self> {
        config.validate()?;
        tokio::fs::create_dir_all(&config.data_dir).await?;

        let storage_config = config.storage_config();
        let storage_clock = Arc::clone(&clock);
        let storage = tokio::task::spawn_blocking(move || {
            ReplayStorage::open_with_clock(storage_config, Some(storage_clock))
        })
        .await??;

        let (shutdown_tx, _) = broadcast::channel(1);

        info!("Node created");

        Ok(Self {
            config,
            storage: Arc::new(storage),
            clock,
            shutdown_tx,
            background_tasks: RwLock::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Start the retention sweeper and the compactor
    #[instrument(skip(self))]
    pub async fn start(&self) -> NodeResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(NodeError::AlreadyStarted);
        }

        let retention = &self.config.retention;
        let sweeper = self.sweeper()?;
        let sweep_task = sweeper.spawn(retention.sweep_interval, self.shutdown_tx.subscribe());
        let compaction_task = Compactor::spawn(
            Arc::clone(self.storage.events()),
            retention.compaction_interval,
            self.shutdown_tx.subscribe(),
        );

        {
            let mut tasks = self.background_tasks.write().await;
            tasks.push(sweep_task);
            tasks.push(compaction_task);
        }

        info!("Node started");
        Ok(())
    }

    /// Stop background tasks, letting in-flight work finish
    #[instrument(skip(self))]
    pub async fn stop(&self) -> NodeResult<()> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(()); // Already stopped
        }

        // Signal shutdown
        let _ = self.shutdown_tx.send(());

        // Wait for background tasks
        let mut tasks = self.background_tasks.write().await;
        for task in tasks.drain(..) {
            task.await?;
        }

        info!("Node stopped");
        Ok(())
    }

    /// Check if the node is started
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Get the configuration
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Get the combined storage
    pub fn storage(&self) -> &Arc<ReplayStorage> {
        &self.storage
    }

    /// Get the event log
    pub fn events(&self) -> &Arc<EventLog> {
        self.storage.events()
    }

    /// Get the session index
    pub fn sessions(&self) -> &Arc<SqliteSessionIndex> {
        self.storage.sessions()
    }

    /// Build a sweeper over this node's stores
    pub fn sweeper(&self) -> NodeResult<RetentionSweeper> {
        RetentionSweeper::new(
            self.storage.events().clone(),
            self.storage.sessions().clone(),
            Arc::clone(&self.clock),
            self.config.retention.max_age,
        )
    }

    /// Run one retention cycle now, outside the schedule
    pub async fn sweep_now(&self) -> NodeResult<SweepReport> {
        self.sweeper()?.run_cycle().await
    }

    /// Find sessions matching a search expression, newest first
    ///
    /// An empty (or whitespace-only) query lists every session.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Query`] for malformed queries before touching
    /// storage.
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        query: &str,
        offset: usize,
        limit: usize,
    ) -> NodeResult<Vec<SessionRecord>> {
        let translation = if query.trim().is_empty() {
            rewind_query::Translation::default()
        } else {
            rewind_query::translate(query)?
        };

        let sessions = Arc::clone(self.storage.sessions());
        let found = tokio::task::spawn_blocking(move || {
            sessions.list(&translation.fragment, &translation.params, offset, limit)
        })
        .await??;

        debug!(found = found.len(), "Search complete");
        Ok(found)
    }

    /// Record a batch of events, refreshing the session record
    ///
    /// Returns the last sequence written.
    pub async fn record(&self, record: SessionRecord, payloads: Vec<Bytes>) -> NodeResult<u64> {
        let storage = Arc::clone(&self.storage);
        let last =
            tokio::task::spawn_blocking(move || storage.ingest(&record, &payloads)).await??;
        Ok(last)
    }

    /// Render a session's events as one JSON array
    pub async fn replay_json(&self, session: SessionId) -> NodeResult<Vec<u8>> {
        let events = Arc::clone(self.storage.events());
        let json =
            tokio::task::spawn_blocking(move || events.write_json_array(&session, Vec::new()))
                .await??;
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_node() -> (RewindNode, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let node = RewindNode::new(NodeConfig::with_data_dir(temp_dir.path()))
            .await
            .unwrap();
        (node, temp_dir)
    }

    #[tokio::test]
    async fn test_node_creation() {
        let (node, temp) = create_node().await;
        assert!(!node.is_started());
        assert!(temp.path().join("events.redb").exists());
        assert!(temp.path().join("sessions.db").exists());
    }

    #[tokio::test]
    async fn test_start_stop() {
        let (node, _temp) = create_node().await;

        node.start().await.unwrap();
        assert!(node.is_started());
        assert!(matches!(node.start().await, Err(NodeError::AlreadyStarted)));

        node.stop().await.unwrap();
        assert!(!node.is_started());

        // Stopping twice is fine
        node.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config =
            NodeConfig::with_data_dir(temp_dir.path()).with_max_age(std::time::Duration::ZERO);
        assert!(matches!(
            RewindNode::new(config).await,
            Err(NodeError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_query_is_client_error() {
        let (node, _temp) = create_node().await;
        let err = node.search("meta.x = 'y'; DROP", 0, 10).await.unwrap_err();
        assert!(matches!(err, NodeError::Query(_)));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_record_search_and_replay() {
        let (node, _temp) = create_node().await;
        let id = SessionId::new("s1").unwrap();
        let record = SessionRecord::new(id.clone()).with_meta("plan", "pro");

        node.record(record.clone(), vec![Bytes::from_static(b"{\"n\":1}")])
            .await
            .unwrap();
        let last = node
            .record(record, vec![Bytes::from_static(b"{\"n\":2}")])
            .await
            .unwrap();
        assert_eq!(last, 2);

        let found = node.search("meta.plan = 'pro'", 0, 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(node.search("", 0, 10).await.unwrap().len(), 1);

        let json = node.replay_json(id).await.unwrap();
        assert_eq!(json, b"[{\"n\":1},\n{\"n\":2}]");
    }
}
