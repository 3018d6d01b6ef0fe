//! Background compaction of the event log
//!
//! Periodically reclaims the space freed by retention deletes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::event_log::EventLog;

/// Default time between compaction attempts
pub const DEFAULT_COMPACTION_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Background task that compacts an [`EventLog`] on a fixed interval
pub struct Compactor;

impl Compactor {
    /// Spawn the compaction task
    pub fn spawn(
        log: Arc<EventLog>,
        interval: Duration,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            Self::run(log, interval, shutdown_rx).await;
        })
    }

    async fn run(log: Arc<EventLog>, interval: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; nothing to reclaim at startup
        ticker.tick().await;

        info!(interval_secs = interval.as_secs(), "Compactor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    Self::compact_once(&log).await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Compactor shutting down");
                    break;
                }
            }
        }
    }

    /// Run one compaction on the blocking pool
    pub async fn compact_once(log: &Arc<EventLog>) -> bool {
        let log = Arc::clone(log);
        match tokio::task::spawn_blocking(move || log.compact()).await {
            Ok(Ok(compacted)) => {
                debug!(compacted, "Compaction pass complete");
                compacted
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Compaction failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "Compaction task panicked");
                false
            }
        }
    }
}
