//! Background retention sweep
//!
//! Each cycle deletes every session whose record was last updated at or
//! before `now - max_age`:
//!
//! ```text
//! cutoff  = now - max_age
//! expired = index.expired(cutoff)
//! events.delete(expired)     failure ends the cycle here
//! index.delete(expired)
//! ```
//!
//! Event data goes first so a crash between the two deletes leaves at worst
//! a record with no events, which the next cycle removes because its
//! `updated_at` has not moved.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument};

use rewind_core::{Clock, EventStore, SessionIndex};

use crate::error::{NodeError, NodeResult, SweepPhase};

/// Outcome of one sweep cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions updated at or before this instant were expired
    pub cutoff: DateTime<Utc>,
    /// Number of expired sessions found
    pub expired: usize,
    /// Number of sessions removed from both stores
    pub removed: usize,
}

/// Deletes sessions older than the retention window
pub struct RetentionSweeper {
    events: Arc<dyn EventStore>,
    index: Arc<dyn SessionIndex>,
    clock: Arc<dyn Clock>,
    max_age: chrono::Duration,
}

impl RetentionSweeper {
    /// Create a sweeper over the given stores
    pub fn new(
        events: Arc<dyn EventStore>,
        index: Arc<dyn SessionIndex>,
        clock: Arc<dyn Clock>,
        max_age: Duration,
    ) -> NodeResult<Self> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| NodeError::Config(format!("retention.max_age: {e}")))?;
        Ok(Self {
            events,
            index,
            clock,
            max_age,
        })
    }

    /// Run one sweep cycle
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Sweep`] naming the phase that failed. When event
    /// deletion fails the index is left untouched.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> NodeResult<SweepReport> {
        let now = self.clock.now_utc();
        let cutoff = now
            .checked_sub_signed(self.max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let index = Arc::clone(&self.index);
        let expired = tokio::task::spawn_blocking(move || index.expired(cutoff))
            .await?
            .map_err(|source| NodeError::Sweep {
                phase: SweepPhase::Listing,
                source,
            })?;

        if expired.is_empty() {
            debug!(%cutoff, "No expired sessions");
            return Ok(SweepReport {
                cutoff,
                expired: 0,
                removed: 0,
            });
        }
        let count = expired.len();
        let expired = Arc::new(expired);

        let events = Arc::clone(&self.events);
        let ids = Arc::clone(&expired);
        tokio::task::spawn_blocking(move || events.delete(&ids))
            .await?
            .map_err(|source| NodeError::Sweep {
                phase: SweepPhase::DeletingEvents,
                source,
            })?;

        let index = Arc::clone(&self.index);
        let ids = Arc::clone(&expired);
        tokio::task::spawn_blocking(move || index.delete(&ids))
            .await?
            .map_err(|source| NodeError::Sweep {
                phase: SweepPhase::DeletingRecords,
                source,
            })?;

        info!(%cutoff, removed = count, "Removed expired sessions");
        Ok(SweepReport {
            cutoff,
            expired: count,
            removed: count,
        })
    }

    /// Spawn the sweep loop
    ///
    /// The first cycle runs immediately, then one every `interval`. A cycle in
    /// flight finishes before the task observes shutdown.
    pub fn spawn(
        self,
        interval: Duration,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(interval, shutdown_rx).await;
        })
    }

    async fn run(self, interval: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = interval.as_secs(),
            max_age_secs = self.max_age.num_seconds(),
            "Retention sweeper started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Retention sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!(error = %e, "Retention sweep failed, retrying next cycle");
                    }
                }
            }
        }
    }
}
