//! Store traits and the clock abstraction
//!
//! The retention sweeper and the (external) HTTP layer only ever talk to the
//! stores through these traits, so either side can be swapped for a fake in
//! tests.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::StorageError;
use crate::session::{SessionId, SessionRecord};

/// Callback invoked once per event by [`EventStore::stream`]
///
/// Arguments are the payload, its zero-based position in the stream, and the
/// total number of events, which is fixed for the whole scan.
pub type Visit<'a> = &'a mut dyn FnMut(&[u8], u64, u64) -> Result<(), StorageError>;

/// Append-only per-session event log
///
/// Implementations must keep every session's sequence numbers contiguous
/// under concurrent writers.
pub trait EventStore: Send + Sync {
    /// Append payloads to a session's log, in order, atomically
    ///
    /// Creates the log on first use. Returns the sequence number of the last
    /// payload written.
    fn append(&self, session: &SessionId, payloads: &[Bytes]) -> Result<u64, StorageError>;

    /// Visit every event of a session in sequence order
    ///
    /// An error returned by `visit` stops the scan and is returned unchanged.
    fn stream(&self, session: &SessionId, visit: Visit<'_>) -> Result<(), StorageError>;

    /// Remove every entry of the given sessions
    ///
    /// All sessions are attempted even if some fail; failures are reported
    /// together afterwards. Unknown sessions are not an error.
    fn delete(&self, sessions: &[SessionId]) -> Result<(), StorageError>;
}

/// Relational index of session metadata
pub trait SessionIndex: Send + Sync {
    /// Fetch one session record
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] for an unknown identifier.
    fn get(&self, id: &SessionId) -> Result<SessionRecord, StorageError>;

    /// List sessions, newest first
    ///
    /// `filter` is a placeholder-bearing fragment produced by the query
    /// translator and `params` its bound values; an empty filter lists all.
    fn list(
        &self,
        filter: &str,
        params: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<SessionRecord>, StorageError>;

    /// Insert or update a record keyed by its id, refreshing `updated_at`
    fn upsert(&self, record: &SessionRecord) -> Result<(), StorageError>;

    /// Remove the given sessions; unknown ids are ignored
    fn delete(&self, ids: &[SessionId]) -> Result<(), StorageError>;

    /// Identifiers of every session last updated at or before `cutoff`
    fn expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<SessionId>, StorageError>;
}

/// Time source for components that compare against "now"
pub trait Clock: Send + Sync {
    /// Get the current UTC datetime
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Real clock implementation using system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    /// Move forward by `by`
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
