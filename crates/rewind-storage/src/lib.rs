//! # Rewind Storage
//!
//! Persistence for recorded browser sessions.
//!
//! ## Features
//!
//! - **EventLog**: append-only per-session log on redb with contiguous
//!   sequence numbers, streaming reads and bulk deletes
//! - **JsonArrayWriter**: serves a session as one JSON array without
//!   buffering it
//! - **Compactor**: background task reclaiming space after deletes
//! - **SqliteSessionIndex**: searchable session metadata on SQLite
//! - **ReplayStorage**: both stores opened under one directory
//!
//! All stores are synchronous; call them from async code through
//! `tokio::task::spawn_blocking`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use rewind_core::{EventStore, SessionId};
//! use rewind_storage::{EventLog, EventLogConfig};
//!
//! # fn main() -> Result<(), rewind_core::StorageError> {
//! let log = EventLog::open(EventLogConfig::default())?;
//! let id = SessionId::new("01HZX3J6Q8W1V6T4K2M9N0P7RS")?;
//!
//! log.append(&id, &[Bytes::from_static(b"{\"type\":4}")])?;
//! let json = log.write_json_array(&id, Vec::new())?;
//! assert_eq!(json, b"[{\"type\":4}]");
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod sessions;
pub mod storage;

// Re-exports
pub use events::{
    Compactor, DEFAULT_COMPACTION_INTERVAL, EventLog, EventLogConfig, JsonArrayWriter,
};
pub use sessions::{SessionIndexConfig, SqliteSessionIndex};
pub use storage::{ReplayStorage, ReplayStorageConfig};

pub use rewind_core::{EventStore, SessionIndex, StorageError};
