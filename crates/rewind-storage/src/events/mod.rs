//! Per-session append-only event log
//!
//! - [`EventLog`]: redb store implementing [`EventStore`](rewind_core::EventStore)
//! - [`JsonArrayWriter`]: frames a stream as one JSON array
//! - [`Compactor`]: background space reclamation

mod allocator;
mod compaction;
mod event_log;
mod json;
pub mod keys;

pub use compaction::{Compactor, DEFAULT_COMPACTION_INTERVAL};
pub use event_log::{EVENTS, EventLog, EventLogConfig};
pub use json::JsonArrayWriter;
