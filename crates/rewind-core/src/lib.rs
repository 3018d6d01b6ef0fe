//! # Rewind Core
//!
//! Core types, store traits, and errors shared by the Rewind crates.
//!
//! Rewind records browser session-replay event streams. Two independent
//! stores back it:
//!
//! - an append-only per-session event log ([`EventStore`])
//! - a relational index of session metadata ([`SessionIndex`])
//!
//! ## Key Types
//!
//! - [`SessionId`]: Opaque, lexicographically sortable session identifier
//! - [`SessionRecord`]: Metadata recorded for one browser session
//! - [`Clock`]: Time abstraction so retention can be tested deterministically

pub mod error;
pub mod session;
pub mod traits;

pub use error::*;
pub use session::*;
pub use traits::*;
