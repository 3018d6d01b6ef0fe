//! Error types for the replay node

use std::fmt;

use thiserror::Error;

use rewind_core::StorageError;
use rewind_query::QueryError;

/// Step of a retention sweep that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPhase {
    /// Asking the index for expired sessions
    Listing,
    /// Removing event logs
    DeletingEvents,
    /// Removing session records
    DeletingRecords,
}

impl fmt::Display for SweepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SweepPhase::Listing => "listing expired sessions",
            SweepPhase::DeletingEvents => "deleting event logs",
            SweepPhase::DeletingRecords => "deleting session records",
        })
    }
}

/// Errors that can occur in the replay node
#[derive(Debug, Error)]
pub enum NodeError {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Malformed search query
    #[error("Invalid query: {0}")]
    Query(#[from] QueryError),

    /// A retention sweep stopped part way
    #[error("Retention sweep failed while {phase}: {source}")]
    Sweep {
        phase: SweepPhase,
        source: StorageError,
    },

    /// Node already started
    #[error("Node already started")]
    AlreadyStarted,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// A blocking task panicked or was cancelled
    #[error("Task failed: {0}")]
    Join(String),
}

impl NodeError {
    /// Whether the caller sent something wrong rather than the node failing
    pub fn is_client_error(&self) -> bool {
        match self {
            NodeError::Query(_) => true,
            NodeError::Storage(e) => e.is_client_error(),
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for NodeError {
    fn from(e: tokio::task::JoinError) -> Self {
        NodeError::Join(e.to_string())
    }
}

impl From<std::io::Error> for NodeError {
    fn from(e: std::io::Error) -> Self {
        NodeError::Io(e.to_string())
    }
}

/// Result type alias for node operations
pub type NodeResult<T> = Result<T, NodeError>;
