//! Error types for Rewind

use thiserror::Error;

use crate::session::SessionId;

/// Errors related to session identifiers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("Session id is empty")]
    Empty,

    #[error("Session id is too long: {len} bytes (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("Session id contains forbidden character {ch:?}")]
    ForbiddenChar { ch: char },
}

/// Errors raised by the event log and the session index
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error during storage operations
    #[error("I/O error: {0}")]
    Io(String),

    /// Database engine error
    #[error("Database error: {0}")]
    Database(String),

    /// Transaction could not begin or commit; a fresh attempt may succeed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Requested item was not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller supplied something malformed
    #[error("Invalid input: {0}")]
    Invalid(String),

    /// Stored data contradicts a log invariant
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Some sessions of a bulk delete could not be removed
    #[error("Failed to delete {} session(s): {}", failed.len(), describe_failures(failed))]
    PartialDelete { failed: Vec<(SessionId, String)> },

    /// A stream consumer stopped the scan
    #[error("Aborted: {0}")]
    Aborted(String),
}

fn describe_failures(failed: &[(SessionId, String)]) -> String {
    failed
        .iter()
        .map(|(id, reason)| format!("{id}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl StorageError {
    /// Create a new NotFound error
    pub fn not_found(item: impl Into<String>) -> Self {
        Self::NotFound(item.into())
    }

    /// Create a new Database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Create a new Transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction(message.into())
    }

    /// Create a new Invariant error
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant(message.into())
    }

    /// Create a new Aborted error
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::Aborted(message.into())
    }

    /// Whether the failure is the caller's to fix (validation or lookup)
    /// rather than a storage fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Invalid(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<IdError> for StorageError {
    fn from(err: IdError) -> Self {
        StorageError::Invalid(err.to_string())
    }
}
