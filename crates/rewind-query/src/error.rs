//! Error types for rewind-query

use thiserror::Error;

/// Reasons a search expression is rejected
///
/// Every variant is a validation error: the input never reaches storage.
/// Offsets are byte offsets into the original input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Invalid character {ch:?} at offset {offset}")]
    InvalidCharacter { ch: char, offset: usize },

    #[error("Query is empty")]
    Empty,

    #[error("Unterminated literal starting at offset {offset}")]
    UnterminatedLiteral { offset: usize },

    #[error("Unexpected {found} at offset {offset}, expected {expected}")]
    UnexpectedToken {
        found: String,
        offset: usize,
        expected: &'static str,
    },

    #[error("Unexpected end of query, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("Unknown field {field:?} at offset {offset}")]
    UnknownField { field: String, offset: usize },

    /// `NOT` over a `meta.<key>` comparison; meta rows are matched one at a
    /// time, so the negation cannot exclude a session
    #[error("NOT at offset {offset} cannot apply to meta fields")]
    NegatedMeta { offset: usize },

    #[error("Query nests deeper than {max} levels")]
    TooDeep { max: usize },
}
