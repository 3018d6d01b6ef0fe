//! # Rewind Query
//!
//! The search language operators use to filter recorded sessions, and its
//! translation into a parameterized SQL fragment for the session index.
//!
//! ```text
//! meta.plan = 'pro' AND (browser = 'Firefox' OR os = 'Linux') -- comment
//! ```
//!
//! Translation happens in three stages:
//!
//! 1. every character is checked against a whitelist and a trailing `--`
//!    comment is dropped
//! 2. the remainder is parsed into a typed [`Filter`] AST; only known session
//!    columns and `meta.<key>` are accepted as fields
//! 3. the AST is rendered with `?` placeholders, literals moved into the
//!    parameter list in output order
//!
//! ## Example
//!
//! ```rust
//! let t = rewind_query::translate("meta.foo = 'bar' AND meta.x = 'y'").unwrap();
//! assert_eq!(
//!     t.fragment,
//!     "(meta.key = ? AND meta.value = ?) AND (meta.key = ? AND meta.value = ?)"
//! );
//! assert_eq!(t.params, ["foo", "bar", "x", "y"]);
//! ```

pub mod ast;
mod compile;
pub mod error;
mod lexer;
mod parser;

pub use ast::{Column, CompareOp, Field, Filter, Literal};
pub use compile::Translation;
pub use error::QueryError;
pub use parser::{MAX_DEPTH, parse};

use tracing::debug;

/// Translate a search expression into a SQL fragment and its parameters
///
/// # Errors
///
/// Returns a [`QueryError`] for any input outside the grammar. Never panics.
pub fn translate(input: &str) -> Result<Translation, QueryError> {
    let translation = parse(input)?.to_sql();
    debug!(
        fragment = %translation.fragment,
        params = translation.params.len(),
        "Translated search query"
    );
    Ok(translation)
}
