//! Searchable index of session metadata

mod sqlite;

pub use sqlite::{SessionIndexConfig, SqliteSessionIndex};
