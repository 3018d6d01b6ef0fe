//! Session identity and metadata
//!
//! A session is one browser visit's recording context. Its [`SessionId`] keys
//! both the event log and the session index, and its [`SessionRecord`] holds
//! the metadata the operator searches on.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IdError;

/// Opaque, globally unique session identifier
///
/// Identifiers are produced by an external monotonic generator (ULIDs in
/// practice), so lexicographic order follows creation order. The event log
/// uses `/` as its key separator, which is why it is rejected here.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Longest identifier accepted, in bytes
    pub const MAX_LEN: usize = 128;

    /// Validate and wrap an identifier
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdError::Empty);
        }
        if id.len() > Self::MAX_LEN {
            return Err(IdError::TooLong {
                len: id.len(),
                max: Self::MAX_LEN,
            });
        }
        if let Some(ch) = id.chars().find(|c| *c == '/' || c.is_ascii_control()) {
            return Err(IdError::ForbiddenChar { ch });
        }
        Ok(Self(id))
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the identifier as bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Operating system reported by the user agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Os {
    pub name: String,
    pub version: String,
}

/// Browser reported by the user agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Browser {
    pub name: String,
    pub version: String,
}

/// Details about the recorded user, blank when recording anonymously
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// Metadata for one recorded session
///
/// The session index owns this record and refreshes `updated_at` on every
/// write; the value supplied by callers on upsert is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: SessionId,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub os: Os,
    #[serde(default)]
    pub browser: Browser,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub user: User,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a record with only the identifier set
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            client_id: String::new(),
            user_agent: String::new(),
            os: Os::default(),
            browser: Browser::default(),
            device: String::new(),
            user: User::default(),
            meta: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Set the client identifier
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Set the raw user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the user details
    pub fn with_user(mut self, user: User) -> Self {
        self.user = user;
        self
    }

    /// Add a metadata entry
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}
