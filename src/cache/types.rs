//! Cache record types

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content held by a cache record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CacheContent {
    /// The document bytes themselves
    Bytes(Bytes),
    /// A URL or embedded data reference that can be re-fetched
    Reference(String),
}

impl CacheContent {
    pub fn is_reference(&self) -> bool {
        matches!(self, CacheContent::Reference(_))
    }

    /// Size of the stored payload in bytes
    pub fn len(&self) -> usize {
        match self {
            CacheContent::Bytes(data) => data.len(),
            CacheContent::Reference(reference) => reference.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One cached document, keyed by its display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub name: String,
    pub content: CacheContent,
    /// Milliseconds since the Unix epoch of the last write
    pub last_access: i64,
}

impl CacheRecord {
    pub fn is_reference(&self) -> bool {
        self.content.is_reference()
    }
}

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// The persistent store could not be opened or used
    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A stored reference is not valid UTF-8
    #[error("Corrupt cache record {name}: {reason}")]
    CorruptRecord { name: String, reason: String },
}

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        CacheError::StorageUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
