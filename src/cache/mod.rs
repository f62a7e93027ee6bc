//! Local document cache
//!
//! Persists the most recently saved documents (raw bytes or a reference)
//! in SQLite, keyed by display name and capped by recency.

mod schema;
mod store;
mod types;

pub use store::DocumentCache;
pub use types::{CacheContent, CacheError, CacheRecord, Result};
