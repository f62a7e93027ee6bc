//! Transient handles over in-memory documents
//!
//! A [`TransientHandle`] gives the rendering engine a `blob:` URL for bytes
//! that only live in memory, so large documents are never copied into a text
//! encoding. Handles are released exactly once: explicitly through
//! [`ResourceTracker::release`] or implicitly when dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use uuid::Uuid;

/// URL scheme prefix of transient handles
pub const TRANSIENT_SCHEME: &str = "blob:";

/// Registry of live transient handles
#[derive(Clone, Default)]
pub struct ResourceTracker {
    live: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `data` and return the handle that owns it
    pub fn acquire(&self, data: Bytes) -> TransientHandle {
        let url = format!("{}flipbook/{}", TRANSIENT_SCHEME, Uuid::new_v4());
        let size = data.len();
        self.live.lock().insert(url.clone(), data);

        tracing::debug!(url = %url, size = size, "Transient handle acquired");

        TransientHandle {
            url,
            size,
            registry: Arc::clone(&self.live),
            released: false,
        }
    }

    /// Release a handle; returns false if it was already gone
    pub fn release(&self, mut handle: TransientHandle) -> bool {
        handle.release()
    }

    /// Release a handle by URL. External references are never touched.
    pub fn release_reference(&self, reference: &str) -> bool {
        if !is_transient(reference) {
            return false;
        }
        let removed = self.live.lock().remove(reference).is_some();
        if removed {
            tracing::debug!(url = %reference, "Transient handle released by reference");
        }
        removed
    }

    /// Bytes behind a live transient URL
    pub fn resolve(&self, url: &str) -> Option<Bytes> {
        self.live.lock().get(url).cloned()
    }

    /// Number of live transient handles
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}

/// Whether `reference` points at a transient handle rather than external bytes
pub fn is_transient(reference: &str) -> bool {
    reference.starts_with(TRANSIENT_SCHEME)
}

/// Owned transient reference; released on drop
pub struct TransientHandle {
    url: String,
    size: usize,
    registry: Arc<Mutex<HashMap<String, Bytes>>>,
    released: bool,
}

impl TransientHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Bytes behind this handle, if it is still live
    pub fn data(&self) -> Option<Bytes> {
        self.registry.lock().get(&self.url).cloned()
    }

    fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        let removed = self.registry.lock().remove(&self.url).is_some();
        if removed {
            tracing::debug!(url = %self.url, "Transient handle released");
        }
        removed
    }
}

impl Drop for TransientHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for TransientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransientHandle")
            .field("url", &self.url)
            .field("size", &self.size)
            .field("released", &self.released)
            .finish()
    }
}
