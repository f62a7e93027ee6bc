//! Library server state

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared state of the library server
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    library_dir: PathBuf,
}

impl AppState {
    /// Create state serving and storing documents in `library_dir`
    pub fn new(library_dir: PathBuf) -> Self {
        Self {
            inner: Arc::new(AppStateInner { library_dir }),
        }
    }

    /// Directory holding the hosted documents
    pub fn library_dir(&self) -> &Path {
        &self.inner.library_dir
    }
}
