//! Viewer traits
//!
//! Seams to the rendering engine, the flip view widget and the status UI.
//! The load orchestrator only talks to these.

use async_trait::async_trait;

use super::types::{EngineError, FlipViewOptions, PageSurface, PixelBuffer, SourceRef};

/// Parses documents into page-addressable handles
#[async_trait]
pub trait RenderingEngine: Send + Sync {
    /// Open a document from a reference or inline bytes
    async fn open(&self, source: SourceRef<'_>) -> Result<Box<dyn DocumentHandle>, EngineError>;
}

/// An opened document
#[async_trait]
pub trait DocumentHandle: Send + Sync {
    /// Number of pages
    fn page_count(&self) -> usize;

    /// Rasterize page `number` (1-based) at `scale`
    async fn render_page(&self, number: usize, scale: f32) -> Result<PixelBuffer, EngineError>;
}

/// Creates flip view instances over rendered pages
pub trait FlipViewFactory: Send + Sync {
    fn create(&self, pages: Vec<PageSurface>, options: &FlipViewOptions) -> Box<dyn FlipView>;
}

/// A live flip view
pub trait FlipView: Send {
    fn next(&mut self);

    fn prev(&mut self);

    /// Release the view's resources; called exactly once before it is dropped
    fn destroy(&mut self);
}

/// Severity of a user notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// Receives user-facing status from the orchestrator
pub trait StatusObserver: Send + Sync {
    /// Show the loading indicator
    fn loading(&self, message: &str);

    /// Hide the loading indicator after a successful load
    fn ready(&self, name: &str, page_count: usize);

    /// Replace the loading indicator with an error
    fn failed(&self, message: &str);

    /// Short-lived notice (toast)
    fn notice(&self, level: NoticeLevel, message: &str);
}

/// Observer that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl StatusObserver for LogObserver {
    fn loading(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn ready(&self, name: &str, page_count: usize) {
        tracing::info!(name = %name, pages = page_count, "Document ready");
    }

    fn failed(&self, message: &str) {
        tracing::error!("{}", message);
    }

    fn notice(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Error => tracing::warn!("{}", message),
            NoticeLevel::Success | NoticeLevel::Info => tracing::info!("{}", message),
        }
    }
}
