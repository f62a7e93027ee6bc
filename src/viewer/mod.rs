//! Rendering engine and flip view abstraction
//!
//! The engine parses a document and rasterizes pages; the flip view lays the
//! pages out as a book. Both live outside this crate and are reached through
//! the traits re-exported here.

mod traits;
mod types;

pub use traits::{
    DocumentHandle, FlipView, FlipViewFactory, LogObserver, NoticeLevel, RenderingEngine,
    StatusObserver,
};
pub use types::{EngineError, FlipViewOptions, PageSurface, PixelBuffer, SizeMode, SourceRef};
