//! Viewer types shared by the engine and flip view seams

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the rendering engine is asked to open
#[derive(Debug, Clone, Copy)]
pub enum SourceRef<'a> {
    /// A URL or transient handle the engine reads by itself
    Reference(&'a str),
    /// Document bytes held by the caller
    Inline(&'a [u8]),
}

/// Rasterized page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    /// RGBA, row-major
    pub data: Vec<u8>,
}

/// One page ready for the flip view, 1-based
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSurface {
    pub number: usize,
    pub pixels: PixelBuffer,
}

/// How the flip view sizes its pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeMode {
    Fixed,
    Stretch,
}

/// Flip view layout options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlipViewOptions {
    pub width: u32,
    pub height: u32,
    pub size: SizeMode,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub max_shadow_opacity: f32,
    pub show_cover: bool,
    pub mobile_scroll_support: bool,
}

impl Default for FlipViewOptions {
    fn default() -> Self {
        Self {
            width: 550,
            height: 733,
            size: SizeMode::Stretch,
            min_width: 315,
            max_width: 1000,
            min_height: 420,
            max_height: 1350,
            max_shadow_opacity: 0.0,
            show_cover: true,
            mobile_scroll_support: false,
        }
    }
}

/// Rendering engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Content is not a readable document
    #[error("{0}")]
    Parse(String),

    /// A page could not be rasterized
    #[error("Failed to render page {page}: {message}")]
    Render { page: usize, message: String },
}
