//! Load error types

use thiserror::Error;

use crate::library::LibraryError;
use crate::viewer::EngineError;

/// Why a document could not be shown
#[derive(Debug, Error)]
pub enum LoadError {
    /// Content is not a readable document; the engine's message is kept verbatim
    #[error("{0}")]
    Parse(String),

    /// A page failed to rasterize
    #[error("{0}")]
    Render(String),

    /// The engine did not answer in time
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Upload to the library server failed
    #[error(transparent)]
    Library(#[from] LibraryError),

    /// A local file that is not a PDF
    #[error("Please select a valid PDF file.")]
    InvalidFile(String),

    /// Remote open requested without a URL
    #[error("Please enter a URL.")]
    EmptyUrl,

    /// `?pdf=` content that is not valid base64
    #[error("Invalid embedded document: {0}")]
    InvalidEmbedded(String),
}

impl From<EngineError> for LoadError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Parse(message) => LoadError::Parse(message),
            render @ EngineError::Render { .. } => LoadError::Render(render.to_string()),
        }
    }
}

/// Result type alias for load operations
pub type Result<T> = std::result::Result<T, LoadError>;
