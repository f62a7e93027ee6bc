//! Library types shared by the client and the server routes

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Multipart field carrying the uploaded document
pub const UPLOAD_FIELD: &str = "pdfFile";

/// A document hosted by the library server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    pub url: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Body returned by `POST /upload`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResponse {
    pub fn stored(filename: String, url: String) -> Self {
        Self {
            success: true,
            filename: Some(filename),
            url: Some(url),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            filename: None,
            url: None,
            error: Some(error.into()),
        }
    }
}

/// Where an upload landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    pub filename: String,
    /// Absolute URL of the stored document
    pub url: String,
}

/// Library client errors
#[derive(Debug, Error)]
pub enum LibraryError {
    /// The server could not be reached at all
    #[error("Library server offline: {0}")]
    ServerUnavailable(String),

    /// The server answered but refused the upload
    #[error("Upload rejected: {0}")]
    UploadRejected(String),
}

impl LibraryError {
    /// Message shown to the user
    pub fn user_message(&self) -> &'static str {
        match self {
            LibraryError::ServerUnavailable(_) => "Error loading library. Server offline?",
            LibraryError::UploadRejected(_) => "Could not upload PDF. Please try again.",
        }
    }

    /// Message shown when an upload fails
    pub fn upload_message(&self) -> &'static str {
        match self {
            LibraryError::ServerUnavailable(_) => "Could not upload PDF. Server offline?",
            LibraryError::UploadRejected(_) => "Could not upload PDF. Please try again.",
        }
    }
}
