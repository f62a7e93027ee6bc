//! Server-hosted document library
//!
//! Client side of the `/files` listing and `/upload` endpoints.

mod client;
mod types;

pub use client::LibraryClient;
pub use types::{LibraryEntry, LibraryError, UploadResponse, UploadedDocument, UPLOAD_FIELD};
