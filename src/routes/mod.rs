//! Library server routes
//!
//! - POST /upload - store a document in the library directory
//! - GET /files - list hosted documents
//! - everything else is served from the library directory

pub mod files;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;

use crate::state::AppState;

/// Create the library server router
pub fn router(state: AppState) -> Router {
    let static_files = ServeDir::new(state.library_dir());

    Router::new()
        .route("/upload", post(upload::upload))
        .route("/files", get(files::list_files))
        .fallback_service(static_files)
        .layer(DefaultBodyLimit::max(upload::MAX_UPLOAD_SIZE))
        .with_state(state)
}
