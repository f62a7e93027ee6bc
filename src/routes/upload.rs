//! Upload route
//!
//! Stores a single multipart file in the library directory.

use axum::{
    extract::{Multipart, State},
    Json,
};

use crate::error::{AppError, Result};
use crate::library::{UploadResponse, UPLOAD_FIELD};
use crate::state::AppState;

/// Maximum accepted upload size
pub const MAX_UPLOAD_SIZE: usize = 100 * 1024 * 1024;

/// POST /upload
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let original = field.file_name().unwrap_or("document.pdf").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let filename = sanitize_filename(&original);
        if filename.trim_matches('.').is_empty() {
            return Err(AppError::BadRequest(format!("Invalid file name: {}", original)));
        }

        tokio::fs::write(state.library_dir().join(&filename), &data).await?;

        tracing::info!(filename = %filename, size = data.len(), "File uploaded");

        let url = format!("/{}", filename);
        return Ok(Json(UploadResponse::stored(filename, url)));
    }

    Err(AppError::BadRequest("No file uploaded".to_string()))
}

/// Keep ASCII letters, digits and dots; everything else becomes `_`; lowercase
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
