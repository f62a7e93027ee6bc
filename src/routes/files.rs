//! Library listing route
//!
//! Lists the PDF documents stored in the library directory.

use std::path::Path;

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::library::LibraryEntry;
use crate::state::AppState;

/// GET /files
pub async fn list_files(State(state): State<AppState>) -> Result<Json<Vec<LibraryEntry>>> {
    let mut dir = tokio::fs::read_dir(state.library_dir()).await.map_err(|e| {
        tracing::error!(dir = %state.library_dir().display(), "Failed to read library: {}", e);
        AppError::Internal("Unable to scan directory".to_string())
    })?;

    let mut entries = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if !is_pdf(&name) {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => continue,
        };

        let timestamp = metadata
            .modified()
            .map(|modified| DateTime::<Utc>::from(modified).timestamp_millis())
            .unwrap_or_else(|_| Utc::now().timestamp_millis());

        entries.push(LibraryEntry {
            url: format!("/{}", urlencoding::encode(&name)),
            name,
            timestamp,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(entries))
}

fn is_pdf(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}
