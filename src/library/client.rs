//! HTTP client for the library server

use bytes::Bytes;
use reqwest::multipart::{Form, Part};

use super::types::{LibraryEntry, LibraryError, UploadResponse, UploadedDocument, UPLOAD_FIELD};

/// Lists and uploads documents on the library server
#[derive(Clone)]
pub struct LibraryClient {
    client: reqwest::Client,
    base_url: String,
    fallback_url: String,
}

impl LibraryClient {
    pub fn new(client: reqwest::Client, base_url: &str, fallback_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            fallback_url: fallback_url.trim_end_matches('/').to_string(),
        }
    }

    /// List hosted documents, trying the fallback server if the primary fails
    pub async fn list_files(&self) -> Result<Vec<LibraryEntry>, LibraryError> {
        let primary_error = match self.list_from(&self.base_url).await {
            Ok(entries) => return Ok(entries),
            Err(e) => e,
        };

        if self.fallback_url == self.base_url {
            return Err(LibraryError::ServerUnavailable(primary_error));
        }

        tracing::warn!(
            base = %self.base_url,
            fallback = %self.fallback_url,
            error = %primary_error,
            "Library listing failed, trying fallback server"
        );

        self.list_from(&self.fallback_url)
            .await
            .map_err(|fallback_error| {
                LibraryError::ServerUnavailable(format!("{}; {}", primary_error, fallback_error))
            })
    }

    /// Upload a document and return where the server stored it
    pub async fn upload(&self, name: &str, data: Bytes) -> Result<UploadedDocument, LibraryError> {
        let part = Part::bytes(data.to_vec())
            .file_name(name.to_string())
            .mime_str("application/pdf")
            .map_err(|e| LibraryError::UploadRejected(e.to_string()))?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| LibraryError::ServerUnavailable(e.to_string()))?;

        let status = response.status();
        let body: Option<UploadResponse> = response.json().await.ok();

        match body {
            Some(UploadResponse {
                success: true,
                filename: Some(filename),
                url: Some(url),
                ..
            }) if status.is_success() => {
                let url = absolute(&self.base_url, &url);
                tracing::info!(filename = %filename, url = %url, "Document uploaded");
                Ok(UploadedDocument { filename, url })
            }
            Some(UploadResponse { error: Some(error), .. }) => Err(LibraryError::UploadRejected(error)),
            _ => Err(LibraryError::UploadRejected(format!("HTTP {}", status.as_u16()))),
        }
    }

    async fn list_from(&self, base: &str) -> Result<Vec<LibraryEntry>, String> {
        let response = self
            .client
            .get(format!("{}/files", base))
            .send()
            .await
            .map_err(|e| format!("{}: {}", base, e))?;

        if !response.status().is_success() {
            return Err(format!("{}: HTTP {}", base, response.status().as_u16()));
        }

        let entries: Vec<LibraryEntry> = response
            .json()
            .await
            .map_err(|e| format!("{}: invalid listing: {}", base, e))?;

        Ok(entries
            .into_iter()
            .map(|entry| LibraryEntry {
                url: absolute(base, &entry.url),
                ..entry
            })
            .collect())
    }
}

/// Server-relative URLs are resolved against the base that produced them
fn absolute(base: &str, url: &str) -> String {
    if url.starts_with('/') {
        format!("{}{}", base, url)
    } else {
        url.to_string()
    }
}
