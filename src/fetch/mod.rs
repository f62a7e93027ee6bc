//! Remote document download
//!
//! Browsers and some hosts refuse cross-origin reads, so a download first goes
//! through a CORS-relaxing intermediary and only then falls back to fetching
//! the URL directly. Both outcomes come back as one byte blob.

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// Both download paths failed
#[derive(Debug, Error)]
#[error("Download failed (proxy: {proxy}; direct: {direct})")]
pub struct FetchError {
    /// Why the intermediary path failed
    pub proxy: String,
    /// Why the direct path failed
    pub direct: String,
}

/// Build the HTTP client shared by the fetcher and the library client
pub fn http_client(timeout_secs: Option<u64>) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build()
}

/// Proxy-then-direct downloader
#[derive(Clone)]
pub struct RemoteFetcher {
    client: reqwest::Client,
    proxy_prefix: String,
}

impl RemoteFetcher {
    pub fn new(client: reqwest::Client, proxy_prefix: impl Into<String>) -> Self {
        Self {
            client,
            proxy_prefix: proxy_prefix.into(),
        }
    }

    /// URL of `url` routed through the intermediary
    pub fn proxy_url(&self, url: &str) -> String {
        format!("{}{}", self.proxy_prefix, urlencoding::encode(url))
    }

    /// Download `url`, preferring the intermediary
    pub async fn fetch_remote(&self, url: &str) -> Result<Bytes, FetchError> {
        let proxy_error = match self.fetch_bytes(&self.proxy_url(url), "Proxy").await {
            Ok(data) => {
                tracing::debug!(url = %url, size = data.len(), "Fetched document through proxy");
                return Ok(data);
            }
            Err(e) => e,
        };

        tracing::warn!(url = %url, error = %proxy_error, "Proxy fetch failed, trying direct");

        match self.fetch_bytes(url, "Direct").await {
            Ok(data) => {
                tracing::debug!(url = %url, size = data.len(), "Fetched document directly");
                Ok(data)
            }
            Err(direct_error) => Err(FetchError {
                proxy: proxy_error,
                direct: direct_error,
            }),
        }
    }

    async fn fetch_bytes(&self, url: &str, path: &str) -> Result<Bytes, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("{} request failed: {}", path, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("{} HTTP {}", path, status.as_u16()));
        }

        response
            .bytes()
            .await
            .map_err(|e| format!("{} body read failed: {}", path, e))
    }
}
