//! Configuration management for Flipbook

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Default number of documents kept in the local cache
pub const DEFAULT_CACHE_CAPACITY: usize = 10;

/// Default limit (base64 characters) under which inline content stays shareable
pub const DEFAULT_EMBED_THRESHOLD: usize = 50_000;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub viewer: ViewerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding uploaded documents, also served statically
    pub library_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub database_url: String,
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Prefix of the CORS-relaxing intermediary; the target URL is appended encoded
    pub proxy_prefix: String,
    pub timeout_secs: Option<u64>,
    /// Base URL of the library server, tried before the fallback
    pub library_base_url: String,
    pub library_fallback_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewerConfig {
    pub render_scale: f32,
    pub embed_threshold: usize,
    /// Unset means no limit beyond the engine's own
    pub open_timeout_secs: Option<u64>,
    pub render_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                library_dir: PathBuf::from("."),
            },
            cache: CacheConfig::default(),
            fetch: FetchConfig::default(),
            viewer: ViewerConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            database_url: "sqlite:./flipbook-cache.db".to_string(),
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            proxy_prefix: "https://corsproxy.io/?".to_string(),
            timeout_secs: None,
            library_base_url: "http://localhost:3000".to_string(),
            library_fallback_url: "http://localhost:3000".to_string(),
        }
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        ViewerConfig {
            render_scale: 1.5,
            embed_threshold: DEFAULT_EMBED_THRESHOLD,
            open_timeout_secs: None,
            render_timeout_secs: None,
        }
    }
}

/// Error raised for a malformed configuration variable
#[derive(Debug, thiserror::Error)]
#[error("Invalid value for {key}: {value:?}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT")?.unwrap_or(defaults.server.port),
                library_dir: env::var("LIBRARY_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.server.library_dir),
            },
            cache: CacheConfig {
                database_url: env::var("CACHE_DATABASE_URL")
                    .unwrap_or(defaults.cache.database_url),
                capacity: parse_var::<usize>("CACHE_CAPACITY")?
                    .filter(|c| *c > 0)
                    .unwrap_or(defaults.cache.capacity),
            },
            fetch: FetchConfig {
                proxy_prefix: env::var("FETCH_PROXY_PREFIX").unwrap_or(defaults.fetch.proxy_prefix),
                timeout_secs: parse_var("FETCH_TIMEOUT_SECS")?,
                library_base_url: env::var("LIBRARY_BASE_URL")
                    .unwrap_or(defaults.fetch.library_base_url),
                library_fallback_url: env::var("LIBRARY_FALLBACK_URL")
                    .unwrap_or(defaults.fetch.library_fallback_url),
            },
            viewer: ViewerConfig {
                render_scale: parse_var("VIEWER_RENDER_SCALE")?
                    .unwrap_or(defaults.viewer.render_scale),
                embed_threshold: parse_var("VIEWER_EMBED_THRESHOLD")?
                    .unwrap_or(defaults.viewer.embed_threshold),
                open_timeout_secs: parse_var("VIEWER_OPEN_TIMEOUT_SECS")?,
                render_timeout_secs: parse_var("VIEWER_RENDER_TIMEOUT_SECS")?,
            },
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError { key, value }),
        Err(_) => Ok(None),
    }
}
