//! Load requests and session state

use bytes::Bytes;
use serde::Serialize;

use crate::config::{ViewerConfig, DEFAULT_EMBED_THRESHOLD};
use crate::resource::TransientHandle;
use crate::viewer::FlipViewOptions;

/// Where a document comes from
#[derive(Debug)]
pub enum DocumentSource {
    /// URL the engine fetches itself
    Reference(String),
    /// In-memory bytes behind a transient handle; the handle moves into the session
    Transient(TransientHandle),
    /// Bytes held by the caller
    Inline(Bytes),
}

impl DocumentSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            DocumentSource::Reference(_) => SourceKind::Reference,
            DocumentSource::Transient(_) => SourceKind::Transient,
            DocumentSource::Inline(_) => SourceKind::Inline,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Reference,
    Transient,
    Inline,
}

/// A request to show a document
#[derive(Debug)]
pub struct LoadRequest {
    pub name: String,
    pub source: DocumentSource,
    /// Save to the local cache on success
    pub persist: bool,
}

impl LoadRequest {
    pub fn new(name: impl Into<String>, source: DocumentSource) -> Self {
        Self {
            name: name.into(),
            source,
            persist: true,
        }
    }

    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }
}

/// Lifecycle of the session's document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed,
}

/// The document currently on screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveDocument {
    pub name: String,
    /// Shareable URL, never a transient handle
    pub reference: Option<String>,
    /// Base64 content, kept only under the embed threshold
    pub embedded_content: Option<String>,
    pub page_count: usize,
}

/// Result of a load that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Ready(ActiveDocument),
    /// A newer load started before this one finished; nothing was changed
    Superseded,
}

impl LoadOutcome {
    pub fn document(&self) -> Option<&ActiveDocument> {
        match self {
            LoadOutcome::Ready(document) => Some(document),
            LoadOutcome::Superseded => None,
        }
    }
}

/// Result of handling the startup query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    Opened(LoadOutcome),
    /// No parameters; the user should pick a source
    PromptForSource,
}

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct LoaderSettings {
    /// Rasterization scale for every page
    pub render_scale: f32,
    /// Inline content whose base64 form is shorter than this stays shareable
    pub embed_threshold: usize,
    pub view_options: FlipViewOptions,
    /// Re-save documents reopened from the cache, moving them to the front
    pub bump_on_reopen: bool,
    /// Limit on opening a document; `None` leaves it to the engine and HTTP stack
    pub open_timeout_secs: Option<u64>,
    /// Limit on rasterizing one page
    pub render_timeout_secs: Option<u64>,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            render_scale: 1.5,
            embed_threshold: DEFAULT_EMBED_THRESHOLD,
            view_options: FlipViewOptions::default(),
            bump_on_reopen: false,
            open_timeout_secs: None,
            render_timeout_secs: None,
        }
    }
}

impl From<&ViewerConfig> for LoaderSettings {
    fn from(config: &ViewerConfig) -> Self {
        Self {
            render_scale: config.render_scale,
            embed_threshold: config.embed_threshold,
            open_timeout_secs: config.open_timeout_secs,
            render_timeout_secs: config.render_timeout_secs,
            ..Self::default()
        }
    }
}

/// Length of the standard padded base64 encoding of `len` bytes
pub(crate) fn encoded_len(len: usize) -> usize {
    len.div_ceil(3) * 4
}
