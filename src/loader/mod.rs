//! Document load orchestration
//!
//! ```text
//!            load_document
//!   Idle ──────────────────▶ Loading ──┬──▶ Ready
//!     ▲                        ▲       └──▶ Failed
//!     │ shutdown               │ newer load
//!     └────────────────── any ─┘
//! ```
//!
//! Local files, remote URLs, library entries, cached records and startup
//! parameters all become a [`LoadRequest`]. Only the newest request may change
//! what is on screen or what is saved.

mod error;
mod orchestrator;
mod state;

pub use error::{LoadError, Result};
pub use orchestrator::DocumentLoader;
pub use state::{
    ActiveDocument, DocumentSource, LoadOutcome, LoadPhase, LoadRequest, LoaderSettings,
    SourceKind, StartupOutcome,
};
