//! Flipbook
//!
//! Document loading and local caching for a page-flipping PDF viewer, plus
//! the small library server that hosts uploaded documents.
//!
//! # Modules
//!
//! - `loader`: Load orchestration, the only writer of the session's document
//! - `cache`: Recent documents, persisted in SQLite and capped by recency
//! - `resource`: Transient handles over in-memory documents
//! - `fetch`: Proxy-then-direct remote download
//! - `library`: Client for the library server
//! - `share`: Share links and startup query parsing
//! - `viewer`: Rendering engine and flip view seams
//! - `routes`: Library server HTTP routes

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod library;
pub mod loader;
pub mod resource;
pub mod routes;
pub mod share;
pub mod state;
pub mod viewer;

#[cfg(test)]
pub(crate) mod test_support;
