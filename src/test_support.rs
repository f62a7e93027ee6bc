//! Shared fakes for tests

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::resource::{is_transient, ResourceTracker};
use crate::viewer::{
    DocumentHandle, EngineError, FlipView, FlipViewFactory, FlipViewOptions, NoticeLevel,
    PageSurface, PixelBuffer, RenderingEngine, SourceRef, StatusObserver,
};

/// Serve `app` on an ephemeral local port
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Minimal fake document: `%PDF pages=N` followed by any padding
pub fn fake_pdf(pages: usize, total_len: usize) -> Bytes {
    let mut data = format!("%PDF pages={}\n", pages).into_bytes();
    if data.len() < total_len {
        data.resize(total_len, b' ');
    }
    Bytes::from(data)
}

/// Engine that understands [`fake_pdf`] documents
#[derive(Default)]
pub struct FakeEngine {
    tracker: ResourceTracker,
    remote: Mutex<HashMap<String, Bytes>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    opened: Mutex<Vec<String>>,
    rendered: Arc<Mutex<Vec<usize>>>,
}

impl FakeEngine {
    pub fn new(tracker: ResourceTracker) -> Self {
        Self {
            tracker,
            ..Default::default()
        }
    }

    /// Make `url` readable by reference
    pub fn host(&self, url: &str, data: Bytes) {
        self.remote.lock().insert(url.to_string(), data);
    }

    /// Block opens of `url` until the returned gate is notified
    pub fn hold(&self, url: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().insert(url.to_string(), Arc::clone(&gate));
        gate
    }

    /// Sources opened so far, inline sources as `inline`
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    /// Page numbers rendered so far, in order
    pub fn rendered(&self) -> Vec<usize> {
        self.rendered.lock().clone()
    }

    fn parse(data: &[u8]) -> Result<usize, EngineError> {
        let text = String::from_utf8_lossy(&data[..data.len().min(64)]);
        text.strip_prefix("%PDF pages=")
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|count| count.parse().ok())
            .ok_or_else(|| EngineError::Parse("Invalid PDF structure.".to_string()))
    }
}

#[async_trait]
impl RenderingEngine for FakeEngine {
    async fn open(&self, source: SourceRef<'_>) -> Result<Box<dyn DocumentHandle>, EngineError> {
        let data = match source {
            SourceRef::Inline(data) => {
                self.opened.lock().push("inline".to_string());
                Bytes::copy_from_slice(data)
            }
            SourceRef::Reference(url) => {
                self.opened.lock().push(url.to_string());
                let gate = self.gates.lock().get(url).cloned();
                if let Some(gate) = gate {
                    gate.notified().await;
                }

                let found = if is_transient(url) {
                    self.tracker.resolve(url)
                } else {
                    self.remote.lock().get(url).cloned()
                };
                found.ok_or_else(|| EngineError::Parse(format!("Unexpected server response (404) while retrieving PDF \"{}\".", url)))?
            }
        };

        let pages = Self::parse(&data)?;
        Ok(Box::new(FakeDocument {
            pages,
            rendered: Arc::clone(&self.rendered),
        }))
    }
}

struct FakeDocument {
    pages: usize,
    rendered: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl DocumentHandle for FakeDocument {
    fn page_count(&self) -> usize {
        self.pages
    }

    async fn render_page(&self, number: usize, scale: f32) -> Result<PixelBuffer, EngineError> {
        self.rendered.lock().push(number);
        let side = (100.0 * scale) as u32;
        Ok(PixelBuffer {
            width: side,
            height: side,
            data: vec![0; 4],
        })
    }
}

/// Flip view factory that tracks live views
#[derive(Default, Clone)]
pub struct FakeViews {
    pub live: Arc<AtomicUsize>,
    pub destroyed: Arc<AtomicUsize>,
    pub created: Arc<Mutex<Vec<Vec<usize>>>>,
    pub position: Arc<Mutex<usize>>,
}

impl FakeViews {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl FlipViewFactory for FakeViews {
    fn create(&self, pages: Vec<PageSurface>, _options: &FlipViewOptions) -> Box<dyn FlipView> {
        self.live.fetch_add(1, Ordering::SeqCst);
        self.created
            .lock()
            .push(pages.iter().map(|p| p.number).collect());
        *self.position.lock() = 0;
        Box::new(FakeView {
            page_count: pages.len(),
            views: self.clone(),
            destroyed: false,
        })
    }
}

struct FakeView {
    page_count: usize,
    views: FakeViews,
    destroyed: bool,
}

impl FlipView for FakeView {
    fn next(&mut self) {
        let mut position = self.views.position.lock();
        if *position + 1 < self.page_count {
            *position += 1;
        }
    }

    fn prev(&mut self) {
        let mut position = self.views.position.lock();
        *position = position.saturating_sub(1);
    }

    fn destroy(&mut self) {
        assert!(!self.destroyed, "view destroyed twice");
        self.destroyed = true;
        self.views.live.fetch_sub(1, Ordering::SeqCst);
        self.views.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Observer that records every status call
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl StatusObserver for RecordingObserver {
    fn loading(&self, message: &str) {
        self.events.lock().push(format!("loading: {}", message));
    }

    fn ready(&self, name: &str, page_count: usize) {
        self.events.lock().push(format!("ready: {} ({} pages)", name, page_count));
    }

    fn failed(&self, message: &str) {
        self.events.lock().push(format!("failed: {}", message));
    }

    fn notice(&self, level: NoticeLevel, message: &str) {
        self.events.lock().push(format!("notice {:?}: {}", level, message));
    }
}
