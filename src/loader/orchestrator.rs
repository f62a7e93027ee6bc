//! Document load orchestrator
//!
//! Every way of opening a document funnels into [`DocumentLoader::load_document`].
//! Loads are single-flight: each one takes a new generation number, and a
//! load whose generation is no longer current never touches the session.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::{timeout, Duration};

use super::error::{LoadError, Result};
use super::state::{
    encoded_len, ActiveDocument, DocumentSource, LoadOutcome, LoadPhase, LoadRequest,
    LoaderSettings, StartupOutcome,
};
use crate::cache::{self, CacheContent, CacheRecord, DocumentCache};
use crate::config::Config;
use crate::fetch::{http_client, RemoteFetcher};
use crate::library::{LibraryClient, LibraryEntry, LibraryError, UploadedDocument};
use crate::resource::{is_transient, ResourceTracker, TransientHandle};
use crate::share::{
    build_share_link, decode_embedded, encode_embedded, name_from_reference, parse_startup_query,
    ShareLink, StartupRequest,
};
use crate::viewer::{
    FlipView, FlipViewFactory, LogObserver, NoticeLevel, PageSurface, RenderingEngine, SourceRef,
    StatusObserver,
};

/// Owns the session's document, view and transient handle
pub struct DocumentLoader {
    engine: Arc<dyn RenderingEngine>,
    views: Arc<dyn FlipViewFactory>,
    observer: Arc<dyn StatusObserver>,
    tracker: ResourceTracker,
    /// `None` when local storage is unavailable; loads still work
    cache: Option<DocumentCache>,
    fetcher: RemoteFetcher,
    library: LibraryClient,
    settings: LoaderSettings,
    generation: AtomicU64,
    session: Mutex<Session>,
}

#[derive(Default)]
struct Session {
    phase: LoadPhase,
    document: Option<ActiveDocument>,
    handle: Option<TransientHandle>,
    view: Option<Box<dyn FlipView>>,
}

impl Session {
    fn teardown(&mut self) {
        if let Some(mut view) = self.view.take() {
            view.destroy();
        }
        self.handle = None;
        self.document = None;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Owned form of what the engine is asked to open
enum EngineInput {
    Reference(String),
    Inline(Bytes),
}

impl EngineInput {
    fn as_source(&self) -> SourceRef<'_> {
        match self {
            EngineInput::Reference(url) => SourceRef::Reference(url),
            EngineInput::Inline(data) => SourceRef::Inline(data),
        }
    }
}

struct Prepared {
    input: EngineInput,
    handle: Option<TransientHandle>,
    reference: Option<String>,
    embedded: Option<String>,
    content: Option<CacheContent>,
}

impl DocumentLoader {
    pub fn new(
        engine: Arc<dyn RenderingEngine>,
        views: Arc<dyn FlipViewFactory>,
        tracker: ResourceTracker,
        fetcher: RemoteFetcher,
        library: LibraryClient,
    ) -> Self {
        Self {
            engine,
            views,
            observer: Arc::new(LogObserver),
            tracker,
            cache: None,
            fetcher,
            library,
            settings: LoaderSettings::default(),
            generation: AtomicU64::new(0),
            session: Mutex::new(Session::default()),
        }
    }

    /// Build a loader from configuration, opening the local cache if possible
    ///
    /// `tracker` must be the one `engine` resolves transient URLs with.
    pub async fn from_config(
        config: &Config,
        engine: Arc<dyn RenderingEngine>,
        views: Arc<dyn FlipViewFactory>,
        tracker: ResourceTracker,
    ) -> reqwest::Result<Self> {
        let client = http_client(config.fetch.timeout_secs)?;
        let fetcher = RemoteFetcher::new(client.clone(), config.fetch.proxy_prefix.clone());
        let library = LibraryClient::new(
            client,
            &config.fetch.library_base_url,
            &config.fetch.library_fallback_url,
        );

        let loader = Self::new(engine, views, tracker, fetcher, library)
            .with_settings(LoaderSettings::from(&config.viewer));

        match DocumentCache::open(&config.cache.database_url, config.cache.capacity).await {
            Ok(cache) => Ok(loader.with_cache(cache)),
            Err(e) => {
                tracing::warn!("Local cache unavailable, documents will not be remembered: {}", e);
                Ok(loader)
            }
        }
    }

    pub fn with_cache(mut self, cache: DocumentCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn StatusObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_settings(mut self, settings: LoaderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn cache(&self) -> Option<&DocumentCache> {
        self.cache.as_ref()
    }

    pub fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }

    pub fn phase(&self) -> LoadPhase {
        self.session.lock().phase
    }

    pub fn current_document(&self) -> Option<ActiveDocument> {
        self.session.lock().document.clone()
    }

    /// URL of the transient handle backing the current document, if any
    pub fn transient_url(&self) -> Option<String> {
        self.session
            .lock()
            .handle
            .as_ref()
            .map(|handle| handle.url().to_string())
    }

    /// Show a document, replacing whatever is on screen
    ///
    /// Returns [`LoadOutcome::Superseded`] when a newer load started first; in
    /// that case this load changed nothing and saved nothing.
    pub async fn load_document(&self, request: LoadRequest) -> Result<LoadOutcome> {
        let LoadRequest {
            name,
            source,
            persist,
        } = request;
        let kind = source.kind();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        tracing::info!(generation, name = %name, source = ?kind, "Loading document");
        self.observer.loading("Loading PDF...");

        let mut prepared = self.prepare(source);
        self.begin(prepared.handle.take());

        let pages = match self.render_all(&prepared.input, generation).await {
            Ok(Some(pages)) => pages,
            Ok(None) => {
                tracing::debug!(generation, name = %name, "Load superseded while rendering");
                return Ok(LoadOutcome::Superseded);
            }
            Err(err) => return self.fail(generation, &name, err),
        };

        let page_count = pages.len();
        let document = ActiveDocument {
            name,
            reference: prepared.reference,
            embedded_content: prepared.embedded,
            page_count,
        };

        let view = self.views.create(pages, &self.settings.view_options);
        if let Err(mut view) = self.commit(generation, document.clone(), view) {
            view.destroy();
            tracing::debug!(generation, name = %document.name, "Load superseded before display");
            return Ok(LoadOutcome::Superseded);
        }

        tracing::info!(generation, name = %document.name, pages = page_count, "Document ready");
        self.observer.ready(&document.name, page_count);

        // Only a committed generation writes, and its stamp is taken before any newer load can commit
        let saved = match (persist, prepared.content) {
            (true, Some(content)) => self.persist(&document.name, content).await,
            _ => false,
        };

        if self.is_current(generation) {
            self.observer.notice(
                NoticeLevel::Success,
                if saved {
                    "Book saved to library"
                } else {
                    "PDF loaded successfully!"
                },
            );
        }

        Ok(LoadOutcome::Ready(document))
    }

    /// Reopen a cached document without saving it again
    pub async fn load_from_cache(&self, record: CacheRecord) -> Result<LoadOutcome> {
        let CacheRecord { name, content, .. } = record;
        let source = match content {
            CacheContent::Reference(url) => DocumentSource::Reference(url),
            CacheContent::Bytes(data) => DocumentSource::Transient(self.tracker.acquire(data)),
        };

        self.load_document(LoadRequest::new(name, source).persist(self.settings.bump_on_reopen))
            .await
    }

    /// Open a file picked from the local disk
    pub async fn open_local_file(&self, name: &str, data: Bytes) -> Result<LoadOutcome> {
        self.ensure_pdf(name)?;
        self.load_document(LoadRequest::new(name, DocumentSource::Inline(data)))
            .await
    }

    /// Download `url` and show it, falling back to letting the engine read the URL
    pub async fn open_remote_url(&self, url: &str) -> Result<LoadOutcome> {
        let url = url.trim();
        if url.is_empty() {
            self.observer.notice(NoticeLevel::Info, "Please enter a URL.");
            return Err(LoadError::EmptyUrl);
        }

        let name = name_from_reference(url);
        self.observer.loading("Downloading PDF...");

        match self.fetcher.fetch_remote(url).await {
            Ok(data) => {
                let handle = self.tracker.acquire(data);
                self.load_document(LoadRequest::new(name, DocumentSource::Transient(handle)))
                    .await
            }
            Err(e) => {
                tracing::warn!(url = %url, "Download failed, opening by reference: {}", e);
                self.observer.loading("Download failed. Opening link...");
                self.load_document(LoadRequest::new(
                    name,
                    DocumentSource::Reference(url.to_string()),
                ))
                .await
            }
        }
    }

    /// Documents hosted on the library server
    pub async fn library_files(&self) -> std::result::Result<Vec<LibraryEntry>, LibraryError> {
        match self.library.list_files().await {
            Ok(entries) => Ok(entries),
            Err(e) => {
                tracing::warn!("Library listing failed: {}", e);
                self.observer.notice(NoticeLevel::Error, e.user_message());
                Err(e)
            }
        }
    }

    pub async fn open_library_entry(&self, entry: &LibraryEntry) -> Result<LoadOutcome> {
        self.load_document(LoadRequest::new(
            entry.name.clone(),
            DocumentSource::Reference(entry.url.clone()),
        ))
        .await
    }

    /// Upload a local file to the library server, then show it from there
    pub async fn upload_and_load(&self, name: &str, data: Bytes) -> Result<LoadOutcome> {
        self.ensure_pdf(name)?;
        self.observer.loading("Uploading PDF...");

        match self.library.upload(name, data).await {
            Ok(UploadedDocument { filename, url }) => {
                self.observer
                    .notice(NoticeLevel::Success, "PDF uploaded to library");
                self.load_document(LoadRequest::new(filename, DocumentSource::Reference(url)))
                    .await
            }
            Err(e) => {
                tracing::error!(name = %name, "Upload failed: {}", e);
                self.observer.failed("Upload failed");
                self.observer.notice(NoticeLevel::Error, e.upload_message());
                Err(e.into())
            }
        }
    }

    /// Act on the query string the viewer was opened with
    pub async fn handle_url_params(&self, query: &str) -> Result<StartupOutcome> {
        match parse_startup_query(query) {
            StartupRequest::Reference(reference) => {
                let name = name_from_reference(&reference);
                let outcome = self
                    .load_document(LoadRequest::new(name, DocumentSource::Reference(reference)))
                    .await?;
                Ok(StartupOutcome::Opened(outcome))
            }
            StartupRequest::Embedded(content) => {
                let data = decode_embedded(&content).map_err(|e| {
                    tracing::warn!("Rejected embedded document: {}", e);
                    self.observer.failed("Invalid embedded PDF link");
                    LoadError::InvalidEmbedded(e.to_string())
                })?;
                let outcome = self
                    .load_document(LoadRequest::new(
                        "document.pdf",
                        DocumentSource::Inline(Bytes::from(data)),
                    ))
                    .await?;
                Ok(StartupOutcome::Opened(outcome))
            }
            StartupRequest::Prompt => Ok(StartupOutcome::PromptForSource),
        }
    }

    /// Share link for the current document, as seen from `page_url`
    pub fn share_link(&self, page_url: &str) -> Option<ShareLink> {
        let session = self.session.lock();
        let document = session.document.as_ref()?;
        Some(build_share_link(
            page_url,
            document.reference.as_deref(),
            document.embedded_content.as_deref(),
            &document.name,
        ))
    }

    /// Most recently saved documents, newest first
    pub async fn recent_documents(&self) -> cache::Result<Vec<CacheRecord>> {
        match &self.cache {
            Some(cache) => cache.list_recent(cache.capacity()).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn clear_history(&self) -> cache::Result<()> {
        if let Some(cache) = &self.cache {
            cache.clear().await?;
            self.observer.notice(NoticeLevel::Info, "History cleared");
        }
        Ok(())
    }

    /// Flip forward; false when nothing is shown
    pub fn next_page(&self) -> bool {
        match self.session.lock().view.as_mut() {
            Some(view) => {
                view.next();
                true
            }
            None => false,
        }
    }

    /// Flip back; false when nothing is shown
    pub fn prev_page(&self) -> bool {
        match self.session.lock().view.as_mut() {
            Some(view) => {
                view.prev();
                true
            }
            None => false,
        }
    }

    /// Tear down the session and wait for pending cache cleanup
    pub async fn shutdown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut session = self.session.lock();
            session.teardown();
            session.phase = LoadPhase::Idle;
        }
        if let Some(cache) = &self.cache {
            cache.settle().await;
        }
        tracing::info!("Document loader shut down");
    }

    fn prepare(&self, source: DocumentSource) -> Prepared {
        match source {
            DocumentSource::Reference(url) => {
                let (reference, content) = if is_transient(&url) {
                    (None, self.tracker.resolve(&url).map(CacheContent::Bytes))
                } else {
                    (Some(url.clone()), Some(CacheContent::Reference(url.clone())))
                };
                Prepared {
                    input: EngineInput::Reference(url),
                    handle: None,
                    reference,
                    embedded: None,
                    content,
                }
            }
            DocumentSource::Transient(handle) => Prepared {
                input: EngineInput::Reference(handle.url().to_string()),
                content: handle.data().map(CacheContent::Bytes),
                handle: Some(handle),
                reference: None,
                embedded: None,
            },
            DocumentSource::Inline(data) => {
                let embedded = (encoded_len(data.len()) < self.settings.embed_threshold)
                    .then(|| encode_embedded(&data));
                Prepared {
                    input: EngineInput::Inline(data.clone()),
                    handle: Some(self.tracker.acquire(data.clone())),
                    reference: None,
                    embedded,
                    content: Some(CacheContent::Bytes(data)),
                }
            }
        }
    }

    /// Tear down the previous document and enter `Loading`
    fn begin(&self, handle: Option<TransientHandle>) {
        let mut session = self.session.lock();
        session.teardown();
        session.handle = handle;
        session.phase = LoadPhase::Loading;
    }

    /// Open and rasterize every page in order; `None` once superseded
    async fn render_all(
        &self,
        input: &EngineInput,
        generation: u64,
    ) -> Result<Option<Vec<PageSurface>>> {
        let document =
            bounded(self.settings.open_timeout_secs, self.engine.open(input.as_source())).await??;

        let page_count = document.page_count();
        if page_count == 0 {
            return Err(LoadError::Parse("Document has no pages".to_string()));
        }

        let mut pages = Vec::with_capacity(page_count);
        for number in 1..=page_count {
            if !self.is_current(generation) {
                return Ok(None);
            }

            let pixels = bounded(
                self.settings.render_timeout_secs,
                document.render_page(number, self.settings.render_scale),
            )
            .await??;

            pages.push(PageSurface { number, pixels });
        }

        Ok(Some(pages))
    }

    /// Install the view and document unless a newer load started
    fn commit(
        &self,
        generation: u64,
        document: ActiveDocument,
        view: Box<dyn FlipView>,
    ) -> std::result::Result<(), Box<dyn FlipView>> {
        let mut session = self.session.lock();
        if !self.is_current(generation) {
            return Err(view);
        }

        if let Some(mut previous) = session.view.replace(view) {
            previous.destroy();
        }
        session.document = Some(document);
        session.phase = LoadPhase::Ready;
        Ok(())
    }

    fn fail(&self, generation: u64, name: &str, err: LoadError) -> Result<LoadOutcome> {
        {
            let mut session = self.session.lock();
            if !self.is_current(generation) {
                tracing::debug!(generation, name = %name, error = %err, "Superseded load failed");
                return Ok(LoadOutcome::Superseded);
            }
            session.teardown();
            session.phase = LoadPhase::Failed;
        }

        tracing::error!(generation, name = %name, error = %err, "Document load failed");

        let message = err.to_string();
        self.observer.failed(&message);
        self.observer
            .notice(NoticeLevel::Error, &format!("Could not load PDF: {}", message));
        Err(err)
    }

    /// Save to the local cache; storage problems are logged, never raised
    async fn persist(&self, name: &str, content: CacheContent) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };

        match cache.put(name, content).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(name = %name, "Failed to save document to local cache: {}", e);
                false
            }
        }
    }

    fn ensure_pdf(&self, name: &str) -> Result<()> {
        let is_pdf = mime_guess::from_path(name)
            .first()
            .map(|mime| mime.essence_str() == "application/pdf")
            .unwrap_or(false);

        if is_pdf {
            Ok(())
        } else {
            self.observer
                .notice(NoticeLevel::Error, "Please select a valid PDF file.");
            Err(LoadError::InvalidFile(name.to_string()))
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

/// Await `fut`, giving up after `secs` when a limit is configured
async fn bounded<F: Future>(secs: Option<u64>, fut: F) -> Result<F::Output> {
    match secs {
        Some(secs) => timeout(Duration::from_secs(secs), fut)
            .await
            .map_err(|_| LoadError::Timeout(secs)),
        None => Ok(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes;
    use crate::share::encode_embedded;
    use crate::state::AppState;
    use crate::library::UploadResponse;
    use crate::test_support::{fake_pdf, serve, FakeEngine, FakeViews, RecordingObserver};
    use axum::{
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use sqlx::sqlite::SqlitePoolOptions;

    const PAGE: &str = "http://localhost:3000/viewer.html";
    const OFFLINE: &str = "http://127.0.0.1:9";

    struct Harness {
        loader: Arc<DocumentLoader>,
        engine: Arc<FakeEngine>,
        views: FakeViews,
        observer: Arc<RecordingObserver>,
        tracker: ResourceTracker,
    }

    fn offline_fetcher() -> RemoteFetcher {
        RemoteFetcher::new(reqwest::Client::new(), format!("{}/?", OFFLINE))
    }

    fn library_at(base: &str) -> LibraryClient {
        LibraryClient::new(reqwest::Client::new(), base, base)
    }

    fn build(cache: Option<DocumentCache>, library: LibraryClient) -> Harness {
        build_with_settings(cache, library, LoaderSettings::default())
    }

    fn build_with_settings(
        cache: Option<DocumentCache>,
        library: LibraryClient,
        settings: LoaderSettings,
    ) -> Harness {
        let tracker = ResourceTracker::new();
        let engine = Arc::new(FakeEngine::new(tracker.clone()));
        let views = FakeViews::default();
        let observer = Arc::new(RecordingObserver::default());

        let mut loader = DocumentLoader::new(
            engine.clone(),
            Arc::new(views.clone()),
            tracker.clone(),
            offline_fetcher(),
            library,
        )
        .with_observer(observer.clone())
        .with_settings(settings);
        if let Some(cache) = cache {
            loader = loader.with_cache(cache);
        }

        Harness {
            loader: Arc::new(loader),
            engine,
            views,
            observer,
            tracker,
        }
    }

    async fn harness() -> Harness {
        build(
            Some(DocumentCache::in_memory(10).await.unwrap()),
            library_at(OFFLINE),
        )
    }

    fn inline(name: &str, data: Bytes) -> LoadRequest {
        LoadRequest::new(name, DocumentSource::Inline(data))
    }

    async fn wait_until_shown(loader: &DocumentLoader, name: &str) {
        while loader.current_document().map(|d| d.name != name).unwrap_or(true) {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_sequential_inline_loads_keep_one_transient_handle() {
        let h = harness().await;

        for i in 0..5 {
            let outcome = h
                .loader
                .load_document(inline(&format!("doc-{}.pdf", i), fake_pdf(2, 0)).persist(false))
                .await
                .unwrap();
            assert!(outcome.document().is_some());
            assert_eq!(h.tracker.live_count(), 1);
            assert_eq!(h.views.live(), 1);
            assert_eq!(h.views.destroyed(), i);
        }

        assert_eq!(h.loader.phase(), LoadPhase::Ready);
        assert!(h.loader.recent_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_small_inline_document_is_shareable() {
        let h = harness().await;
        let data = fake_pdf(3, 30_000);

        let outcome = h.loader.load_document(inline("small.pdf", data.clone())).await.unwrap();
        let document = outcome.document().unwrap();
        assert_eq!(document.page_count, 3);
        assert_eq!(document.embedded_content.as_ref().map(|c| c.len()), Some(40_000));
        assert!(document.reference.is_none());

        let link = h.loader.share_link(PAGE).unwrap();
        assert!(matches!(link, ShareLink::Embedded { .. }));
        assert!(link.url().starts_with("http://localhost:3000/viewer.html?pdf="));

        let recent = h.loader.recent_documents().await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].name, "small.pdf");
        assert_eq!(recent[0].content, CacheContent::Bytes(data));
    }

    #[tokio::test]
    async fn test_large_inline_document_is_local_only() {
        let h = harness().await;

        let outcome = h
            .loader
            .load_document(inline("large.pdf", fake_pdf(1, 60_000)))
            .await
            .unwrap();
        assert!(outcome.document().unwrap().embedded_content.is_none());

        let link = h.loader.share_link(PAGE).unwrap();
        assert!(link.is_local_only());
        assert_eq!(link.url(), "http://localhost:3000/viewer.html?file=large.pdf");
    }

    #[tokio::test]
    async fn test_recent_documents_follow_save_order() {
        let h = harness().await;
        let url = "https://example.com/a.pdf";
        h.engine.host(url, fake_pdf(1, 0));

        h.loader
            .load_document(LoadRequest::new("A", DocumentSource::Reference(url.to_string())))
            .await
            .unwrap();
        h.loader.load_document(inline("B", fake_pdf(1, 0))).await.unwrap();

        let recent = h.loader.recent_documents().await.unwrap();
        let names: Vec<&str> = recent.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(recent[1].content, CacheContent::Reference(url.to_string()));

        assert!(h.loader.share_link(PAGE).unwrap().url().contains("?pdf="));
    }

    #[tokio::test]
    async fn test_parse_failure_clears_session_and_skips_cache() {
        let h = harness().await;
        h.loader.load_document(inline("good.pdf", fake_pdf(2, 0))).await.unwrap();

        let err = h
            .loader
            .load_document(inline("bad.pdf", Bytes::from_static(b"not a pdf")))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Parse(ref m) if m == "Invalid PDF structure."));

        assert_eq!(h.loader.phase(), LoadPhase::Failed);
        assert!(h.loader.current_document().is_none());
        assert!(h.loader.share_link(PAGE).is_none());
        assert_eq!(h.views.live(), 0);
        assert_eq!(h.tracker.live_count(), 0);

        let recent = h.loader.recent_documents().await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].name, "good.pdf");

        let events = h.observer.events();
        assert!(events.contains(&"failed: Invalid PDF structure.".to_string()));
        assert!(events.contains(&"notice Error: Could not load PDF: Invalid PDF structure.".to_string()));
    }

    #[tokio::test]
    async fn test_newer_load_supersedes_slow_one() {
        let h = harness().await;
        let slow = "https://example.com/slow.pdf";
        h.engine.host(slow, fake_pdf(5, 0));
        let gate = h.engine.hold(slow);

        let task = tokio::spawn({
            let loader = Arc::clone(&h.loader);
            async move {
                loader
                    .load_document(LoadRequest::new(
                        "slow.pdf",
                        DocumentSource::Reference(slow.to_string()),
                    ))
                    .await
            }
        });

        while !h.engine.opened().iter().any(|o| o == slow) {
            tokio::task::yield_now().await;
        }

        let fast = h.loader.load_document(inline("fast.pdf", fake_pdf(1, 0))).await.unwrap();
        assert_eq!(fast.document().unwrap().name, "fast.pdf");

        gate.notify_one();
        assert_eq!(task.await.unwrap().unwrap(), LoadOutcome::Superseded);

        assert_eq!(h.loader.current_document().unwrap().name, "fast.pdf");
        assert_eq!(h.views.live(), 1);
        assert_eq!(h.views.created.lock().len(), 1);

        let recent = h.loader.recent_documents().await.unwrap();
        let names: Vec<&str> = recent.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["fast.pdf"]);
    }

    #[tokio::test]
    async fn test_load_without_cache() {
        let h = build(None, library_at(OFFLINE));

        let outcome = h.loader.load_document(inline("a.pdf", fake_pdf(1, 0))).await.unwrap();
        assert!(outcome.document().is_some());
        assert!(h.loader.recent_documents().await.unwrap().is_empty());
        h.loader.clear_history().await.unwrap();
    }

    #[tokio::test]
    async fn test_storage_failure_does_not_fail_load() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let cache = DocumentCache::from_pool(pool.clone(), 10).await.unwrap();
        pool.close().await;

        let h = build(Some(cache), library_at(OFFLINE));
        let outcome = h.loader.load_document(inline("a.pdf", fake_pdf(1, 0))).await.unwrap();

        assert!(outcome.document().is_some());
        assert_eq!(h.loader.phase(), LoadPhase::Ready);
        assert!(h
            .observer
            .events()
            .contains(&"notice Success: PDF loaded successfully!".to_string()));
    }

    #[tokio::test]
    async fn test_reopen_from_cache_keeps_recency() {
        let h = harness().await;
        h.loader.load_document(inline("a.pdf", fake_pdf(2, 0))).await.unwrap();
        h.loader.load_document(inline("b.pdf", fake_pdf(3, 0))).await.unwrap();

        let before = h.loader.recent_documents().await.unwrap();
        let record_a = before[1].clone();
        assert_eq!(record_a.name, "a.pdf");

        let outcome = h.loader.load_from_cache(record_a).await.unwrap();
        assert_eq!(outcome.document().unwrap().page_count, 2);

        assert_eq!(h.tracker.live_count(), 1);
        let transient = h.loader.transient_url().unwrap();
        assert!(is_transient(&transient));
        assert_eq!(h.engine.opened().last(), Some(&transient));

        let after = h.loader.recent_documents().await.unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn test_remote_download_persists_bytes() {
        let data = fake_pdf(2, 0);
        let app = Router::new().route("/doc.pdf", get({
            let data = data.clone();
            move || async move { data }
        }));
        let addr = serve(app).await;
        let h = harness().await;

        let outcome = h
            .loader
            .open_remote_url(&format!("http://{}/doc.pdf", addr))
            .await
            .unwrap();
        let document = outcome.document().unwrap();
        assert_eq!(document.name, "doc.pdf");
        assert!(document.reference.is_none());
        assert_eq!(h.tracker.live_count(), 1);

        let recent = h.loader.recent_documents().await.unwrap();
        assert_eq!(recent[0].content, CacheContent::Bytes(data));
    }

    #[tokio::test]
    async fn test_remote_download_failure_opens_by_reference() {
        let h = harness().await;
        let url = format!("{}/missing.pdf", OFFLINE);
        h.engine.host(&url, fake_pdf(1, 0));

        let outcome = h.loader.open_remote_url(&url).await.unwrap();
        assert_eq!(outcome.document().unwrap().reference.as_deref(), Some(url.as_str()));

        let recent = h.loader.recent_documents().await.unwrap();
        assert_eq!(recent[0].content, CacheContent::Reference(url));
        assert!(h
            .observer
            .events()
            .contains(&"loading: Download failed. Opening link...".to_string()));
    }

    #[tokio::test]
    async fn test_input_validation() {
        let h = harness().await;

        assert!(matches!(
            h.loader.open_remote_url("   ").await,
            Err(LoadError::EmptyUrl)
        ));
        assert!(matches!(
            h.loader.open_local_file("notes.txt", fake_pdf(1, 0)).await,
            Err(LoadError::InvalidFile(_))
        ));
        assert_eq!(h.loader.phase(), LoadPhase::Idle);

        let outcome = h.loader.open_local_file("book.pdf", fake_pdf(1, 0)).await.unwrap();
        assert_eq!(outcome.document().unwrap().name, "book.pdf");
    }

    #[tokio::test]
    async fn test_upload_then_load_by_reference() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve(routes::router(AppState::new(dir.path().to_path_buf()))).await;
        let base = format!("http://{}", addr);
        let h = build(
            Some(DocumentCache::in_memory(10).await.unwrap()),
            library_at(&base),
        );
        let stored_url = format!("{}/my_book.pdf", base);
        h.engine.host(&stored_url, fake_pdf(4, 0));

        let outcome = h
            .loader
            .upload_and_load("My Book.pdf", fake_pdf(4, 0))
            .await
            .unwrap();
        let document = outcome.document().unwrap();
        assert_eq!(document.name, "my_book.pdf");
        assert_eq!(document.reference.as_deref(), Some(stored_url.as_str()));
        assert!(dir.path().join("my_book.pdf").exists());

        let link = h.loader.share_link(PAGE).unwrap();
        assert!(matches!(link, ShareLink::Reference { .. }));

        let recent = h.loader.recent_documents().await.unwrap();
        assert_eq!(recent[0].content, CacheContent::Reference(stored_url));
    }

    #[tokio::test]
    async fn test_upload_failure_is_reported() {
        let h = harness().await;

        let err = h.loader.upload_and_load("a.pdf", fake_pdf(1, 0)).await.unwrap_err();
        assert!(matches!(err, LoadError::Library(LibraryError::ServerUnavailable(_))));

        let events = h.observer.events();
        assert!(events.contains(&"failed: Upload failed".to_string()));
        assert!(events.contains(&"notice Error: Could not upload PDF. Server offline?".to_string()));
        assert_eq!(h.loader.phase(), LoadPhase::Idle);
    }

    #[tokio::test]
    async fn test_rejected_upload_is_reported_apart_from_offline() {
        let app = Router::new().route(
            "/upload",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(UploadResponse::rejected("No file uploaded")),
                )
            }),
        );
        let base = format!("http://{}", serve(app).await);
        let h = build(None, library_at(&base));

        let err = h.loader.upload_and_load("a.pdf", fake_pdf(1, 0)).await.unwrap_err();
        assert!(matches!(err, LoadError::Library(LibraryError::UploadRejected(_))));

        let events = h.observer.events();
        assert!(events.contains(&"notice Error: Could not upload PDF. Please try again.".to_string()));
        assert!(!events.iter().any(|e| e.contains("Server offline?")));
    }

    #[tokio::test]
    async fn test_library_entry_opens_by_reference() {
        let h = harness().await;
        let entry = LibraryEntry {
            name: "guide.pdf".to_string(),
            url: "http://localhost:3000/guide.pdf".to_string(),
            timestamp: 0,
        };
        h.engine.host(&entry.url, fake_pdf(2, 0));

        h.loader.open_library_entry(&entry).await.unwrap();
        let recent = h.loader.recent_documents().await.unwrap();
        assert_eq!(recent[0].content, CacheContent::Reference(entry.url.clone()));

        assert!(h.loader.library_files().await.is_err());
    }

    #[tokio::test]
    async fn test_startup_parameters() {
        let h = harness().await;
        h.engine.host("https://example.com/guide.pdf", fake_pdf(2, 0));

        let outcome = h
            .loader
            .handle_url_params("?file=https%3A%2F%2Fexample.com%2Fguide.pdf")
            .await
            .unwrap();
        match outcome {
            StartupOutcome::Opened(LoadOutcome::Ready(document)) => {
                assert_eq!(document.name, "guide.pdf");
            }
            other => panic!("unexpected startup outcome: {:?}", other),
        }

        let embedded = encode_embedded(&fake_pdf(1, 0));
        let query = format!("?pdf={}", urlencoding::encode(&embedded));
        let outcome = h.loader.handle_url_params(&query).await.unwrap();
        match outcome {
            StartupOutcome::Opened(LoadOutcome::Ready(document)) => {
                assert_eq!(document.embedded_content, Some(embedded));
            }
            other => panic!("unexpected startup outcome: {:?}", other),
        }

        assert_eq!(
            h.loader.handle_url_params("").await.unwrap(),
            StartupOutcome::PromptForSource
        );
        assert!(matches!(
            h.loader.handle_url_params("?pdf=!!!").await,
            Err(LoadError::InvalidEmbedded(_))
        ));
    }

    #[tokio::test]
    async fn test_pages_render_in_order_and_flip() {
        let h = harness().await;
        assert!(!h.loader.next_page());

        h.loader.load_document(inline("four.pdf", fake_pdf(4, 0))).await.unwrap();
        assert_eq!(h.engine.rendered(), vec![1, 2, 3, 4]);
        assert_eq!(h.views.created.lock()[0], vec![1, 2, 3, 4]);

        for _ in 0..5 {
            assert!(h.loader.next_page());
        }
        assert_eq!(*h.views.position.lock(), 3);
        assert!(h.loader.prev_page());
        assert_eq!(*h.views.position.lock(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let h = harness().await;
        h.loader.load_document(inline("a.pdf", fake_pdf(1, 0))).await.unwrap();

        h.loader.shutdown().await;

        assert_eq!(h.loader.phase(), LoadPhase::Idle);
        assert!(h.loader.current_document().is_none());
        assert_eq!(h.views.live(), 0);
        assert_eq!(h.tracker.live_count(), 0);
    }

    #[tokio::test]
    async fn test_stalled_save_never_outranks_document_on_screen() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let cache = DocumentCache::from_pool(pool.clone(), 10).await.unwrap();
        let h = build(Some(cache), library_at(OFFLINE));

        // Every save waits for the only connection
        let held = pool.acquire().await.unwrap();

        let first = tokio::spawn({
            let loader = Arc::clone(&h.loader);
            async move { loader.load_document(inline("A.pdf", fake_pdf(1, 0))).await }
        });
        wait_until_shown(&h.loader, "A.pdf").await;

        let second = tokio::spawn({
            let loader = Arc::clone(&h.loader);
            async move { loader.load_document(inline("B.pdf", fake_pdf(1, 0))).await }
        });
        wait_until_shown(&h.loader, "B.pdf").await;

        drop(held);
        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(first.document().unwrap().name, "A.pdf");
        assert_eq!(second.document().unwrap().name, "B.pdf");

        assert_eq!(h.loader.current_document().unwrap().name, "B.pdf");
        let recent = h.loader.recent_documents().await.unwrap();
        let names: Vec<&str> = recent.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["B.pdf", "A.pdf"]);
        assert_eq!(
            h.observer
                .events()
                .iter()
                .filter(|e| e.starts_with("notice Success"))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_superseded_load_with_stalled_storage_saves_nothing() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let cache = DocumentCache::from_pool(pool.clone(), 10).await.unwrap();
        let h = build(Some(cache), library_at(OFFLINE));
        let slow = "https://example.com/slow.pdf";
        h.engine.host(slow, fake_pdf(2, 0));
        let gate = h.engine.hold(slow);

        let held = pool.acquire().await.unwrap();

        let stale = tokio::spawn({
            let loader = Arc::clone(&h.loader);
            async move {
                loader
                    .load_document(LoadRequest::new(
                        "A.pdf",
                        DocumentSource::Reference(slow.to_string()),
                    ))
                    .await
            }
        });
        while !h.engine.opened().iter().any(|o| o == slow) {
            tokio::task::yield_now().await;
        }

        h.loader
            .load_document(inline("B.pdf", fake_pdf(1, 0)).persist(false))
            .await
            .unwrap();
        gate.notify_one();
        assert_eq!(stale.await.unwrap().unwrap(), LoadOutcome::Superseded);

        drop(held);
        assert!(h.loader.recent_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_configured_open_timeout_fails_load() {
        let settings = LoaderSettings {
            open_timeout_secs: Some(1),
            ..LoaderSettings::default()
        };
        let h = build_with_settings(None, library_at(OFFLINE), settings);
        let slow = "https://example.com/never.pdf";
        h.engine.host(slow, fake_pdf(1, 0));
        let _gate = h.engine.hold(slow);

        let err = h
            .loader
            .load_document(LoadRequest::new("never.pdf", DocumentSource::Reference(slow.to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Timeout(1)));
        assert_eq!(h.loader.phase(), LoadPhase::Failed);
    }

    #[tokio::test]
    async fn test_from_config_opens_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.cache.database_url = format!("sqlite:{}", dir.path().join("cache.db").display());
        let tracker = ResourceTracker::new();
        let engine = Arc::new(FakeEngine::new(tracker.clone()));

        let loader = DocumentLoader::from_config(&config, engine, Arc::new(FakeViews::default()), tracker)
            .await
            .unwrap();
        assert!(loader.cache().is_some());

        loader.load_document(inline("a.pdf", fake_pdf(1, 0))).await.unwrap();
        assert_eq!(loader.recent_documents().await.unwrap().len(), 1);
        loader.shutdown().await;
    }

    #[tokio::test]
    async fn test_from_config_without_storage_is_session_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.cache.database_url = format!(
            "sqlite:{}",
            dir.path().join("missing").join("cache.db").display()
        );
        let tracker = ResourceTracker::new();
        let engine = Arc::new(FakeEngine::new(tracker.clone()));

        let loader = DocumentLoader::from_config(&config, engine, Arc::new(FakeViews::default()), tracker)
            .await
            .unwrap();
        assert!(loader.cache().is_none());

        let outcome = loader.load_document(inline("a.pdf", fake_pdf(1, 0))).await.unwrap();
        assert!(outcome.document().is_some());
        assert!(loader.recent_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_settles_pending_cleanup() {
        let h = harness().await;
        for i in 0..12 {
            h.loader
                .load_document(inline(&format!("doc-{}.pdf", i), fake_pdf(1, 0)))
                .await
                .unwrap();
        }

        h.loader.shutdown().await;

        let cache = h.loader.cache().unwrap();
        assert_eq!(cache.len().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_clear_history() {
        let h = harness().await;
        for name in ["a.pdf", "b.pdf", "c.pdf", "d.pdf", "e.pdf"] {
            h.loader.load_document(inline(name, fake_pdf(1, 0))).await.unwrap();
        }
        assert_eq!(h.loader.recent_documents().await.unwrap().len(), 5);

        h.loader.clear_history().await.unwrap();
        assert!(h.loader.recent_documents().await.unwrap().is_empty());
        assert!(h.observer.events().contains(&"notice Info: History cleared".to_string()));
    }
}
