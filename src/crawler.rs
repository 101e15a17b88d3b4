//! Concurrent site mirroring engine
//!
//! This module provides the crawl loop that ties the other pieces together:
//! - **Bounded worker pool**: `workers` tasks pull from one shared queue, with
//!   a separate permit budget bounding simultaneous fetches
//! - **At-most-once scheduling**: every discovered URL is canonicalized and
//!   claimed in the dedup set before it can be queued
//! - **Exact completion detection**: pending/in-flight accounting, checked by
//!   a monitor task that raises the shared cancellation token
//! - **Graceful cancellation**: callers can stop a crawl early with their own
//!   token; in-flight fetches finish, nothing new is dequeued
//! - **Observability**: observers and live statistics
//!
//! # Examples
//!
//! ## Basic Usage
//!
//! ```ignore
//! use sitemirror::Crawler;
//!
//! let crawler = Crawler::builder()
//!     .workers(8)
//!     .fetch_concurrency(4)
//!     .build()?;
//!
//! let stats = crawler.crawl("https://books.toscrape.com/", "ScrapedSite").await?;
//! println!("Saved {} files in {:?}", stats.artifacts_saved, stats.elapsed());
//! ```
//!
//! ## With Cancellation
//!
//! ```ignore
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel_token = CancellationToken::new();
//! let token_clone = cancel_token.clone();
//!
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     token_clone.cancel();
//! });
//!
//! let stats = crawler
//!     .crawl_with_cancellation("https://example.com/", "mirror", cancel_token)
//!     .await?;
//! ```

use std::{
    panic::AssertUnwindSafe,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::{
    sync::{Notify, Semaphore, watch},
    task::JoinSet,
    time::sleep,
};
use tokio_util::sync::CancellationToken;

use crate::{
    canonical::{CanonicalUrl, ResourceKind, ScopePolicy, canonicalize, resolve, to_save_path},
    error::MirrorError,
    error_log::{ErrorSink, FileErrorLog},
    extract::extract_references_from_bytes,
    fetch::{FetchedResource, Fetcher, HttpFetcher},
    frontier::{DedupSet, WorkQueue},
    progress::{CrawlProgress, ProgressReporter},
    seed::prepare_output_dir,
};

/// Result of mirroring one URL
#[derive(Debug, Clone)]
pub struct VisitResult {
    /// The URL that was fetched
    pub visited_url: CanonicalUrl,
    /// Where the body was written
    pub saved_to: PathBuf,
    /// In-scope URLs referenced by the body, canonicalized, not yet deduplicated
    pub discovered_urls: Vec<CanonicalUrl>,
}

impl VisitResult {
    pub fn new(
        visited_url: CanonicalUrl,
        saved_to: PathBuf,
        discovered_urls: Vec<CanonicalUrl>,
    ) -> Self {
        Self {
            visited_url,
            saved_to,
            discovered_urls,
        }
    }

    /// A visit that discovered nothing (images, non-HTML documents)
    pub fn leaf(visited_url: CanonicalUrl, saved_to: PathBuf) -> Self {
        Self::new(visited_url, saved_to, Vec::new())
    }
}

/// Errors that can occur during crawler configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Worker count must be greater than 0
    #[error("Worker count must be greater than 0, got {0}")]
    InvalidWorkers(usize),

    /// Fetch concurrency must be greater than 0
    #[error("Fetch concurrency must be greater than 0, got {0}")]
    InvalidFetchConcurrency(usize),

    /// The monitor's poll interval must be non-zero
    #[error("Poll interval must be greater than 0, got {0:?}")]
    InvalidPollInterval(Duration),

    /// The progress interval, when set, must be non-zero
    #[error("Progress interval must be greater than 0, got {0:?}")]
    InvalidProgressInterval(Duration),

    /// The default HTTP client could not be built
    #[error("Could not build HTTP client: {0}")]
    HttpClient(String),
}

/// Detects when crawling is complete by tracking pending work
///
/// Every queued URL counts as pending until the worker that processed it has
/// queued its children and called [`url_completed`](Self::url_completed).
/// Children are therefore always counted before their parent is released,
/// and `pending == 0` can only be observed once nothing is queued or in
/// flight.
#[derive(Clone)]
pub struct CompletionDetector {
    pub(crate) pending_urls: Arc<AtomicUsize>,
    pub(crate) active_workers: Arc<AtomicUsize>,
    completed: Arc<AtomicBool>,
    completion_notify: Arc<Notify>,
}

impl CompletionDetector {
    /// Create a new CompletionDetector
    pub fn new() -> Self {
        Self {
            pending_urls: Arc::new(AtomicUsize::new(0)),
            active_workers: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicBool::new(false)),
            completion_notify: Arc::new(Notify::new()),
        }
    }

    /// Increment pending URL count when a URL is queued
    pub fn url_queued(&self) {
        // SeqCst: must be visible before the URL can be dequeued and completed.
        self.pending_urls.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement pending URL count when a URL's cycle is over
    pub fn url_completed(&self) {
        let remaining = self.pending_urls.fetch_sub(1, Ordering::SeqCst);
        if remaining == 1 {
            self.check_completion();
        }
    }

    /// Mark a fetch worker as busy with one URL
    pub fn fetch_started(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    /// Mark a fetch worker as idle again and check for completion
    pub fn fetch_finished(&self) {
        let remaining = self.active_workers.fetch_sub(1, Ordering::SeqCst);
        if remaining == 1 {
            self.check_completion();
        }
    }

    /// Whether nothing is pending and no worker is mid-fetch
    pub fn is_quiescent(&self) -> bool {
        self.pending_urls.load(Ordering::SeqCst) == 0
            && self.active_workers.load(Ordering::SeqCst) == 0
    }

    fn check_completion(&self) {
        if self.is_quiescent() {
            self.completed.store(true, Ordering::SeqCst);
            self.completion_notify.notify_waiters();
        }
    }

    /// Wait for crawl completion
    ///
    /// Returns immediately if completion was already signalled.
    pub async fn wait_for_completion(&self) {
        loop {
            let notified = self.completion_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.completed.load(Ordering::SeqCst) {
                return;
            }

            notified.await;
        }
    }

    /// Get the current pending URL count
    pub fn pending_count(&self) -> usize {
        self.pending_urls.load(Ordering::SeqCst)
    }

    /// Get the current active worker count
    pub fn active_count(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }
}

impl Default for CompletionDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Background task that decides when the crawl is over
///
/// After an initial grace period it re-checks quiescence every poll interval,
/// or sooner when the [`CompletionDetector`] signals. Once the queue is empty
/// and nothing is pending it cancels the crawl token, which stops every worker
/// and the progress reporter.
pub struct CompletionMonitor {
    queue: Arc<WorkQueue>,
    completion: CompletionDetector,
    grace_period: Duration,
    poll_interval: Duration,
}

impl CompletionMonitor {
    pub fn new(
        queue: Arc<WorkQueue>,
        completion: CompletionDetector,
        grace_period: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            completion,
            grace_period,
            poll_interval,
        }
    }

    fn is_done(&self) -> bool {
        self.queue.is_empty() && self.completion.is_quiescent()
    }

    /// Run until quiescence or until `token` is cancelled by someone else
    ///
    /// Returns `true` if this monitor raised the signal.
    pub async fn run(self, token: CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = token.cancelled() => return false,
            _ = sleep(self.grace_period) => {}
        }

        loop {
            if self.is_done() {
                tracing::info!("crawl quiesced, signalling workers to stop");
                token.cancel();
                return true;
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => return false,
                _ = self.completion.wait_for_completion() => {}
                _ = sleep(self.poll_interval) => {}
            }
        }
    }
}

/// Observer trait for receiving crawl events
///
/// Implement this trait to monitor crawl progress, collect custom metrics,
/// or implement custom logging strategies.
///
/// # Example
///
/// ```ignore
/// use sitemirror::{CrawlObserver, VisitResult};
///
/// struct LoggingObserver;
///
/// #[async_trait::async_trait]
/// impl CrawlObserver for LoggingObserver {
///     async fn on_url_visited(&self, result: &VisitResult) {
///         println!("Saved {} to {}", result.visited_url, result.saved_to.display());
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait CrawlObserver: Send + Sync {
    /// Called once before the seed is queued, with a read-only progress handle
    async fn on_crawl_started(&self, _progress: &CrawlProgress) {}

    /// Called when a URL is claimed and queued
    async fn on_url_queued(&self, _url: &CanonicalUrl) {}

    /// Called when a URL has been fetched and saved
    async fn on_url_visited(&self, _result: &VisitResult) {}

    /// Called when a URL is abandoned
    async fn on_fetch_error(&self, _url: &CanonicalUrl, _error: &MirrorError) {}

    /// Called when the crawl completes
    async fn on_crawl_complete(&self, _stats: &CrawlStats) {}
}

/// Registry for managing multiple crawl observers
pub struct ObserverRegistry {
    observers: Vec<Arc<dyn CrawlObserver>>,
}

impl ObserverRegistry {
    /// Create a new empty ObserverRegistry
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    /// Register an observer to receive crawl events
    pub fn register(&mut self, observer: Arc<dyn CrawlObserver>) {
        self.observers.push(observer);
    }

    pub async fn notify_crawl_started(&self, progress: &CrawlProgress) {
        for observer in &self.observers {
            observer.on_crawl_started(progress).await;
        }
    }

    pub async fn notify_url_queued(&self, url: &CanonicalUrl) {
        for observer in &self.observers {
            observer.on_url_queued(url).await;
        }
    }

    pub async fn notify_url_visited(&self, result: &VisitResult) {
        for observer in &self.observers {
            observer.on_url_visited(result).await;
        }
    }

    pub async fn notify_fetch_error(&self, url: &CanonicalUrl, error: &MirrorError) {
        for observer in &self.observers {
            observer.on_fetch_error(url, error).await;
        }
    }

    pub async fn notify_crawl_complete(&self, stats: &CrawlStats) {
        for observer in &self.observers {
            observer.on_crawl_complete(stats).await;
        }
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Configuration defaults
const DEFAULT_WORKERS: usize = 5;
const DEFAULT_FETCH_CONCURRENCY: usize = 5;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Statistics collected during crawling with timestamps
#[derive(Debug, Clone)]
pub struct CrawlStats {
    /// Number of URLs fetched successfully, whether or not saving succeeded
    pub urls_visited: usize,
    /// Number of files written to the mirror
    pub artifacts_saved: usize,
    /// Number of distinct URLs claimed, seed included
    pub urls_discovered: usize,
    /// Number of URLs abandoned because of an error
    pub errors_encountered: usize,
    /// When the crawl started
    pub start_time: Instant,
    /// When these stats were last updated
    pub last_update: Instant,
}

impl CrawlStats {
    /// Create new CrawlStats with current timestamp
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            urls_visited: 0,
            artifacts_saved: 0,
            urls_discovered: 0,
            errors_encountered: 0,
            start_time: now,
            last_update: now,
        }
    }

    /// Get elapsed time since crawl started
    pub fn elapsed(&self) -> Duration {
        self.last_update.duration_since(self.start_time)
    }

    /// Calculate URLs visited per second
    pub fn urls_per_second(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.urls_visited as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl Default for CrawlStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe statistics tracker with real-time broadcasting
///
/// One tracker lives for the whole `Crawler`; [`reset`](Self::reset) starts
/// a fresh run at the beginning of every crawl.
pub struct StatsTracker {
    urls_visited: AtomicUsize,
    artifacts_saved: AtomicUsize,
    urls_discovered: AtomicUsize,
    errors_encountered: AtomicUsize,
    start_time: Mutex<Instant>,
    tx: Mutex<Option<watch::Sender<CrawlStats>>>,
    rx: Mutex<watch::Receiver<CrawlStats>>,
}

impl StatsTracker {
    /// Create a new StatsTracker
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(CrawlStats::new());
        Self {
            urls_visited: AtomicUsize::new(0),
            artifacts_saved: AtomicUsize::new(0),
            urls_discovered: AtomicUsize::new(0),
            errors_encountered: AtomicUsize::new(0),
            start_time: Mutex::new(Instant::now()),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
        }
    }

    /// Subscribe to statistics updates
    pub fn subscribe(&self) -> watch::Receiver<CrawlStats> {
        self.rx.lock().clone()
    }

    /// Zero every counter and restart the clock at `start_time`
    ///
    /// Reopens the channel if a previous run closed it; receivers taken
    /// before that close stay closed.
    pub fn reset(&self, start_time: Instant) {
        let mut tx = self.tx.lock();
        self.urls_visited.store(0, Ordering::Relaxed);
        self.artifacts_saved.store(0, Ordering::Relaxed);
        self.urls_discovered.store(0, Ordering::Relaxed);
        self.errors_encountered.store(0, Ordering::Relaxed);
        *self.start_time.lock() = start_time;

        let stats = self.snapshot();
        match tx.as_ref() {
            Some(sender) => {
                sender.send_replace(stats);
            }
            None => {
                let (sender, receiver) = watch::channel(stats);
                *tx = Some(sender);
                *self.rx.lock() = receiver;
            }
        }
    }

    // Relaxed throughout: statistics never drive control flow.

    /// Record a fetched URL
    pub fn url_visited(&self) {
        self.urls_visited.fetch_add(1, Ordering::Relaxed);
        self.broadcast();
    }

    /// Record a file written to the mirror
    pub fn artifact_saved(&self) {
        self.artifacts_saved.fetch_add(1, Ordering::Relaxed);
        self.broadcast();
    }

    /// Record a newly claimed URL
    pub fn url_discovered(&self) {
        self.urls_discovered.fetch_add(1, Ordering::Relaxed);
        self.broadcast();
    }

    /// Record an abandoned URL
    pub fn error_encountered(&self) {
        self.errors_encountered.fetch_add(1, Ordering::Relaxed);
        self.broadcast();
    }

    fn broadcast(&self) {
        // Snapshot under the lock so the last value sent is never stale.
        let tx = self.tx.lock();
        if let Some(tx) = tx.as_ref() {
            tx.send_replace(self.snapshot());
        }
    }

    /// Get a snapshot of current statistics
    pub fn snapshot(&self) -> CrawlStats {
        CrawlStats {
            urls_visited: self.urls_visited.load(Ordering::Relaxed),
            artifacts_saved: self.artifacts_saved.load(Ordering::Relaxed),
            urls_discovered: self.urls_discovered.load(Ordering::Relaxed),
            errors_encountered: self.errors_encountered.load(Ordering::Relaxed),
            start_time: *self.start_time.lock(),
            last_update: Instant::now(),
        }
    }

    /// Close the statistics sender to signal completion to subscribers
    pub fn close(&self) {
        self.tx.lock().take();
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Validated configuration for the crawler
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub(crate) workers: usize,
    pub(crate) fetch_concurrency: usize,
    pub(crate) grace_period: Duration,
    pub(crate) poll_interval: Duration,
    pub(crate) scope: ScopePolicy,
    pub(crate) progress_interval: Option<Duration>,
    pub(crate) request_timeout: Option<Duration>,
}

impl CrawlerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidWorkers(0));
        }
        if self.fetch_concurrency == 0 {
            return Err(ConfigError::InvalidFetchConcurrency(0));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidPollInterval(self.poll_interval));
        }
        if let Some(interval) = self.progress_interval
            && interval.is_zero()
        {
            return Err(ConfigError::InvalidProgressInterval(interval));
        }
        Ok(())
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn fetch_concurrency(&self) -> usize {
        self.fetch_concurrency
    }

    pub fn scope(&self) -> ScopePolicy {
        self.scope
    }
}

/// State shared by every worker of one crawl
struct CrawlContext {
    seed: CanonicalUrl,
    output_dir: PathBuf,
    scope: ScopePolicy,
    queue: Arc<WorkQueue>,
    dedup: DedupSet,
    fetch_slots: Semaphore,
    completion: CompletionDetector,
    stats: Arc<StatsTracker>,
    observers: Arc<ObserverRegistry>,
    fetcher: Arc<dyn Fetcher>,
    error_sink: Arc<dyn ErrorSink>,
}

impl CrawlContext {
    /// Claim `url` and queue it if nobody has before
    async fn submit(&self, url: CanonicalUrl) -> bool {
        if !self.dedup.try_claim(&url) {
            return false;
        }

        // Count it before any worker can see it.
        self.completion.url_queued();
        self.stats.url_discovered();
        self.observers.notify_url_queued(&url).await;
        tracing::debug!(url = %url, "queued");
        self.queue.enqueue(url);
        true
    }

    /// Fetch, save and scan one URL
    async fn visit(&self, url: &CanonicalUrl) -> Result<VisitResult, MirrorError> {
        let kind = ResourceKind::classify(url);
        let resource = self.fetcher.fetch(url).await?;
        self.stats.url_visited();

        let save_path = to_save_path(&self.output_dir, url.path());
        persist(&save_path, &resource.body).await?;
        self.stats.artifact_saved();

        match kind {
            ResourceKind::Document if resource.is_html() => {
                let discovered = self.discover(&resource);
                Ok(VisitResult::new(url.clone(), save_path, discovered))
            }
            _ => Ok(VisitResult::leaf(url.clone(), save_path)),
        }
    }

    /// In-scope canonical URLs referenced by an HTML body
    fn discover(&self, resource: &FetchedResource) -> Vec<CanonicalUrl> {
        extract_references_from_bytes(&resource.body)
            .into_iter()
            .filter_map(|reference| {
                match resolve(&resource.final_url, &reference).and_then(|abs| canonicalize(&abs)) {
                    Ok(url) => Some(url),
                    Err(e) => {
                        tracing::debug!(reference = %reference, error = %e, "dropping reference");
                        None
                    }
                }
            })
            .filter(|url| self.scope.allows(&self.seed, url))
            .collect()
    }

    async fn record_failure(&self, url: &CanonicalUrl, error: &MirrorError) {
        tracing::warn!(url = %url, error = %error, "abandoning url");
        self.error_sink.log_failure(url.as_str(), &error.log_message());
        self.stats.error_encountered();
        self.observers.notify_fetch_error(url, error).await;
    }
}

async fn persist(path: &Path, body: &[u8]) -> Result<(), MirrorError> {
    let filesystem_failure = |source| MirrorError::FilesystemFailure {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(filesystem_failure)?;
    }
    tokio::fs::write(path, body)
        .await
        .map_err(filesystem_failure)
}

/// One fetch worker: acquire a slot, dequeue, visit, submit children, repeat
#[tracing::instrument(skip_all, fields(worker = id))]
async fn run_worker(id: usize, ctx: Arc<CrawlContext>, token: CancellationToken) {
    loop {
        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            permit = ctx.fetch_slots.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let url = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            url = ctx.queue.dequeue() => url,
        };

        ctx.completion.fetch_started();
        tracing::debug!(url = %url, "fetching");

        let outcome = AssertUnwindSafe(ctx.visit(&url)).catch_unwind().await;
        drop(permit);

        let discovered = match outcome {
            Ok(Ok(result)) => {
                ctx.observers.notify_url_visited(&result).await;
                result.discovered_urls
            }
            Ok(Err(error)) => {
                ctx.record_failure(&url, &error).await;
                Vec::new()
            }
            Err(_) => {
                let error = MirrorError::FetchFailure {
                    url: url.to_string(),
                    message: "worker panicked while processing".to_string(),
                };
                ctx.record_failure(&url, &error).await;
                Vec::new()
            }
        };

        for child in discovered {
            ctx.submit(child).await;
        }

        ctx.completion.fetch_finished();
        ctx.completion.url_completed();
    }

    tracing::debug!("worker stopped");
}

/// Website mirroring crawler
///
/// The crawler coordinates several concurrent tasks:
/// - Workers that fetch, save and scan pages
/// - A monitor that detects quiescence and stops the workers
/// - An optional progress reporter
///
/// Statistics cover the most recent crawl only; they are reset when the
/// next one starts.
pub struct Crawler {
    config: CrawlerConfig,
    fetcher: Arc<dyn Fetcher>,
    error_sink: Option<Arc<dyn ErrorSink>>,
    observers: Arc<ObserverRegistry>,
    stats: Arc<StatsTracker>,
}

impl Crawler {
    /// Create a new crawler with default settings
    pub fn new() -> Self {
        Self::builder()
            .build()
            .expect("Default configuration should be valid")
    }

    /// Create a crawler builder for custom configuration
    pub fn builder() -> CrawlerBuilder {
        CrawlerBuilder::default()
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// Get a snapshot of current crawl statistics
    pub fn stats(&self) -> CrawlStats {
        self.stats.snapshot()
    }

    /// Subscribe to real-time statistics updates
    pub fn subscribe_stats(&self) -> watch::Receiver<CrawlStats> {
        self.stats.subscribe()
    }

    /// Mirror everything reachable from `seed` into `output_dir`
    ///
    /// `output_dir` is deleted and recreated first. Returns once the crawl has
    /// quiesced and every worker has stopped. Only an unusable seed URL or an
    /// output directory that cannot be prepared is reported as an error;
    /// per-URL failures end up in the error log and the statistics.
    pub async fn crawl(
        &self,
        seed: &str,
        output_dir: impl AsRef<Path>,
    ) -> Result<CrawlStats, MirrorError> {
        self.crawl_internal(seed, output_dir.as_ref(), None).await
    }

    /// Mirror with cancellation support
    ///
    /// When `cancel_token` is signalled the workers stop dequeuing; fetches
    /// already in flight finish and are saved. The returned statistics reflect
    /// all completed work.
    pub async fn crawl_with_cancellation(
        &self,
        seed: &str,
        output_dir: impl AsRef<Path>,
        cancel_token: CancellationToken,
    ) -> Result<CrawlStats, MirrorError> {
        self.crawl_internal(seed, output_dir.as_ref(), Some(cancel_token))
            .await
    }

    async fn crawl_internal(
        &self,
        seed: &str,
        output_dir: &Path,
        cancel_token: Option<CancellationToken>,
    ) -> Result<CrawlStats, MirrorError> {
        let started = Instant::now();
        self.stats.reset(started);

        let seed = canonicalize(seed)?;
        let output_dir = prepare_output_dir(output_dir)?;
        let error_sink: Arc<dyn ErrorSink> = match &self.error_sink {
            Some(sink) => sink.clone(),
            None => Arc::new(FileErrorLog::in_dir(&output_dir)),
        };

        // The monitor cancels only this crawl's token, never the caller's.
        let token = cancel_token
            .map(|parent| parent.child_token())
            .unwrap_or_else(CancellationToken::new);

        let queue = Arc::new(WorkQueue::new());
        let completion = CompletionDetector::new();
        let ctx = Arc::new(CrawlContext {
            seed: seed.clone(),
            output_dir: output_dir.clone(),
            scope: self.config.scope,
            queue: queue.clone(),
            dedup: DedupSet::new(),
            fetch_slots: Semaphore::new(self.config.fetch_concurrency),
            completion: completion.clone(),
            stats: self.stats.clone(),
            observers: self.observers.clone(),
            fetcher: self.fetcher.clone(),
            error_sink,
        });

        let progress = CrawlProgress::new(queue.clone(), output_dir.clone(), started);
        self.observers.notify_crawl_started(&progress).await;

        tracing::info!(
            seed = %seed,
            output = %output_dir.display(),
            workers = self.config.workers,
            fetch_concurrency = self.config.fetch_concurrency,
            "starting crawl"
        );
        ctx.submit(seed).await;

        let monitor = CompletionMonitor::new(
            queue,
            completion,
            self.config.grace_period,
            self.config.poll_interval,
        );
        let monitor_handle = tokio::spawn(monitor.run(token.clone()));

        let reporter_handle = self.config.progress_interval.map(|interval| {
            tokio::spawn(ProgressReporter::new(progress, interval).run(token.clone()))
        });

        let mut workers = JoinSet::new();
        for id in 0..self.config.workers {
            workers.spawn(run_worker(id, ctx.clone(), token.clone()));
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "worker task failed");
            }
        }

        // Workers only stop once the token is cancelled, so both of these are
        // already on their way out.
        let quiesced = monitor_handle.await.unwrap_or(false);
        if let Some(handle) = reporter_handle {
            let _ = handle.await;
        }

        self.stats.close();
        let final_stats = self.stats.snapshot();

        if quiesced {
            tracing::info!(
                elapsed_secs = final_stats.elapsed().as_secs_f64(),
                saved = final_stats.artifacts_saved,
                failed = final_stats.errors_encountered,
                output = %output_dir.display(),
                "crawl finished"
            );
        } else {
            tracing::info!(
                pending = ctx.completion.pending_count(),
                saved = final_stats.artifacts_saved,
                "crawl cancelled before completion"
            );
        }

        self.observers.notify_crawl_complete(&final_stats).await;
        Ok(final_stats)
    }
}

impl Default for Crawler {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for configuring a Crawler
pub struct CrawlerBuilder {
    config: CrawlerConfig,
    fetcher: Option<Arc<dyn Fetcher>>,
    error_sink: Option<Arc<dyn ErrorSink>>,
    observers: Vec<Arc<dyn CrawlObserver>>,
}

impl Default for CrawlerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlerBuilder {
    /// Create a new CrawlerBuilder with default settings
    pub fn new() -> Self {
        Self {
            config: CrawlerConfig {
                workers: DEFAULT_WORKERS,
                fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
                grace_period: Duration::ZERO,
                poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
                scope: ScopePolicy::default(),
                progress_interval: None,
                request_timeout: None,
            },
            fetcher: None,
            error_sink: None,
            observers: Vec::new(),
        }
    }

    /// Set the number of worker tasks (default: 5)
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Set how many fetches may be in flight at once (default: 5)
    ///
    /// Independent of the worker count: extra workers wait for a slot.
    pub fn fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.config.fetch_concurrency = concurrency;
        self
    }

    /// Delay before the monitor first checks for completion (default: none)
    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.config.grace_period = grace_period;
        self
    }

    /// How often the monitor re-checks for completion (default: 1s)
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.config.poll_interval = poll_interval;
        self
    }

    /// Which discovered references to follow (default: same host)
    pub fn scope(mut self, scope: ScopePolicy) -> Self {
        self.config.scope = scope;
        self
    }

    /// Log a progress line every `interval` while crawling
    pub fn report_progress(mut self, interval: Duration) -> Self {
        self.config.progress_interval = Some(interval);
        self
    }

    /// Bound each request of the default HTTP fetcher (default: unbounded)
    ///
    /// Ignored when a custom fetcher is supplied.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Use a custom fetcher instead of the default HTTP client
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Send failures somewhere other than `<output>/errorLog.txt`
    pub fn error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    /// Register an observer to receive crawl events
    pub fn observe_with(mut self, observer: Arc<dyn CrawlObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Build the Crawler with the configured settings
    pub fn build(self) -> Result<Crawler, ConfigError> {
        self.config.validate()?;

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(
                HttpFetcher::with_timeout(self.config.request_timeout)
                    .map_err(|e| ConfigError::HttpClient(e.to_string()))?,
            ),
        };

        let mut registry = ObserverRegistry::new();
        for observer in self.observers {
            registry.register(observer);
        }

        Ok(Crawler {
            config: self.config,
            fetcher,
            error_sink: self.error_sink,
            observers: Arc::new(registry),
            stats: Arc::new(StatsTracker::new()),
        })
    }
}
