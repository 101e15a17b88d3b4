// Core modules
pub mod canonical;
pub mod crawler;
mod error;
pub mod error_log;
mod extract;
pub mod fetch;
mod frontier;
pub mod logging;
pub mod progress;
mod seed;

// Public exports
pub use canonical::{
    CanonicalUrl, ResourceKind, ScopePolicy, canonicalize, is_absolute, resolve, to_save_path,
};
pub use crawler::{
    CompletionDetector, CompletionMonitor, ConfigError, CrawlObserver, CrawlStats, Crawler,
    CrawlerBuilder, CrawlerConfig, ObserverRegistry, StatsTracker, VisitResult,
};
pub use error::MirrorError;
pub use error_log::{ERROR_LOG_FILE, ErrorSink, FileErrorLog, NullErrorSink, failure_line};
pub use extract::{extract_references, extract_references_from_bytes};
pub use fetch::{FetchedResource, Fetcher, HttpFetcher};
pub use frontier::{DedupSet, WorkQueue};
pub use progress::{CrawlProgress, ProgressReporter, ProgressSnapshot};
pub use seed::prepare_output_dir;
