//! Read-only crawl progress and the periodic reporter
//!
//! Nothing here influences the crawl; it only observes the queue and the
//! output directory.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::{error_log::ERROR_LOG_FILE, frontier::WorkQueue};

/// Point-in-time view of a running crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub queue_depth: usize,
    pub artifact_count: usize,
    pub elapsed: Duration,
}

/// Handle for querying a crawl's progress
#[derive(Debug, Clone)]
pub struct CrawlProgress {
    queue: Arc<WorkQueue>,
    output_dir: PathBuf,
    started: Instant,
}

impl CrawlProgress {
    pub(crate) fn new(queue: Arc<WorkQueue>, output_dir: PathBuf, started: Instant) -> Self {
        Self {
            queue,
            output_dir,
            started,
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Number of files saved so far, found by walking the output directory
    ///
    /// Blocking; the error log itself is not counted.
    pub fn artifact_count(&self) -> usize {
        count_artifacts(&self.output_dir)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Blocking snapshot of all three figures
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            queue_depth: self.queue_depth(),
            artifact_count: self.artifact_count(),
            elapsed: self.elapsed(),
        }
    }
}

fn count_artifacts(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && entry.file_name() != ERROR_LOG_FILE)
        .count()
}

/// Periodically logs queue depth, saved artifacts and elapsed time
pub struct ProgressReporter {
    progress: CrawlProgress,
    interval: Duration,
}

impl ProgressReporter {
    pub fn new(progress: CrawlProgress, interval: Duration) -> Self {
        Self { progress, interval }
    }

    /// Report every interval until `token` is cancelled
    ///
    /// Returns the number of reports emitted.
    pub async fn run(self, token: CancellationToken) -> usize {
        let mut reports = 0;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            let progress = self.progress.clone();
            let snapshot = match tokio::task::spawn_blocking(move || progress.snapshot()).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!(error = %e, "progress snapshot failed");
                    continue;
                }
            };

            tracing::info!(
                queue = snapshot.queue_depth,
                saved = snapshot.artifact_count,
                elapsed_secs = snapshot.elapsed.as_secs(),
                "The queue currently has {} items, {} files saved so far",
                snapshot.queue_depth,
                snapshot.artifact_count
            );
            reports += 1;
        }

        reports
    }
}
