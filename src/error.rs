//! Error types for mirroring operations
//!
//! Per-item errors (`MalformedUrl`, `FetchFailure`, `FilesystemFailure`) are
//! contained by the worker that hit them: the offending reference or URL is
//! dropped and the crawl moves on. Only `StartupFailure` ever reaches the
//! caller of [`Crawler::crawl`](crate::Crawler::crawl).

use std::path::PathBuf;

/// Errors that can occur while mirroring a site
///
/// # Examples
///
/// ```ignore
/// use sitemirror::{canonicalize, MirrorError};
///
/// match canonicalize("/relative/only") {
///     Ok(url) => println!("canonical: {url}"),
///     Err(MirrorError::MalformedUrl { url, reason }) => {
///         eprintln!("dropping '{url}': {reason}");
///     }
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// A URL or reference could not be parsed, resolved or canonicalized
    ///
    /// Only the offending reference is dropped, never the page it came from.
    #[error("Malformed URL '{url}': {reason}")]
    MalformedUrl { url: String, reason: String },

    /// The resource could not be fetched
    ///
    /// Covers transport errors and non-success HTTP statuses alike. The item is
    /// abandoned and never retried.
    #[error("Could not fetch link {url}. Error message: {message}")]
    FetchFailure { url: String, message: String },

    /// A directory could not be created or a file could not be written
    #[error("Filesystem failure at '{}': {source}", path.display())]
    FilesystemFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The output directory could not be prepared before the crawl started
    #[error("Could not prepare output directory '{}': {source}", path.display())]
    StartupFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MirrorError {
    pub(crate) fn malformed(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// The message recorded in the error log for this failure
    pub fn log_message(&self) -> String {
        match self {
            Self::FetchFailure { message, .. } => message.clone(),
            Self::MalformedUrl { reason, .. } => reason.clone(),
            Self::FilesystemFailure { source, .. } | Self::StartupFailure { source, .. } => {
                source.to_string()
            }
        }
    }
}
