//! Append-only failure log
//!
//! One line per failed URL:
//! `Could not fetch link <url>. Error message: <message>`

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;

/// File name of the failure log inside the output directory
pub const ERROR_LOG_FILE: &str = "errorLog.txt";

/// Destination for per-URL failure records
///
/// Implementations must be cheap and must never fail the caller: a sink that
/// cannot record a failure drops it.
pub trait ErrorSink: Send + Sync {
    fn log_failure(&self, url: &str, message: &str);
}

/// Format a failure the way it appears in the log
pub fn failure_line(url: &str, message: &str) -> String {
    format!("Could not fetch link {url}. Error message: {message}")
}

/// [`ErrorSink`] appending to a file, one writer at a time
#[derive(Debug)]
pub struct FileErrorLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Log at `<output_dir>/errorLog.txt`
    pub fn in_dir(output_dir: &Path) -> Self {
        Self::new(output_dir.join(ERROR_LOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let _guard = self.lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

impl ErrorSink for FileErrorLog {
    fn log_failure(&self, url: &str, message: &str) {
        if let Err(e) = self.append(&failure_line(url, message)) {
            tracing::warn!(path = %self.path.display(), error = %e, "could not write error log");
        }
    }
}

/// [`ErrorSink`] that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullErrorSink;

impl ErrorSink for NullErrorSink {
    fn log_failure(&self, _url: &str, _message: &str) {}
}
