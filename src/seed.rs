//! Output directory preparation

use std::path::{Path, PathBuf};

use crate::error::MirrorError;

/// Delete `output_dir` if it exists and recreate it empty
///
/// Returns the absolute path of the directory. Any failure is a
/// [`MirrorError::StartupFailure`]: the crawl must not start on top of a
/// directory it could not clear.
pub fn prepare_output_dir(output_dir: &Path) -> Result<PathBuf, MirrorError> {
    let startup_failure = |source| MirrorError::StartupFailure {
        path: output_dir.to_path_buf(),
        source,
    };

    let output_dir = std::path::absolute(output_dir).map_err(startup_failure)?;

    if output_dir.exists() {
        tracing::info!(path = %output_dir.display(), "removing previous mirror");
        std::fs::remove_dir_all(&output_dir).map_err(startup_failure)?;
    }
    std::fs::create_dir_all(&output_dir).map_err(startup_failure)?;

    Ok(output_dir)
}
