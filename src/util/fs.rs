//! Filesystem utilities.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::util::hash;

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Write a string to a file, creating parent directories if needed.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, contents)
        .with_context(|| format!("failed to write file: {}", path.display()))
}

/// Write `contents` unless the file already holds exactly that. Returns
/// whether the file was written.
///
/// An untouched file keeps its timestamp, so the build executor does not
/// see a regeneration that changed nothing.
pub fn write_if_changed(path: &Path, contents: &str) -> Result<bool> {
    if path.is_file() && hash::sha256_file(path)? == hash::sha256_str(contents) {
        tracing::debug!("{} is up to date", path.display());
        return Ok(false);
    }
    write_string(path, contents)?;
    Ok(true)
}

/// Get the relative path from `base` to `path`.
pub fn relative_path(base: &Path, path: &Path) -> PathBuf {
    pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf())
}
