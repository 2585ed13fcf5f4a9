//! Scoped temporary files for captured artifacts
//!
//! A [`ScratchFile`] names a path in the scratch directory and removes whatever
//! is there when dropped. Removal failures are logged, never raised, so the
//! error that caused an early exit is the one the caller sees.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// RAII wrapper for a capture file path
///
/// The file itself is written by the browser; this guard only owns its
/// removal.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    cleanup_on_drop: bool,
}

impl ScratchFile {
    /// Reserve a unique path `<dir>/export-<uuid>.<extension>`
    ///
    /// Nothing is created on disk. `dir` must already exist.
    pub fn reserve(dir: &Path, extension: &str) -> Self {
        let path = dir.join(format!("export-{}.{extension}", Uuid::new_v4()));
        debug!("Reserved scratch path {}", path.display());
        Self::adopt(path)
    }

    /// Take over cleanup of an existing path
    pub fn adopt(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cleanup_on_drop: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now. Returns whether anything was removed.
    pub fn remove(mut self) -> bool {
        self.cleanup_on_drop = false;
        remove_if_present(&self.path)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.cleanup_on_drop {
            remove_if_present(&self.path);
        }
    }
}

/// Delete `path` if it exists, logging (not returning) failures
pub fn remove_if_present(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed scratch file {}", path.display());
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to remove scratch file {}: {}", path.display(), e);
            false
        }
    }
}
