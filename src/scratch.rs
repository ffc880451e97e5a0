//! Scratch directory for intermediate artifacts.
//!
//! One directory belongs to one session. Paths handed out by
//! [`ScratchDir::create`] are unique but not created; the caller writes them.
//! Two sessions must never share a directory: cleanup removes every file in
//! it, not just the ones this session allocated.

use crate::error::{PipelineError, PipelineResult};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug)]
pub struct ScratchDir {
    dir: PathBuf,
}

impl ScratchDir {
    pub fn open(dir: impl Into<PathBuf>) -> PipelineResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        Ok(Self { dir })
    }

    /// Opens `dir`, runs `f`, then empties `dir` whether `f` failed or not.
    ///
    /// An error from `f` takes precedence over a cleanup error.
    pub fn scoped<T>(
        dir: impl Into<PathBuf>,
        f: impl FnOnce(&ScratchDir) -> PipelineResult<T>,
    ) -> PipelineResult<T> {
        let scratch = Self::open(dir)?;
        let result = f(&scratch);
        let cleanup = scratch.cleanup_all();
        match (result, cleanup) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup_err)) => {
                warn!(error = %cleanup_err, "scratch cleanup failed after pipeline error");
                Err(e)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// A fresh path with extension `ext` (with or without the leading dot).
    pub fn create(&self, ext: &str) -> PathBuf {
        let ext = ext.trim_start_matches('.');
        let name = if ext.is_empty() {
            Uuid::new_v4().simple().to_string()
        } else {
            format!("{}.{ext}", Uuid::new_v4().simple())
        };
        self.dir.join(name)
    }

    /// Whether a file at `path` would sit directly in this directory, and so
    /// be removed by [`ScratchDir::cleanup_all`].
    pub fn holds(&self, path: &Path) -> bool {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        resolved(parent) == resolved(&self.dir)
    }

    pub fn file_count(&self) -> PipelineResult<usize> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| PipelineError::io(&self.dir, e))?;
        let mut count = 0;
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::io(&self.dir, e))?;
            if entry.path().is_file() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Removes every file currently in the directory.
    pub fn cleanup_all(&self) -> PipelineResult<()> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(PipelineError::io(&self.dir, e)),
        };
        let mut removed = 0usize;
        for entry in entries {
            let path = entry.map_err(|e| PipelineError::io(&self.dir, e))?.path();
            if path.is_file() {
                std::fs::remove_file(&path).map_err(|e| PipelineError::io(&path, e))?;
                removed += 1;
            }
        }
        debug!(dir = %self.dir.display(), removed, "scratch directory cleaned");
        Ok(())
    }
}

/// Canonical form when the path exists, else absolute with `.` removed.
fn resolved(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
