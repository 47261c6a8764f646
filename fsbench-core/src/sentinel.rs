//! Filesystem sentinels.
//!
//! A sentinel is a path whose existence is the signal. One side creates it,
//! the other side polls for it; whatever is written inside is informational.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::ServerError;

/// Note written into the exit sentinel. Only its presence matters.
pub const EXIT_NOTE: &str = "Apparate";

/// An existence-only cross-process signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinel {
    path: PathBuf,
}

impl Sentinel {
    /// Wrap a path. Nothing is touched on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path being watched.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the signal has been raised.
    pub fn is_present(&self) -> bool {
        fs::symlink_metadata(&self.path).is_ok()
    }

    /// Remove a stale signal. Missing paths are fine; directories left by
    /// earlier tooling are removed recursively.
    pub fn clear(&self) -> Result<(), ServerError> {
        let result = match fs::symlink_metadata(&self.path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&self.path),
            Ok(_) => fs::remove_file(&self.path),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ServerError::Sentinel {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    /// Raise the signal, writing `note` as its content.
    ///
    /// The note is written to a hidden sibling and renamed into place, so a
    /// watcher never sees the sentinel without its content.
    pub fn raise(&self, note: &str) -> Result<(), ServerError> {
        let written = match self.path.file_name() {
            Some(name) => {
                let staging = self
                    .path
                    .with_file_name(format!(".{}.tmp", name.to_string_lossy()));
                fs::write(&staging, note).and_then(|()| fs::rename(&staging, &self.path))
            }
            None => fs::write(&self.path, note),
        };
        written.map_err(|e| ServerError::Sentinel {
            path: self.path.clone(),
            source: e,
        })?;
        tracing::debug!(path = %self.path.display(), "Sentinel raised");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_raise_and_clear() {
        let dir = TempDir::new().unwrap();
        let sentinel = Sentinel::new(dir.path().join("exit"));

        assert!(!sentinel.is_present());
        sentinel.raise(EXIT_NOTE).unwrap();
        assert!(sentinel.is_present());
        sentinel.clear().unwrap();
        assert!(!sentinel.is_present());
    }

    #[test]
    fn test_clear_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        let sentinel = Sentinel::new(dir.path().join("never-created"));
        assert!(sentinel.clear().is_ok());
    }

    #[test]
    fn test_clear_removes_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ready");
        std::fs::create_dir_all(path.join("nested")).unwrap();

        let sentinel = Sentinel::new(&path);
        assert!(sentinel.is_present());
        sentinel.clear().unwrap();
        assert!(!sentinel.is_present());
    }

    #[test]
    fn test_content_is_not_authoritative() {
        let dir = TempDir::new().unwrap();
        let sentinel = Sentinel::new(dir.path().join("ready"));
        std::fs::write(sentinel.path(), "").unwrap();
        assert!(sentinel.is_present());
    }

    #[test]
    fn test_raise_in_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let sentinel = Sentinel::new(dir.path().join("no/such/dir/exit"));
        assert!(matches!(
            sentinel.raise(EXIT_NOTE),
            Err(ServerError::Sentinel { .. })
        ));
    }
}
