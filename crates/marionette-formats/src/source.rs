//! File-content source boundary
//!
//! The pipeline addresses every asset by a path string: either a canonical
//! game-relative path or a rooted filesystem path (modded assets redirected
//! onto disk). A [`FileSource`] turns such a path into raw bytes or a typed
//! failure; where the bytes actually come from (archive, loose files, a live
//! process) is the host's business.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors produced by a file source
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Path not found: {path}")]
    NotFound { path: String },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The source cannot serve this path shape at all (e.g. a rooted path
    /// handed to an archive-only source)
    #[error("Unsupported path: {path}")]
    Unsupported { path: String },
}

/// Result type for source reads
pub type SourceResult<T> = Result<T, SourceError>;

/// Path-keyed loader returning raw file contents
pub trait FileSource: Send + Sync {
    /// Read the full contents at `path`
    fn read(&self, path: &str) -> SourceResult<Vec<u8>>;

    /// Whether `path` can currently be served
    fn exists(&self, path: &str) -> bool {
        self.read(path).is_ok()
    }
}

/// Source backed by the local filesystem.
///
/// Rooted paths are read as-is; game-relative paths are resolved against the
/// configured root directory.
pub struct DiskSource {
    root: PathBuf,
}

impl DiskSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl FileSource for DiskSource {
    fn read(&self, path: &str) -> SourceResult<Vec<u8>> {
        let resolved = self.resolve(path);
        std::fs::read(&resolved).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SourceError::NotFound {
                    path: path.to_string(),
                }
            } else {
                SourceError::Io {
                    path: path.to_string(),
                    source: e,
                }
            }
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }
}
