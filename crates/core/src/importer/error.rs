//! Error types for the importer module.

use std::path::PathBuf;
use thiserror::Error;

use crate::library::LibraryError;

/// Errors that can occur while importing files into the library.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Filesystem failure (hashing, linking, copying, listing).
    #[error("I/O error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The library rejected a lookup or write.
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),
}

impl ImportError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
