//! Buffer errors

use std::path::{Path, PathBuf};

/// Result type for buffer operations
pub type Result<T> = std::result::Result<T, BufferError>;

/// Errors from the buffer store and flush engine
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// Filesystem operation failed
    #[error("{op} '{path}': {source}")]
    Io {
        /// What was being done
        op: &'static str,
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl BufferError {
    /// Wrap an I/O error with the operation and path it came from
    pub fn io(op: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
