//! Error types for queue storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during queue storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored document is structurally malformed.
    #[error("unreadable storage: {0}")]
    UnreadableStorage(String),

    /// The stored document was written by an incompatible format version.
    #[error("unsupported migration to storage version {version}")]
    UnsupportedMigration {
        /// Version found in the document.
        version: String,
    },

    /// Another process owns the queue file.
    #[error("queue file locked by another process: {}", .0.display())]
    Locked(PathBuf),
}

impl StorageError {
    /// Returns true if the error means the stored data itself is unusable.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            StorageError::UnreadableStorage(_) | StorageError::UnsupportedMigration { .. }
        )
    }
}
