//! Error types for the storage crate.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in the host key/value store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store is temporarily unavailable (e.g. a lock could not be
    /// acquired).
    ///
    /// Part of the stable store contract for implementations with lock
    /// timeouts; [`MemoryKeyStore`](crate::MemoryKeyStore) never returns
    /// it.
    #[error("store busy: {message}")]
    Busy {
        /// Description of the contention.
        message: String,
    },

    /// A write conflicted with a concurrent writer.
    ///
    /// Part of the stable store contract for multi-writer
    /// implementations; [`MemoryKeyStore`](crate::MemoryKeyStore) never
    /// returns it.
    #[error("write conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// I/O error from the underlying medium.
    ///
    /// Part of the stable store contract for file-backed implementations;
    /// [`MemoryKeyStore`](crate::MemoryKeyStore) never returns it.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Commit validation failed; nothing was applied.
    #[error("commit preparation failed: {message}")]
    PrepareFailed {
        /// Description of the failure.
        message: String,
    },
}

impl StorageError {
    /// Creates a busy error.
    pub fn busy(message: impl Into<String>) -> Self {
        Self::Busy {
            message: message.into(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a prepare-failed error.
    pub fn prepare_failed(message: impl Into<String>) -> Self {
        Self::PrepareFailed {
            message: message.into(),
        }
    }
}
