//! Error types for the view-index core.

use facetdb_collatable::CollatableError;
use facetdb_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by the view-index core.
///
/// Every error carries a stable numeric [`code`](CoreError::code) and a
/// [`domain`](CoreError::domain) tag so that bindings can translate them
/// without matching on message text. The taxonomy is part of the public
/// contract and is stable across storage backends.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The requested item does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// Stored data (a collatable key, row, or metadata record) is
    /// malformed. The cursor that hit it terminates; the view itself is
    /// not poisoned and can be rebuilt by an administrator.
    #[error("corrupt index data: {message}")]
    Corrupt {
        /// Description of the corruption.
        message: String,
    },

    /// The host store reported a transient busy condition.
    ///
    /// Part of the stable taxonomy for bindings that flatten the error
    /// chain; store-level contention surfaces from this crate as
    /// [`CoreError::Storage`] wrapping the store's busy error.
    #[error("busy: {message}")]
    Busy {
        /// Description of the contention.
        message: String,
    },

    /// The view is in use: an enumerator or indexer holds it, so it cannot
    /// be closed, erased, or deleted, and no second indexer may begin.
    #[error("view '{view}' is busy with active users")]
    IndexBusy {
        /// Name of the busy view.
        view: String,
    },

    /// Error from the host key/value store.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The operation requires an open transaction.
    ///
    /// Part of the stable taxonomy for host stores that reject bare
    /// mutations; no code path in this crate produces it, since every
    /// index mutation already goes through a
    /// [`Transaction`](facetdb_storage::Transaction).
    #[error("operation requires a transaction")]
    TransactionRequired,

    /// A caller-supplied argument violates the API contract.
    #[error("invalid parameter: {message}")]
    InvalidParameter {
        /// Description of the violation.
        message: String,
    },

    /// The operation is not supported by this build or configuration.
    ///
    /// Part of the stable taxonomy for bindings to translate; no
    /// operation in this crate currently produces it.
    #[error("unsupported operation: {message}")]
    Unsupported {
        /// Description of the unsupported operation.
        message: String,
    },
}

impl CoreError {
    /// Creates a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a corrupt-data error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }

    /// Creates an index-busy error for the named view.
    pub fn index_busy(view: impl Into<String>) -> Self {
        Self::IndexBusy { view: view.into() }
    }

    /// Creates an invalid-parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Stable numeric code for this error kind.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            Self::NotFound { .. } => 1,
            Self::Corrupt { .. } => 2,
            Self::Busy { .. } => 3,
            Self::IndexBusy { .. } => 4,
            Self::Storage(inner) => match inner {
                StorageError::Busy { .. } => 3,
                StorageError::Conflict { .. } => 5,
                StorageError::Io(_) | StorageError::PrepareFailed { .. } => 6,
            },
            Self::TransactionRequired => 7,
            Self::InvalidParameter { .. } => 8,
            Self::Unsupported { .. } => 9,
        }
    }

    /// Domain tag identifying which layer produced the error.
    #[must_use]
    pub fn domain(&self) -> &'static str {
        match self {
            Self::Storage(_) => "storage",
            _ => "view",
        }
    }
}

impl From<CollatableError> for CoreError {
    fn from(err: CollatableError) -> Self {
        Self::Corrupt {
            message: err.to_string(),
        }
    }
}
