//! Error types for the collatable codec.

use thiserror::Error;

/// Result type for collatable operations.
pub type CollatableResult<T> = Result<T, CollatableError>;

/// Errors that can occur while building or reading collatable data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollatableError {
    /// Ran off the end of the input while reading.
    #[error("unexpected end of collatable data")]
    UnexpectedEof,

    /// The next value does not have the requested type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The type the caller asked for.
        expected: &'static str,
        /// The type actually present.
        found: &'static str,
    },

    /// Encountered a byte that is not a valid tag.
    #[error("invalid collatable tag: {byte:#04x}")]
    InvalidTag {
        /// The offending byte.
        byte: u8,
    },

    /// NaN cannot be collated; it has no place in the total order.
    #[error("NaN values cannot be encoded")]
    NanForbidden,

    /// Strings containing U+0000 cannot be encoded; 0x00 is the string
    /// terminator in the collatable format.
    #[error("strings containing U+0000 cannot be encoded")]
    StringContainsNul,

    /// A number's digit bytes are malformed.
    #[error("malformed number encoding")]
    InvalidNumber,

    /// A decoded string is not valid UTF-8.
    #[error("decoded string is not valid UTF-8")]
    InvalidUtf8,

    /// A container was not terminated before the data ended, or an
    /// end-sequence appeared with no open container.
    #[error("unmatched container boundary: {message}")]
    UnmatchedBoundary {
        /// Description of the structural problem.
        message: String,
    },
}

impl CollatableError {
    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch { expected, found }
    }

    /// Creates an unmatched boundary error.
    pub fn unmatched_boundary(message: impl Into<String>) -> Self {
        Self::UnmatchedBoundary {
            message: message.into(),
        }
    }
}
