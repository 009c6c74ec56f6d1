//! Host-level status codes

use thiserror::Error;
use xenon_bytecode::DecodeError;

/// Errors returned from core VM API calls.
///
/// These are host-facing; script-level failures travel as raised exception
/// values instead.
#[derive(Debug, Error)]
pub enum VmError {
    /// An argument was invalid for the call
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// A value had the wrong type for the operation
    #[error("invalid type: {0}")]
    InvalidType(String),

    /// A registry key is already present
    #[error("key already exists: {0}")]
    KeyAlreadyExists(String),

    /// A registry key was not found
    #[error("key does not exist: {0}")]
    KeyDoesNotExist(String),

    /// An index exceeded its container
    #[error("index out of range: {index} (limit {limit})")]
    IndexOutOfRange {
        /// The offending index
        index: usize,
        /// Exclusive upper bound
        limit: usize,
    },

    /// A stream ended before the expected data
    #[error("unexpected end of stream")]
    StreamEnd,

    /// An underlying I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A format-level mismatch (bad magic, version, or field encoding)
    #[error("mismatch: {0}")]
    Mismatch(String),

    /// A failure with no more specific classification
    #[error("unspecified failure")]
    Unspecified,
}

/// Convenience alias for results carrying a [`VmError`].
pub type VmResult<T> = Result<T, VmError>;

impl From<DecodeError> for VmError {
    fn from(error: DecodeError) -> Self {
        match error {
            DecodeError::UnexpectedEnd(_) => VmError::StreamEnd,
            other => VmError::Mismatch(other.to_string()),
        }
    }
}
