//! Core error types.

use thiserror::Error;

/// Errors raised by the foundation types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A URI string could not be parsed.
    #[error("invalid uri '{input}': {reason}")]
    InvalidUri {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An extension identifier failed validation.
    #[error("invalid extension identity '{0}': expected 'publisher.name'")]
    InvalidIdentity(String),

    /// A required service was never inserted into the accessor.
    #[error("service not available: {0}")]
    ServiceUnavailable(&'static str),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
