//! Storage error types.

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A storage operation failed.
    #[error("storage error: {0}")]
    Internal(String),

    /// The backing file could not be read or written.
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The namespace or key is invalid.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
