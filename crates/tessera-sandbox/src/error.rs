//! Sandbox error types.

use tessera_capabilities::CapabilityError;
use tessera_config::ConfigError;
use tessera_rpc::{RemoteError, RpcError};
use tessera_storage::StorageError;
use tessera_telemetry::TelemetryError;
use tessera_vfs::FsError;
use thiserror::Error;

/// Errors from bootstrap and the extension API.
///
/// Cloneable so one failed initialization can be reported to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    /// Capability registration or initialization failed.
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// An RPC call failed.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// A filesystem operation failed.
    #[error(transparent)]
    Fs(#[from] FsError),

    /// Persistent state could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),

    /// The host configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// Logging could not be installed.
    #[error("logging error: {0}")]
    Logging(String),

    /// A command with this id is already registered.
    #[error("command already registered: {0}")]
    CommandExists(String),

    /// No command with this id is registered.
    #[error("command not found: {0}")]
    CommandNotFound(String),

    /// A command handler failed.
    #[error("command {id} failed: {message}")]
    CommandFailed {
        /// Command id.
        id: String,
        /// Rendered error chain.
        message: String,
    },

    /// A document could not be opened as text.
    #[error("cannot open {uri} as a text document: {reason}")]
    InvalidDocument {
        /// Document URI.
        uri: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The host has been shut down.
    #[error("sandbox host shut down")]
    ShutDown,
}

impl SandboxError {
    /// Marshal into an RPC error. Remote errors pass through unchanged.
    #[must_use]
    pub fn to_remote(&self) -> RemoteError {
        match self {
            Self::Rpc(RpcError::Remote(remote)) => remote.clone(),
            Self::Fs(err) => RemoteError::new(err.code(), err.detail()),
            Self::CommandExists(id) => RemoteError::new("CommandExists", id.clone()),
            Self::CommandNotFound(id) => RemoteError::new("CommandNotFound", id.clone()),
            Self::CommandFailed { .. } => RemoteError::new("CommandFailed", self.to_string()),
            other => RemoteError::new("Internal", other.to_string()),
        }
    }
}

impl From<StorageError> for SandboxError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<ConfigError> for SandboxError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<TelemetryError> for SandboxError {
    fn from(err: TelemetryError) -> Self {
        Self::Logging(err.to_string())
    }
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_pass_through() {
        let remote = RemoteError::new("Boom", "bad");
        let err = SandboxError::Rpc(RpcError::Remote(remote.clone()));
        assert_eq!(err.to_remote(), remote);
    }

    #[test]
    fn fs_errors_keep_their_code() {
        let err = SandboxError::Fs(FsError::not_found("/a.txt"));
        let remote = err.to_remote();
        assert_eq!(remote.code, "FileNotFound");
        assert_eq!(
            FsError::from_code(&remote.code, remote.message),
            FsError::not_found("/a.txt")
        );
    }

    #[test]
    fn command_errors() {
        assert_eq!(
            SandboxError::CommandNotFound("x".into()).to_remote().code,
            "CommandNotFound"
        );
        assert_eq!(SandboxError::ShutDown.to_remote().code, "Internal");
    }
}
