//! RPC error types.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An error raised by a callee, marshalled back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable detail.
    pub message: String,
}

impl RemoteError {
    /// Code used for arguments that do not decode.
    pub const INVALID_ARGUMENTS: &'static str = "InvalidArguments";
    /// Code used for methods the interface does not define.
    pub const UNKNOWN_METHOD: &'static str = "UnknownMethod";
    /// Code used when the implementation panicked.
    pub const PANICKED: &'static str = "Panicked";
    /// Code used when the real reply could not be sent back.
    pub const REPLY_UNDELIVERABLE: &'static str = "ReplyUndeliverable";

    /// Build an error.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The method does not exist on the target interface.
    #[must_use]
    pub fn unknown_method(target: &str, method: &str) -> Self {
        Self::new(Self::UNKNOWN_METHOD, format!("{target} has no method '{method}'"))
    }

    /// The arguments did not decode.
    pub fn invalid_arguments(method: &str, err: impl fmt::Display) -> Self {
        Self::new(Self::INVALID_ARGUMENTS, format!("{method}: {err}"))
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RemoteError {}

/// Errors seen by RPC callers and registrants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// The callee raised an error.
    #[error("remote call failed: {0}")]
    Remote(RemoteError),

    /// The protocol was disposed before the call completed.
    #[error("rpc protocol disposed")]
    Disposed,

    /// The transport no longer accepts messages.
    #[error("transport closed")]
    Closed,

    /// No reply arrived in time. The callee may still be running.
    #[error("call to {target}.{method} timed out after {after:?}")]
    Timeout {
        /// Target identifier.
        target: String,
        /// Method name.
        method: String,
        /// Configured timeout.
        after: Duration,
    },

    /// An outgoing value could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// An incoming value could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A message exceeded the transport limit.
    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge {
        /// Encoded size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// An implementation is already set for the identifier.
    #[error("identifier already registered: {0}")]
    AlreadyRegistered(String),

    /// Identifiers that were expected but never set.
    #[error("identifiers never registered: {}", .0.join(", "))]
    Unregistered(Vec<String>),
}

impl From<RemoteError> for RpcError {
    fn from(err: RemoteError) -> Self {
        Self::Remote(err)
    }
}

/// Result type for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;
