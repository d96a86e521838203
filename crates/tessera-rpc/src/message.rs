//! Wire envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RemoteError, RpcError, RpcResult};

/// A message on the channel. Replies carry the call id of their request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RpcMessage {
    /// Invoke `method` on the implementation set under `target`.
    Request {
        /// Caller-unique id.
        call_id: u64,
        /// Identifier name.
        target: String,
        /// Method name.
        method: String,
        /// Encoded arguments.
        args: Value,
    },
    /// Outcome of a request.
    Reply {
        /// Id of the request being answered.
        call_id: u64,
        /// Encoded return value or the callee's error.
        result: Result<Value, RemoteError>,
    },
}

impl RpcMessage {
    /// Encode to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Encode`] if a payload is not serializable.
    pub fn encode(&self) -> RpcResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| RpcError::Encode(e.to_string()))
    }

    /// Decode from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Decode`] for malformed input.
    pub fn decode(bytes: &[u8]) -> RpcResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| RpcError::Decode(e.to_string()))
    }
}
