//! Common imports for RPC users.
//!
//! ```
//! use tessera_rpc::prelude::*;
//! ```

pub use crate::{
    DEFAULT_MAX_MESSAGE_BYTES, ErasedIdentifier, LoopbackTransport, MessagePassing, Proxy,
    ProxyIdentifier, RemoteError, RemoteInterface, RpcError, RpcOptions, RpcProtocol, RpcResult,
    decode_args, encode_result,
};
