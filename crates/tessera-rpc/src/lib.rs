//! Tessera RPC: identifier-addressed calls between the host and a sandbox.
//!
//! Both sides declare the same [`ProxyIdentifier`] constants. One side
//! registers an implementation with [`RpcProtocol::set`]; the other obtains
//! a typed client with [`RpcProtocol::get_proxy`]. Calls are JSON envelopes
//! multiplexed over a [`MessagePassing`] transport by call id.
//!
//! Guarantees:
//!
//! - requests to one identifier are handled one at a time, in arrival order
//! - different identifiers are handled concurrently
//! - requests for an identifier without an implementation wait until one is
//!   registered
//! - callee errors come back as [`RpcError::Remote`]
//! - disposing a protocol rejects its outstanding calls with
//!   [`RpcError::Disposed`]

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod identifier;
mod message;
mod protocol;
mod transport;

pub use error::{RemoteError, RpcError, RpcResult};
pub use identifier::{
    ErasedIdentifier, ProxyIdentifier, RemoteInterface, decode_args, encode_result,
};
pub use message::RpcMessage;
pub use protocol::{Proxy, RpcOptions, RpcProtocol};
pub use transport::{DEFAULT_MAX_MESSAGE_BYTES, LoopbackTransport, MessagePassing};
