//! Typed identifiers naming a remote interface.

use std::fmt;
use std::marker::PhantomData;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::RemoteError;
use crate::protocol::Proxy;

/// Describes one interface reachable over RPC.
///
/// Implement this on a marker type. `Server` is what the callee registers
/// (usually a `dyn Trait`), `Client` is the typed stub a caller receives.
pub trait RemoteInterface: Send + Sync + 'static {
    /// Implementation type registered on the callee side.
    type Server: ?Sized + Send + Sync + 'static;
    /// Stub type handed to callers.
    type Client: Send + Sync + 'static;

    /// Wrap an untyped proxy into the typed client.
    fn client(proxy: Proxy) -> Self::Client;

    /// Route one request to the implementation.
    fn dispatch<'a>(
        server: &'a Self::Server,
        method: &'a str,
        args: Value,
    ) -> BoxFuture<'a, Result<Value, RemoteError>>;
}

/// Names an interface on the channel. Both sides agree on the name.
pub struct ProxyIdentifier<I: RemoteInterface> {
    name: &'static str,
    _marker: PhantomData<fn() -> I>,
}

impl<I: RemoteInterface> ProxyIdentifier<I> {
    /// Declare an identifier.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Wire name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Drop the interface type, keeping the name.
    #[must_use]
    pub const fn erased(&self) -> ErasedIdentifier {
        ErasedIdentifier(self.name)
    }
}

impl<I: RemoteInterface> Clone for ProxyIdentifier<I> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I: RemoteInterface> Copy for ProxyIdentifier<I> {}

impl<I: RemoteInterface> fmt::Debug for ProxyIdentifier<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProxyIdentifier").field(&self.name).finish()
    }
}

impl<I: RemoteInterface> fmt::Display for ProxyIdentifier<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// An identifier with its interface type erased, for registration checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErasedIdentifier(&'static str);

impl ErasedIdentifier {
    /// Wire name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.0
    }
}

impl<I: RemoteInterface> From<ProxyIdentifier<I>> for ErasedIdentifier {
    fn from(id: ProxyIdentifier<I>) -> Self {
        id.erased()
    }
}

/// Decode call arguments inside a `dispatch` implementation.
///
/// # Errors
///
/// Returns an `InvalidArguments` [`RemoteError`] if `args` does not match `T`.
pub fn decode_args<T: serde::de::DeserializeOwned>(
    method: &str,
    args: Value,
) -> Result<T, RemoteError> {
    serde_json::from_value(args).map_err(|e| RemoteError::invalid_arguments(method, e))
}

/// Encode a return value inside a `dispatch` implementation.
///
/// # Errors
///
/// Returns an `Internal` [`RemoteError`] if the value is not serializable.
pub fn encode_result<T: serde::Serialize>(value: &T) -> Result<Value, RemoteError> {
    serde_json::to_value(value).map_err(|e| RemoteError::new("Internal", e.to_string()))
}
