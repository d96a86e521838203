//! Tessera Capabilities - named capability providers with declared
//! dependencies, initialized in one dependency-ordered pass.
//!
//! Providers register against a closed [`CapabilityName`]. Each provider's
//! factory receives the host [`ServiceAccessor`](tessera_core::ServiceAccessor),
//! a [`HostContext`] and the [`CapabilitySet`] built so far; what it returns
//! joins the set for every later provider.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod context;
mod error;
mod name;
mod provider;
mod registry;

pub use context::{CapabilitySet, Exposed, HostContext};
pub use error::{CapabilityError, CapabilityResult};
pub use name::CapabilityName;
pub use provider::CapabilityProvider;
pub use registry::CapabilityRegistry;
