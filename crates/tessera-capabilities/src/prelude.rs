//! Common imports for capability providers.

pub use crate::{
    CapabilityError, CapabilityName, CapabilityProvider, CapabilityRegistry, CapabilityResult,
    CapabilitySet, Exposed, HostContext,
};
