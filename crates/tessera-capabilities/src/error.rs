//! Capability error types.

use thiserror::Error;

use crate::name::CapabilityName;

/// Errors from capability registration, resolution and lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// Registration attempted after initialization began.
    #[error("cannot register {0}: registry already initialized")]
    Sealed(CapabilityName),

    /// `initialize` called a second time.
    #[error("capability registry already initialized")]
    AlreadyInitialized,

    /// The dependency graph contains a cycle through these providers.
    #[error("dependency cycle among capabilities: {}", join(.0))]
    Cycle(Vec<CapabilityName>),

    /// A provider's factory failed.
    #[error("capability {name} failed to initialize: {message}")]
    Factory {
        /// Provider whose factory failed.
        name: CapabilityName,
        /// Rendered error chain.
        message: String,
    },

    /// A capability is not in the resolved set.
    #[error("capability not available: {0}")]
    Missing(CapabilityName),

    /// A capability exists but is not of the requested type.
    #[error("capability {name} is not a {expected}")]
    TypeMismatch {
        /// Capability looked up.
        name: CapabilityName,
        /// Requested type name.
        expected: &'static str,
    },
}

fn join(names: &[CapabilityName]) -> String {
    names
        .iter()
        .map(CapabilityName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for capability operations.
pub type CapabilityResult<T> = Result<T, CapabilityError>;
