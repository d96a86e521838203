use tessera_capabilities::{CapabilityName, CapabilitySet};
use tessera_core::ExtensionIdentity;

use crate::capabilities::{ExtHostStorage, Memento};
use crate::error::SandboxResult;

/// `storage` namespace: the memento for this API's identity.
#[derive(Debug, Clone)]
pub struct StorageApi {
    state: Memento,
}

impl StorageApi {
    pub(crate) fn create(
        identity: Option<&ExtensionIdentity>,
        resolved: &CapabilitySet,
    ) -> SandboxResult<Self> {
        let storage = resolved.require::<ExtHostStorage>(CapabilityName::Storage)?;
        Ok(Self {
            state: storage.memento(identity)?,
        })
    }

    /// Persistent state for this extension.
    #[must_use]
    pub fn state(&self) -> &Memento {
        &self.state
    }
}
