use std::sync::Arc;

use serde_json::Value;
use tessera_capabilities::{CapabilityName, CapabilitySet};
use tessera_core::{Disposable, ExtensionIdentity};

use crate::capabilities::ExtHostCommandRegistry;
use crate::error::SandboxResult;
use crate::protocol::CommandHandler;

/// `commands` namespace of the extension API.
#[derive(Debug, Clone)]
pub struct CommandsApi {
    identity: Option<ExtensionIdentity>,
    registry: Arc<ExtHostCommandRegistry>,
}

impl CommandsApi {
    pub(crate) fn create(
        identity: Option<&ExtensionIdentity>,
        resolved: &CapabilitySet,
    ) -> SandboxResult<Self> {
        Ok(Self {
            identity: identity.cloned(),
            registry: resolved.require(CapabilityName::Commands)?,
        })
    }

    /// Register a command attributed to this API's identity.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::CommandExists`](crate::SandboxError::CommandExists)
    /// if the id is taken.
    pub async fn register_command(&self, id: &str, handler: CommandHandler) -> SandboxResult<Disposable> {
        self.registry
            .register_command(id, handler, self.identity.clone())
            .await
    }

    /// Run a command wherever it is served.
    ///
    /// # Errors
    ///
    /// Returns the handler's or the host's error.
    pub async fn execute_command(&self, id: &str, args: Vec<Value>) -> SandboxResult<Value> {
        self.registry.execute_command(id, args).await
    }

    /// Every command id known to the host, sorted.
    ///
    /// # Errors
    ///
    /// Returns the RPC error if the host cannot be reached.
    pub async fn get_commands(&self) -> SandboxResult<Vec<String>> {
        self.registry.get_commands().await
    }
}
