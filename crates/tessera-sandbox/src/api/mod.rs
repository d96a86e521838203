//! The per-identity API surface handed to extensions.
//!
//! Each namespace is a thin accessor over the resolved capability set.
//! [`ExtensionApi::build`] composes them in a fixed order and fails as a
//! whole if any namespace cannot be built.

mod commands;
mod env;
mod storage;
mod workspace;

pub use commands::CommandsApi;
pub use env::EnvApi;
pub use storage::StorageApi;
pub use workspace::{FileSystemApi, WorkspaceApi};

use tessera_capabilities::CapabilitySet;
use tessera_core::ExtensionIdentity;
use uuid::Uuid;

use crate::error::SandboxResult;

/// Extension-facing API for one identity (or none).
#[derive(Debug, Clone)]
pub struct ExtensionApi {
    identity: Option<ExtensionIdentity>,
    commands: CommandsApi,
    workspace: WorkspaceApi,
    storage: StorageApi,
    env: EnvApi,
}

impl ExtensionApi {
    pub(crate) fn build(
        identity: Option<ExtensionIdentity>,
        resolved: &CapabilitySet,
        scheme: &str,
        session_id: Uuid,
    ) -> SandboxResult<Self> {
        let commands = CommandsApi::create(identity.as_ref(), resolved)?;
        let workspace = WorkspaceApi::create(resolved, scheme)?;
        let storage = StorageApi::create(identity.as_ref(), resolved)?;
        let env = EnvApi::create(identity.as_ref(), scheme, session_id);
        Ok(Self {
            identity,
            commands,
            workspace,
            storage,
            env,
        })
    }

    /// Attributed identity, `None` for the default surface.
    #[must_use]
    pub fn identity(&self) -> Option<&ExtensionIdentity> {
        self.identity.as_ref()
    }

    /// Commands.
    #[must_use]
    pub fn commands(&self) -> &CommandsApi {
        &self.commands
    }

    /// Workspace files and documents.
    #[must_use]
    pub fn workspace(&self) -> &WorkspaceApi {
        &self.workspace
    }

    /// Persistent state.
    #[must_use]
    pub fn storage(&self) -> &StorageApi {
        &self.storage
    }

    /// Host environment.
    #[must_use]
    pub fn env(&self) -> &EnvApi {
        &self.env
    }
}
