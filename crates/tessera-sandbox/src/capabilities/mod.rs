//! Built-in sandbox capabilities and their providers.
//!
//! Each provider wires one capability: it registers the sandbox side of its
//! RPC contract (if any) and obtains proxies to the host side.

mod commands;
mod documents;
mod filesystem;
mod storage;

use std::sync::Arc;

use tessera_capabilities::{CapabilityName, CapabilityProvider, CapabilitySet, HostContext};
use tessera_core::ServiceAccessor;
use tessera_storage::MemoryKvStore;
use tracing::debug;

pub use commands::ExtHostCommandRegistry;
pub use documents::{ExtHostDocuments, TextDocument};
pub use filesystem::ExtHostFileSystem;
pub use storage::{ExtHostStorage, GLOBAL_NAMESPACE, Memento, StateStore};

use crate::protocol::{EXT_HOST_COMMANDS, ExtHostCommands, MAIN_THREAD_COMMANDS, MAIN_THREAD_FILE_SYSTEM};

/// `Commands`: sandbox command handlers mirrored into the host table.
#[must_use]
pub fn commands_provider() -> CapabilityProvider {
    CapabilityProvider::new(|_, host: HostContext, _| async move {
        let rpc = host.rpc();
        let registry = Arc::new(ExtHostCommandRegistry::new(
            rpc.get_proxy(MAIN_THREAD_COMMANDS),
        ));
        rpc.set(
            EXT_HOST_COMMANDS,
            Arc::clone(&registry) as Arc<dyn ExtHostCommands>,
        )?;
        Ok(registry)
    })
}

/// `FileSystem`: the host filesystem over RPC.
#[must_use]
pub fn filesystem_provider() -> CapabilityProvider {
    CapabilityProvider::new(|_, host: HostContext, _| async move {
        Ok(Arc::new(ExtHostFileSystem::new(
            host.rpc().get_proxy(MAIN_THREAD_FILE_SYSTEM),
        )))
    })
}

/// `Documents`: text documents read through `FileSystem`.
#[must_use]
pub fn documents_provider() -> CapabilityProvider {
    CapabilityProvider::new(|_, _, resolved: CapabilitySet| async move {
        let fs = resolved.require::<ExtHostFileSystem>(CapabilityName::FileSystem)?;
        Ok(Arc::new(ExtHostDocuments::new(fs)))
    })
    .depends_on(CapabilityName::FileSystem)
}

/// `Storage`: per-identity mementos over the host's [`StateStore`], or an
/// in-memory store when the host supplies none.
#[must_use]
pub fn storage_provider() -> CapabilityProvider {
    CapabilityProvider::new(|services: ServiceAccessor, _, _| async move {
        let state = match services.get::<StateStore>() {
            Some(state) => StateStore::clone(&state),
            None => {
                debug!("No state store service, using an in-memory store");
                StateStore::new(Arc::new(MemoryKvStore::new()))
            },
        };
        Ok(Arc::new(ExtHostStorage::new(state)))
    })
}

/// Every built-in provider, in registration order.
#[must_use]
pub fn builtin_providers() -> Vec<(CapabilityName, CapabilityProvider)> {
    vec![
        (CapabilityName::Commands, commands_provider()),
        (CapabilityName::FileSystem, filesystem_provider()),
        (CapabilityName::Documents, documents_provider()),
        (CapabilityName::Storage, storage_provider()),
    ]
}
