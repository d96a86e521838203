use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tessera_core::{Disposable, ExtensionIdentity};
use tessera_rpc::RemoteError;
use tracing::{debug, warn};

use crate::error::{SandboxError, SandboxResult};
use crate::protocol::{CommandHandler, ExtHostCommands, MainThreadCommandsClient};

struct Registration {
    handler: CommandHandler,
    owner: Option<ExtensionIdentity>,
}

/// Sandbox-side command handlers, mirrored into the host's command table.
pub struct ExtHostCommandRegistry {
    handlers: RwLock<HashMap<String, Registration>>,
    main_thread: MainThreadCommandsClient,
}

impl ExtHostCommandRegistry {
    /// Create a registry that mirrors into `main_thread`.
    #[must_use]
    pub fn new(main_thread: MainThreadCommandsClient) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            main_thread,
        }
    }

    fn local(&self, id: &str) -> Option<(CommandHandler, Option<ExtensionIdentity>)> {
        let handlers = match self.handlers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers
            .get(id)
            .map(|r| (Arc::clone(&r.handler), r.owner.clone()))
    }

    fn forget(&self, id: &str) -> bool {
        let mut handlers = match self.handlers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.remove(id).is_some()
    }

    /// Register a command served by the sandbox and announce it to the host.
    ///
    /// Disposing the handle forgets the command locally and, when a runtime
    /// is available, unregisters it on the host in the background.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::CommandExists`] if the id is taken on either
    /// side, or the RPC error if the host cannot be reached.
    pub async fn register_command(
        self: &Arc<Self>,
        id: &str,
        handler: CommandHandler,
        owner: Option<ExtensionIdentity>,
    ) -> SandboxResult<Disposable> {
        {
            let mut handlers = match self.handlers.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if handlers.contains_key(id) {
                return Err(SandboxError::CommandExists(id.to_string()));
            }
            handlers.insert(
                id.to_string(),
                Registration {
                    handler,
                    owner: owner.clone(),
                },
            );
        }

        if let Err(e) = self.main_thread.register_command(id).await {
            self.forget(id);
            return Err(match e {
                tessera_rpc::RpcError::Remote(remote) if remote.code == "CommandExists" => {
                    SandboxError::CommandExists(id.to_string())
                },
                other => other.into(),
            });
        }
        debug!(command = id, extension = ?owner.as_ref().map(ExtensionIdentity::as_str), "Command registered");

        let registry = Arc::downgrade(self);
        let id = id.to_string();
        Ok(Disposable::new(move || {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            if !registry.forget(&id) {
                return;
            }
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        if let Err(e) = registry.main_thread.unregister_command(&id).await {
                            warn!(command = %id, error = %e, "Failed to unregister command on host");
                        }
                    });
                },
                Err(_) => {
                    debug!(command = %id, "No runtime, host keeps stale command entry");
                },
            }
        }))
    }

    /// Run a command: locally if the sandbox serves it, otherwise on the host.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::CommandFailed`] for a failing local handler,
    /// or the host's error.
    pub async fn execute_command(&self, id: &str, args: Vec<Value>) -> SandboxResult<Value> {
        match self.local(id) {
            Some((handler, owner)) => run(id, &handler, owner.as_ref(), args).await,
            None => Ok(self.main_thread.execute_command(id, args).await?),
        }
    }

    /// Every command id known to the host, sorted.
    ///
    /// # Errors
    ///
    /// Returns the RPC error if the host cannot be reached.
    pub async fn get_commands(&self) -> SandboxResult<Vec<String>> {
        Ok(self.main_thread.get_commands().await?)
    }

    /// Ids served by the sandbox, sorted.
    #[must_use]
    pub fn local_commands(&self) -> Vec<String> {
        let mut ids: Vec<String> = match self.handlers.read() {
            Ok(handlers) => handlers.keys().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
        };
        ids.sort_unstable();
        ids
    }
}

async fn run(
    id: &str,
    handler: &CommandHandler,
    owner: Option<&ExtensionIdentity>,
    args: Vec<Value>,
) -> SandboxResult<Value> {
    debug!(command = id, extension = ?owner.map(ExtensionIdentity::as_str), "Executing command");
    handler(args).await.map_err(|e| {
        warn!(command = id, error = %e, "Command failed");
        SandboxError::CommandFailed {
            id: id.to_string(),
            message: format!("{e:#}"),
        }
    })
}

impl std::fmt::Debug for ExtHostCommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtHostCommandRegistry")
            .field("local_commands", &self.local_commands())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ExtHostCommands for ExtHostCommandRegistry {
    async fn execute_contributed_command(
        &self,
        id: String,
        args: Vec<Value>,
    ) -> Result<Value, RemoteError> {
        let Some((handler, owner)) = self.local(&id) else {
            return Err(SandboxError::CommandNotFound(id).to_remote());
        };
        run(&id, &handler, owner.as_ref(), args)
            .await
            .map_err(|e| e.to_remote())
    }
}
