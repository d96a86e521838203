use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tessera_core::Disposable;
use tessera_events::Emitter;
use tessera_rpc::RemoteError;
use tracing::{debug, warn};

use crate::error::{SandboxError, SandboxResult};
use crate::protocol::{CommandHandler, ExtHostCommandsClient, MainThreadCommands};

/// Change to the host command table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
    /// A command became available.
    Registered(String),
    /// A command went away.
    Unregistered(String),
}

#[derive(Clone)]
enum Entry {
    /// Runs on the host.
    Host(CommandHandler),
    /// Runs in the sandbox, reached over RPC.
    Contributed,
}

/// The host's command table: host handlers plus commands contributed by
/// the sandbox.
pub struct HostCommandService {
    commands: RwLock<HashMap<String, Entry>>,
    ext_host: ExtHostCommandsClient,
    events: Emitter<CommandEvent>,
}

impl HostCommandService {
    /// Create a table whose contributed commands run through `ext_host`.
    #[must_use]
    pub fn new(ext_host: ExtHostCommandsClient) -> Self {
        Self {
            commands: RwLock::new(HashMap::new()),
            ext_host,
            events: Emitter::new(),
        }
    }

    fn insert(&self, id: &str, entry: Entry) -> SandboxResult<()> {
        let mut commands = match self.commands.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if commands.contains_key(id) {
            return Err(SandboxError::CommandExists(id.to_string()));
        }
        commands.insert(id.to_string(), entry);
        drop(commands);
        self.events.fire(CommandEvent::Registered(id.to_string()));
        Ok(())
    }

    fn remove(&self, id: &str, contributed_only: bool) -> bool {
        let removed = {
            let mut commands = match self.commands.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            match commands.get(id) {
                Some(Entry::Host(_)) if contributed_only => false,
                Some(_) => commands.remove(id).is_some(),
                None => false,
            }
        };
        if removed {
            self.events.fire(CommandEvent::Unregistered(id.to_string()));
        }
        removed
    }

    fn lookup(&self, id: &str) -> Option<Entry> {
        match self.commands.read() {
            Ok(commands) => commands.get(id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(id).cloned(),
        }
    }

    /// Register a host command. Disposing the handle removes it.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::CommandExists`] if `id` is taken.
    pub fn register(self: &Arc<Self>, id: &str, handler: CommandHandler) -> SandboxResult<Disposable> {
        self.insert(id, Entry::Host(handler))?;
        debug!(command = id, "Host command registered");

        let service = Arc::downgrade(self);
        let id = id.to_string();
        Ok(Disposable::new(move || {
            if let Some(service) = service.upgrade() {
                service.remove(&id, false);
            }
        }))
    }

    /// Run a command, on the host or in the sandbox.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::CommandNotFound`] for unknown ids,
    /// [`SandboxError::CommandFailed`] when a host handler fails, and the
    /// RPC error when a contributed command fails.
    pub async fn execute(&self, id: &str, args: Vec<Value>) -> SandboxResult<Value> {
        match self.lookup(id) {
            Some(Entry::Host(handler)) => handler(args).await.map_err(|e| {
                warn!(command = id, error = %e, "Host command failed");
                SandboxError::CommandFailed {
                    id: id.to_string(),
                    message: format!("{e:#}"),
                }
            }),
            Some(Entry::Contributed) => Ok(self
                .ext_host
                .execute_contributed_command(id, args)
                .await?),
            None => Err(SandboxError::CommandNotFound(id.to_string())),
        }
    }

    /// Every known command id, sorted.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        let mut ids: Vec<String> = match self.commands.read() {
            Ok(commands) => commands.keys().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
        };
        ids.sort_unstable();
        ids
    }

    /// Command table changes.
    #[must_use]
    pub fn events(&self) -> &Emitter<CommandEvent> {
        &self.events
    }
}

impl std::fmt::Debug for HostCommandService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCommandService")
            .field("commands", &self.commands())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MainThreadCommands for HostCommandService {
    async fn register_command(&self, id: String) -> Result<(), RemoteError> {
        self.insert(&id, Entry::Contributed)
            .map_err(|e| e.to_remote())?;
        debug!(command = %id, "Sandbox command registered");
        Ok(())
    }

    async fn unregister_command(&self, id: String) -> Result<(), RemoteError> {
        if self.remove(&id, true) {
            debug!(command = %id, "Sandbox command unregistered");
        }
        Ok(())
    }

    async fn execute_command(&self, id: String, args: Vec<Value>) -> Result<Value, RemoteError> {
        self.execute(&id, args).await.map_err(|e| e.to_remote())
    }

    async fn get_commands(&self) -> Result<Vec<String>, RemoteError> {
        Ok(self.commands())
    }
}
