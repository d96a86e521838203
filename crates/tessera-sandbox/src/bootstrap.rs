//! Sandbox host assembly.
//!
//! [`SandboxHost::builder`] wires a loopback RPC pair, the host-side
//! handlers, the layered filesystem, and the capability registry. Capability
//! factories only run when [`SandboxHost::initialize`] (or the first
//! [`SandboxHost::api`] call) is awaited.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tessera_capabilities::{
    CapabilityName, CapabilityProvider, CapabilityRegistry, CapabilitySet, HostContext,
};
use tessera_config::HostConfig;
use tessera_core::{DisposableStore, ExtensionIdentity, ServiceAccessor, ServiceCollection};
use tessera_rpc::{LoopbackTransport, MessagePassing, RpcOptions, RpcProtocol};
use tessera_storage::{KvStore, MemoryKvStore};
use tessera_vfs::FileSystemRegistry;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::ExtensionApi;
use crate::capabilities::{StateStore, builtin_providers};
use crate::error::{SandboxError, SandboxResult};
use crate::host::{HostCommandService, HostFileSystem};
use crate::mounts::attach_mounts;
use crate::protocol::{
    EXT_HOST_COMMANDS, MAIN_THREAD_COMMANDS, MAIN_THREAD_FILE_SYSTEM, MainThreadCommands,
    MainThreadFileSystem, SANDBOX_IDENTIFIERS,
};

type InitFuture = Shared<BoxFuture<'static, SandboxResult<CapabilitySet>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Builder for [`SandboxHost`].
#[derive(Default)]
pub struct SandboxHostBuilder {
    config: HostConfig,
    services: ServiceCollection,
    hooks: ServiceAccessor,
    providers: Vec<(CapabilityName, CapabilityProvider)>,
    state_store: Option<Arc<dyn KvStore>>,
}

impl SandboxHostBuilder {
    /// Use `config` instead of the defaults.
    #[must_use]
    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a host service visible to every capability factory.
    #[must_use]
    pub fn service<T: std::any::Any + Send + Sync>(mut self, service: Arc<T>) -> Self {
        self.services.insert(service);
        self
    }

    /// Collaborator hooks passed through [`HostContext::hooks`].
    #[must_use]
    pub fn hooks(mut self, hooks: ServiceAccessor) -> Self {
        self.hooks = hooks;
        self
    }

    /// Register an extra provider after the built-ins. Registering a
    /// built-in name replaces the built-in.
    #[must_use]
    pub fn provider(mut self, name: CapabilityName, provider: CapabilityProvider) -> Self {
        self.providers.push((name, provider));
        self
    }

    /// Back mementos and `kv` mounts with `store`. Defaults to memory.
    #[must_use]
    pub fn state_store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    /// Assemble the host.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Config`] for an invalid configuration, or the
    /// first mount, RPC, or capability registration failure.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn build(self) -> SandboxResult<SandboxHost> {
        let Self {
            config,
            mut services,
            hooks,
            providers,
            state_store,
        } = self;
        tessera_config::validate::validate(&config)?;

        let session_id = Uuid::new_v4();
        let options = RpcOptions::default().with_call_timeout(config.rpc.call_timeout());
        let (host_end, sandbox_end) = LoopbackTransport::pair_with_limit(config.rpc.max_message_bytes);
        let host_rpc = Arc::new(RpcProtocol::new(
            "host",
            Arc::new(host_end) as Arc<dyn MessagePassing>,
            options,
        ));
        let sandbox_rpc = Arc::new(RpcProtocol::new(
            "sandbox",
            Arc::new(sandbox_end) as Arc<dyn MessagePassing>,
            options,
        ));

        let store = state_store.unwrap_or_else(|| Arc::new(MemoryKvStore::new()));
        let filesystem = Arc::new(FileSystemRegistry::new(
            config.sandbox.default_scheme.as_str(),
        ));
        let mounts = attach_mounts(&filesystem, &config.filesystem.mounts, &store)?;

        let commands = Arc::new(HostCommandService::new(
            host_rpc.get_proxy(EXT_HOST_COMMANDS),
        ));
        host_rpc.set(
            MAIN_THREAD_COMMANDS,
            Arc::clone(&commands) as Arc<dyn MainThreadCommands>,
        )?;
        host_rpc.set(
            MAIN_THREAD_FILE_SYSTEM,
            Arc::new(HostFileSystem::new(Arc::clone(&filesystem))) as Arc<dyn MainThreadFileSystem>,
        )?;
        filesystem.start();

        let config = Arc::new(config);
        services.insert(Arc::clone(&filesystem));
        services.insert(Arc::clone(&commands));
        services.insert(Arc::new(StateStore::new(store)));
        services.insert(Arc::clone(&config));
        let services = services.build();

        let registry = Arc::new(CapabilityRegistry::new());
        for (name, provider) in builtin_providers().into_iter().chain(providers) {
            registry.register(name, provider)?;
        }
        let context = HostContext::new(Arc::clone(&sandbox_rpc)).with_hooks(hooks);

        info!(
            session = %session_id,
            scheme = %filesystem.default_scheme(),
            mounts = mounts.len(),
            capabilities = ?registry.registered(),
            "Sandbox host built"
        );

        Ok(SandboxHost {
            config,
            session_id,
            host_rpc,
            sandbox_rpc,
            filesystem,
            commands,
            registry,
            services,
            context,
            mounts,
            init: Mutex::new(None),
            apis: Mutex::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
        })
    }
}

impl fmt::Debug for SandboxHostBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let extra: Vec<CapabilityName> = self.providers.iter().map(|(name, _)| *name).collect();
        f.debug_struct("SandboxHostBuilder")
            .field("config", &self.config)
            .field("providers", &extra)
            .field("state_store", &self.state_store.is_some())
            .finish_non_exhaustive()
    }
}

/// A wired host and sandbox pair.
pub struct SandboxHost {
    config: Arc<HostConfig>,
    session_id: Uuid,
    host_rpc: Arc<RpcProtocol>,
    sandbox_rpc: Arc<RpcProtocol>,
    filesystem: Arc<FileSystemRegistry>,
    commands: Arc<HostCommandService>,
    registry: Arc<CapabilityRegistry>,
    services: ServiceAccessor,
    context: HostContext,
    mounts: DisposableStore,
    init: Mutex<Option<InitFuture>>,
    apis: Mutex<HashMap<Option<String>, Arc<ExtensionApi>>>,
    shut_down: AtomicBool,
}

impl SandboxHost {
    /// Start building a host.
    #[must_use]
    pub fn builder() -> SandboxHostBuilder {
        SandboxHostBuilder::default()
    }

    /// Run every capability factory once.
    ///
    /// Concurrent and repeated calls share the same in-flight future and
    /// its outcome; a failed initialization is not retried.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::ShutDown`] after [`shutdown`](Self::shutdown)
    /// or the capability registry's failure.
    pub async fn initialize(&self) -> SandboxResult<CapabilitySet> {
        self.ensure_running()?;
        let init = {
            let mut slot = lock(&self.init);
            slot.get_or_insert_with(|| self.start_initialize()).clone()
        };
        init.await
    }

    fn start_initialize(&self) -> InitFuture {
        let registry = Arc::clone(&self.registry);
        let services = self.services.clone();
        let context = self.context.clone();
        let sandbox_rpc = Arc::clone(&self.sandbox_rpc);
        async move {
            let resolved = registry.initialize(&services, &context).await?;
            if let Err(e) = sandbox_rpc.assert_registered(&SANDBOX_IDENTIFIERS) {
                warn!(error = %e, "Sandbox side is missing implementations");
            }
            Ok(resolved)
        }
        .boxed()
        .shared()
    }

    /// API surface for `identity`, or the unattributed default.
    ///
    /// Built once per identity after initialization completes; later calls
    /// return the same instance.
    ///
    /// # Errors
    ///
    /// Returns the initialization error, or the error of the first API
    /// module that cannot be built.
    pub async fn api(&self, identity: Option<&ExtensionIdentity>) -> SandboxResult<Arc<ExtensionApi>> {
        let resolved = self.initialize().await?;
        let key = identity.map(|id| id.key().to_string());
        let mut apis = lock(&self.apis);
        if let Some(api) = apis.get(&key) {
            return Ok(Arc::clone(api));
        }
        let api = Arc::new(ExtensionApi::build(
            identity.cloned(),
            &resolved,
            self.filesystem.default_scheme(),
            self.session_id,
        )?);
        apis.insert(key, Arc::clone(&api));
        debug!(
            extension = identity.map_or("<default>", ExtensionIdentity::as_str),
            "Extension API created"
        );
        Ok(api)
    }

    /// Drain and dispose both RPC endpoints and detach configured mounts.
    /// Idempotent.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.sandbox_rpc.drain().await;
        self.host_rpc.drain().await;
        self.sandbox_rpc.dispose();
        self.host_rpc.dispose();
        self.mounts.dispose();
        lock(&self.apis).clear();
        info!(session = %self.session_id, "Sandbox host shut down");
    }

    /// True once [`shutdown`](Self::shutdown) has run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> SandboxResult<()> {
        if self.is_shut_down() {
            return Err(SandboxError::ShutDown);
        }
        Ok(())
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Unique id of this host instance.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Host-side filesystem registry.
    #[must_use]
    pub fn filesystem(&self) -> &Arc<FileSystemRegistry> {
        &self.filesystem
    }

    /// Host-side command table.
    #[must_use]
    pub fn commands(&self) -> &Arc<HostCommandService> {
        &self.commands
    }

    /// Host end of the RPC pair.
    #[must_use]
    pub fn host_rpc(&self) -> &Arc<RpcProtocol> {
        &self.host_rpc
    }

    /// Sandbox end of the RPC pair.
    #[must_use]
    pub fn sandbox_rpc(&self) -> &Arc<RpcProtocol> {
        &self.sandbox_rpc
    }

    /// Services passed to capability factories.
    #[must_use]
    pub fn services(&self) -> &ServiceAccessor {
        &self.services
    }

    /// True once capability initialization has started.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.registry.is_initialized()
    }
}

impl fmt::Debug for SandboxHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxHost")
            .field("session_id", &self.session_id)
            .field("scheme", &self.filesystem.default_scheme())
            .field("initialized", &self.is_initialized())
            .field("apis", &lock(&self.apis).len())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use serde_json::json;
    use tessera_config::{MountConfig, MountKind};
    use tessera_core::Uri;

    use crate::protocol::command_handler;

    struct Marker;

    fn counting_provider(count: &Arc<AtomicUsize>) -> CapabilityProvider {
        let count = Arc::clone(count);
        CapabilityProvider::new(move |_, _, _| {
            let count = Arc::clone(&count);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(Arc::new(Marker))
            }
        })
    }

    #[tokio::test]
    async fn concurrent_initialize_runs_factories_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let host = Arc::new(
            SandboxHost::builder()
                .provider(CapabilityName::Storage, counting_provider(&count))
                .build()
                .unwrap(),
        );
        assert!(!host.is_initialized());

        let calls = (0..8).map(|_| {
            let host = Arc::clone(&host);
            tokio::spawn(async move { host.initialize().await })
        });
        for result in futures::future::join_all(calls).await {
            let resolved = result.unwrap().unwrap();
            assert_eq!(resolved.len(), 4);
        }
        host.initialize().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn api_is_memoized_per_identity() {
        let host = SandboxHost::builder().build().unwrap();
        let alice = ExtensionIdentity::new("acme.alice").unwrap();
        let bob = ExtensionIdentity::new("acme.bob").unwrap();

        let default_a = host.api(None).await.unwrap();
        let default_b = host.api(None).await.unwrap();
        assert!(Arc::ptr_eq(&default_a, &default_b));
        assert!(default_a.identity().is_none());

        let alice_a = host.api(Some(&alice)).await.unwrap();
        let alice_b = host.api(Some(&ExtensionIdentity::new("ACME.Alice").unwrap())).await.unwrap();
        assert!(Arc::ptr_eq(&alice_a, &alice_b));
        let bob_api = host.api(Some(&bob)).await.unwrap();
        assert!(!Arc::ptr_eq(&alice_a, &bob_api));
        assert_eq!(bob_api.env().identity(), Some(&bob));
        assert_eq!(bob_api.env().session_id(), host.session_id());
    }

    #[tokio::test]
    async fn failed_initialization_is_shared() {
        let host = SandboxHost::builder()
            .provider(
                CapabilityName::Documents,
                CapabilityProvider::new(|_, _, _| async {
                    Err::<Arc<Marker>, _>(anyhow::anyhow!("no documents today"))
                }),
            )
            .build()
            .unwrap();

        let first = host.initialize().await.unwrap_err();
        let second = host.api(None).await.unwrap_err();
        assert_eq!(first, second);
        assert!(first.to_string().contains("no documents today"));
    }

    #[tokio::test]
    async fn commands_round_trip_between_sides() {
        let host = SandboxHost::builder().build().unwrap();
        let ext = ExtensionIdentity::new("acme.math").unwrap();
        let api = host.api(Some(&ext)).await.unwrap();

        let _registration = api
            .commands()
            .register_command(
                "math.double",
                command_handler(|args| async move {
                    let n = args.first().and_then(serde_json::Value::as_i64).unwrap_or(0);
                    Ok(json!(n.saturating_mul(2)))
                }),
            )
            .await
            .unwrap();

        // Host side dispatches into the sandbox handler over RPC.
        let result = host.commands().execute("math.double", vec![json!(21)]).await.unwrap();
        assert_eq!(result, json!(42));

        host.commands()
            .register(
                "host.echo",
                command_handler(|args| async move { Ok(json!(args)) }),
            )
            .unwrap();
        let echoed = api
            .commands()
            .execute_command("host.echo", vec![json!("hi")])
            .await
            .unwrap();
        assert_eq!(echoed, json!(["hi"]));

        let all = api.commands().get_commands().await.unwrap();
        assert!(all.contains(&"math.double".to_string()));
        assert!(all.contains(&"host.echo".to_string()));
    }

    #[tokio::test]
    async fn workspace_fs_goes_through_host_registry() {
        let host = SandboxHost::builder().build().unwrap();
        host.filesystem().memory().insert_file("/seed.txt", b"seeded".to_vec());
        let api = host.api(None).await.unwrap();
        let workspace = api.workspace();

        let seed = workspace.uri("/seed.txt").unwrap();
        assert_eq!(workspace.fs().read_file(&seed).await.unwrap(), b"seeded");

        let note = workspace.uri("/note.txt").unwrap();
        workspace.fs().write_file(&note, b"line one\nline two").await.unwrap();
        let doc = workspace.open_text_document(&note).await.unwrap();
        assert_eq!(doc.line_count(), 2);
        assert_eq!(doc.line_at(1), Some("line two"));

        let missing = workspace.fs().stat(&workspace.uri("/nope").unwrap()).await.unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn mounts_shadow_the_default_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("shared.txt"), b"from disk").unwrap();

        let mut config = HostConfig::default();
        config.filesystem.mounts.push(MountConfig {
            priority: 10,
            kind: MountKind::Directory,
            path: Some(dir.path().to_path_buf()),
            namespace: None,
            readonly: false,
        });
        let host = SandboxHost::builder().config(config).build().unwrap();
        host.filesystem().memory().insert_file("/shared.txt", b"from memory".to_vec());

        let api = host.api(None).await.unwrap();
        let uri = Uri::file("/shared.txt");
        assert_eq!(api.workspace().fs().read_file(&uri).await.unwrap(), b"from disk");
    }

    #[tokio::test]
    async fn storage_mementos_are_isolated() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let host = SandboxHost::builder().state_store(Arc::clone(&store)).build().unwrap();
        let a = host.api(Some(&ExtensionIdentity::new("acme.a").unwrap())).await.unwrap();
        let b = host.api(Some(&ExtensionIdentity::new("acme.b").unwrap())).await.unwrap();

        a.storage().state().update("count", &3_u32).await.unwrap();
        assert_eq!(a.storage().state().get::<u32>("count").await.unwrap(), Some(3));
        assert_eq!(b.storage().state().get::<u32>("count").await.unwrap(), None);
        assert!(store.exists(a.storage().state().namespace(), "count").await.unwrap());
    }

    #[tokio::test]
    async fn shutdown_rejects_further_use() {
        let host = SandboxHost::builder().build().unwrap();
        host.api(None).await.unwrap();
        host.shutdown().await;
        host.shutdown().await;
        assert!(host.is_shut_down());
        assert!(host.sandbox_rpc().is_disposed());
        assert_eq!(host.api(None).await.unwrap_err(), SandboxError::ShutDown);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = HostConfig::default();
        config.rpc.max_message_bytes = 0;
        let err = SandboxHost::builder().config(config).build().unwrap_err();
        assert!(matches!(err, SandboxError::Config(_)));
    }
}
