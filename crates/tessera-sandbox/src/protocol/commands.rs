use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tessera_rpc::{
    ProxyIdentifier, Proxy, RemoteError, RemoteInterface, RpcResult, decode_args, encode_result,
};

/// A command implementation: arguments in, JSON value out.
pub type CommandHandler =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Wrap an async closure as a [`CommandHandler`].
pub fn command_handler<F, Fut>(handler: F) -> CommandHandler
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |args| handler(args).boxed())
}

/// Host-side command registry as seen from the sandbox.
#[async_trait]
pub trait MainThreadCommands: Send + Sync {
    /// Record that the sandbox serves `id`.
    async fn register_command(&self, id: String) -> Result<(), RemoteError>;
    /// Forget a sandbox-served command.
    async fn unregister_command(&self, id: String) -> Result<(), RemoteError>;
    /// Run any known command, wherever it lives.
    async fn execute_command(&self, id: String, args: Vec<Value>) -> Result<Value, RemoteError>;
    /// Every known command id, sorted.
    async fn get_commands(&self) -> Result<Vec<String>, RemoteError>;
}

/// Binds [`MAIN_THREAD_COMMANDS`] to [`MainThreadCommands`].
#[derive(Debug)]
pub struct MainThreadCommandsInterface;

/// Host command registry.
pub const MAIN_THREAD_COMMANDS: ProxyIdentifier<MainThreadCommandsInterface> =
    ProxyIdentifier::new("MainThreadCommands");

impl RemoteInterface for MainThreadCommandsInterface {
    type Server = dyn MainThreadCommands;
    type Client = MainThreadCommandsClient;

    fn client(proxy: Proxy) -> Self::Client {
        MainThreadCommandsClient { proxy }
    }

    fn dispatch<'a>(
        server: &'a Self::Server,
        method: &'a str,
        args: Value,
    ) -> BoxFuture<'a, Result<Value, RemoteError>> {
        async move {
            match method {
                "register_command" => {
                    let (id,): (String,) = decode_args(method, args)?;
                    encode_result(&server.register_command(id).await?)
                },
                "unregister_command" => {
                    let (id,): (String,) = decode_args(method, args)?;
                    encode_result(&server.unregister_command(id).await?)
                },
                "execute_command" => {
                    let (id, args): (String, Vec<Value>) = decode_args(method, args)?;
                    server.execute_command(id, args).await
                },
                "get_commands" => encode_result(&server.get_commands().await?),
                other => Err(RemoteError::unknown_method(MAIN_THREAD_COMMANDS.name(), other)),
            }
        }
        .boxed()
    }
}

/// Typed client for [`MAIN_THREAD_COMMANDS`].
#[derive(Debug, Clone)]
pub struct MainThreadCommandsClient {
    proxy: Proxy,
}

impl MainThreadCommandsClient {
    /// See [`MainThreadCommands::register_command`].
    ///
    /// # Errors
    ///
    /// Returns the RPC or callee error.
    pub async fn register_command(&self, id: &str) -> RpcResult<()> {
        self.proxy.call("register_command", (id,)).await
    }

    /// See [`MainThreadCommands::unregister_command`].
    ///
    /// # Errors
    ///
    /// Returns the RPC or callee error.
    pub async fn unregister_command(&self, id: &str) -> RpcResult<()> {
        self.proxy.call("unregister_command", (id,)).await
    }

    /// See [`MainThreadCommands::execute_command`].
    ///
    /// # Errors
    ///
    /// Returns the RPC or callee error.
    pub async fn execute_command(&self, id: &str, args: Vec<Value>) -> RpcResult<Value> {
        self.proxy.call("execute_command", (id, args)).await
    }

    /// See [`MainThreadCommands::get_commands`].
    ///
    /// # Errors
    ///
    /// Returns the RPC or callee error.
    pub async fn get_commands(&self) -> RpcResult<Vec<String>> {
        self.proxy.call("get_commands", ()).await
    }
}

/// Sandbox-side command handlers as seen from the host.
#[async_trait]
pub trait ExtHostCommands: Send + Sync {
    /// Run a command the sandbox registered.
    async fn execute_contributed_command(
        &self,
        id: String,
        args: Vec<Value>,
    ) -> Result<Value, RemoteError>;
}

/// Binds [`EXT_HOST_COMMANDS`] to [`ExtHostCommands`].
#[derive(Debug)]
pub struct ExtHostCommandsInterface;

/// Sandbox command handlers.
pub const EXT_HOST_COMMANDS: ProxyIdentifier<ExtHostCommandsInterface> =
    ProxyIdentifier::new("ExtHostCommands");

impl RemoteInterface for ExtHostCommandsInterface {
    type Server = dyn ExtHostCommands;
    type Client = ExtHostCommandsClient;

    fn client(proxy: Proxy) -> Self::Client {
        ExtHostCommandsClient { proxy }
    }

    fn dispatch<'a>(
        server: &'a Self::Server,
        method: &'a str,
        args: Value,
    ) -> BoxFuture<'a, Result<Value, RemoteError>> {
        async move {
            match method {
                "execute_contributed_command" => {
                    let (id, args): (String, Vec<Value>) = decode_args(method, args)?;
                    server.execute_contributed_command(id, args).await
                },
                other => Err(RemoteError::unknown_method(EXT_HOST_COMMANDS.name(), other)),
            }
        }
        .boxed()
    }
}

/// Typed client for [`EXT_HOST_COMMANDS`].
#[derive(Debug, Clone)]
pub struct ExtHostCommandsClient {
    proxy: Proxy,
}

impl ExtHostCommandsClient {
    /// See [`ExtHostCommands::execute_contributed_command`].
    ///
    /// # Errors
    ///
    /// Returns the RPC or callee error.
    pub async fn execute_contributed_command(
        &self,
        id: &str,
        args: Vec<Value>,
    ) -> RpcResult<Value> {
        self.proxy
            .call("execute_contributed_command", (id, args))
            .await
    }
}
