//! Common imports for embedding a sandbox host.
//!
//! ```
//! use tessera_sandbox::prelude::*;
//! ```

pub use crate::{
    CommandHandler, CommandsApi, EnvApi, ExtensionApi, FileSystemApi, Memento, SandboxError,
    SandboxHost, SandboxHostBuilder, SandboxResult, StorageApi, TextDocument, WorkspaceApi,
    command_handler,
};
