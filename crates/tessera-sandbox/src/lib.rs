//! Tessera Sandbox - the host/sandbox pair and the extension API.
//!
//! [`SandboxHost`] owns both ends of a loopback RPC pair. The host end serves
//! the command table and the layered filesystem; the sandbox end runs the
//! capability registry and hands each extension identity its own
//! [`ExtensionApi`].
//!
//! ```no_run
//! use tessera_sandbox::prelude::*;
//!
//! # async fn demo() -> SandboxResult<()> {
//! let host = SandboxHost::builder().build()?;
//! let api = host.api(None).await?;
//! let uri = api.workspace().uri("/hello.txt")?;
//! api.workspace().fs().write_file(&uri, b"hello").await?;
//! host.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod api;
pub mod capabilities;
pub mod host;
pub mod protocol;

mod bootstrap;
mod error;
mod logging;
mod mounts;

pub use api::{CommandsApi, EnvApi, ExtensionApi, FileSystemApi, StorageApi, WorkspaceApi};
pub use bootstrap::{SandboxHost, SandboxHostBuilder};
pub use capabilities::{Memento, StateStore, TextDocument};
pub use error::{SandboxError, SandboxResult};
pub use logging::init_logging;
pub use mounts::attach_mounts;
pub use protocol::{CommandHandler, command_handler};
