//! Tessera Test - shared test utilities for the Tessera host.
//!
//! Add as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! tessera-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use tessera_test::{ScriptedProvider, test_uri};
//! use tessera_vfs::{FsError, LayeredFileSystem};
//!
//! #[tokio::test]
//! async fn broken_delegate_stops_reads() {
//!     let broken = ScriptedProvider::new("broken")
//!         .with_failure("/a.txt", FsError::Unknown("disk on fire".into()));
//!     let layered = LayeredFileSystem::new();
//!     let _handle = layered.register(10, broken.shared());
//!     assert!(layered.read_file(&test_uri("/a.txt")).await.is_err());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
