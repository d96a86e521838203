//! Tessera VFS - the layered virtual filesystem.
//!
//! Building blocks, leaves first:
//!
//! - [`VirtualFile`]: one in-memory file that announces its own changes
//! - [`FileSystemProvider`]: the SPI every backing store implements
//! - Stores: [`MemoryFileSystemProvider`], [`RegisteredFileProvider`],
//!   [`DirectoryFileSystemProvider`], [`KvFileSystemProvider`]
//! - [`LayeredFileSystem`]: priority-ordered composition of stores
//! - [`FileSystemRegistry`]: scheme routing, with the default scheme served
//!   by a layered filesystem
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tessera_core::Uri;
//! use tessera_vfs::{FileSystemRegistry, MemoryFileSystemProvider, WriteOptions};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tessera_vfs::FsError> {
//! let registry = FileSystemRegistry::default();
//!
//! let defaults = Arc::new(MemoryFileSystemProvider::new_readonly());
//! defaults.insert_file("/settings.json", "{}");
//! registry.register_delegate(1, defaults);
//!
//! let settings = Uri::file("/settings.json");
//! assert_eq!(registry.read_file(&settings).await?, b"{}");
//! assert!(registry.write_file(&settings, b"[]", WriteOptions::default()).await.is_err());
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

/// Filesystem error taxonomy.
pub mod error;
/// Value types shared by providers.
pub mod types;

mod directory;
mod file;
mod kv;
mod layered;
mod memory;
mod path;
mod provider;
mod registered;
mod registry;

pub use directory::DirectoryFileSystemProvider;
pub use error::{FallthroughError, FsError, FsResult};
pub use file::{VirtualFile, VirtualFileEvent};
pub use kv::KvFileSystemProvider;
pub use layered::LayeredFileSystem;
pub use memory::MemoryFileSystemProvider;
pub use provider::FileSystemProvider;
pub use registered::RegisteredFileProvider;
pub use registry::{DEFAULT_MEMORY_PRIORITY, FileSystemRegistry};
pub use types::{
    DeleteOptions, DirEntry, FileChange, FileChangeKind, FilePermission, FileStat,
    FileSystemCapabilities, FileType, RenameOptions, WatchOptions, WriteOptions,
};
