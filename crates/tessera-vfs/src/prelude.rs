//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tessera_vfs::prelude::*;` to import all essential types.

// Errors
pub use crate::{FallthroughError, FsError, FsResult};

// SPI
pub use crate::{FileSystemProvider, FileSystemRegistry, LayeredFileSystem};

// Stores
pub use crate::{
    DirectoryFileSystemProvider, KvFileSystemProvider, MemoryFileSystemProvider,
    RegisteredFileProvider, VirtualFile,
};

// Values
pub use crate::{
    DeleteOptions, FileChange, FileStat, FileSystemCapabilities, FileType, RenameOptions,
    WriteOptions,
};
