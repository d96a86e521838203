//! The filesystem provider SPI.

use async_trait::async_trait;
use tessera_core::{Disposable, Uri};
use tessera_events::Emitter;

use crate::error::FsResult;
use crate::types::{
    DeleteOptions, DirEntry, FileChange, FileStat, FileSystemCapabilities, RenameOptions,
    WatchOptions, WriteOptions,
};

/// A backing store for one logical filesystem.
///
/// Implementations report missing paths, refused writes, and paths they
/// cannot serve with the fallthrough errors so that a
/// [`LayeredFileSystem`](crate::LayeredFileSystem) can consult the next
/// delegate.
#[async_trait]
pub trait FileSystemProvider: Send + Sync {
    /// What this provider supports.
    fn capabilities(&self) -> FileSystemCapabilities;

    /// Batched change notifications.
    fn on_did_change_file(&self) -> &Emitter<Vec<FileChange>>;

    /// Start watching `uri`. Providers that report every change on their
    /// own return a no-op handle.
    fn watch(&self, _uri: &Uri, _options: &WatchOptions) -> Disposable {
        Disposable::noop()
    }

    /// Metadata for `uri`.
    async fn stat(&self, uri: &Uri) -> FsResult<FileStat>;

    /// Full contents of a file.
    async fn read_file(&self, uri: &Uri) -> FsResult<Vec<u8>>;

    /// Write a whole file.
    async fn write_file(&self, uri: &Uri, content: &[u8], options: WriteOptions) -> FsResult<()>;

    /// Children of a directory.
    async fn readdir(&self, uri: &Uri) -> FsResult<Vec<DirEntry>>;

    /// Create a directory. The parent must exist.
    async fn mkdir(&self, uri: &Uri) -> FsResult<()>;

    /// Remove a file or directory.
    async fn delete(&self, uri: &Uri, options: DeleteOptions) -> FsResult<()>;

    /// Move a file or directory.
    async fn rename(&self, from: &Uri, to: &Uri, options: RenameOptions) -> FsResult<()>;
}
