use std::sync::Arc;

use async_trait::async_trait;
use tessera_core::Uri;
use tessera_rpc::RemoteError;
use tessera_vfs::{
    DeleteOptions, DirEntry, FileStat, FileSystemRegistry, FsError, RenameOptions, WriteOptions,
};
use tracing::trace;

use crate::protocol::{MainThreadFileSystem, fs_error_to_remote};

fn remote(err: FsError) -> RemoteError {
    fs_error_to_remote(&err)
}

/// Serves the host's [`FileSystemRegistry`] to the sandbox.
#[derive(Debug, Clone)]
pub struct HostFileSystem {
    registry: Arc<FileSystemRegistry>,
}

impl HostFileSystem {
    /// Serve `registry`.
    #[must_use]
    pub fn new(registry: Arc<FileSystemRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl MainThreadFileSystem for HostFileSystem {
    async fn stat(&self, uri: Uri) -> Result<FileStat, RemoteError> {
        trace!(uri = %uri, "stat");
        self.registry.stat(&uri).await.map_err(remote)
    }

    async fn read_file(&self, uri: Uri) -> Result<Vec<u8>, RemoteError> {
        trace!(uri = %uri, "read_file");
        self.registry.read_file(&uri).await.map_err(remote)
    }

    async fn write_file(
        &self,
        uri: Uri,
        content: Vec<u8>,
        options: WriteOptions,
    ) -> Result<(), RemoteError> {
        trace!(uri = %uri, bytes = content.len(), "write_file");
        self.registry
            .write_file(&uri, &content, options)
            .await
            .map_err(remote)
    }

    async fn readdir(&self, uri: Uri) -> Result<Vec<DirEntry>, RemoteError> {
        trace!(uri = %uri, "readdir");
        self.registry.readdir(&uri).await.map_err(remote)
    }

    async fn mkdir(&self, uri: Uri) -> Result<(), RemoteError> {
        trace!(uri = %uri, "mkdir");
        self.registry.mkdir(&uri).await.map_err(remote)
    }

    async fn delete(&self, uri: Uri, options: DeleteOptions) -> Result<(), RemoteError> {
        trace!(uri = %uri, recursive = options.recursive, "delete");
        self.registry.delete(&uri, options).await.map_err(remote)
    }

    async fn rename(
        &self,
        from: Uri,
        to: Uri,
        options: RenameOptions,
    ) -> Result<(), RemoteError> {
        trace!(from = %from, to = %to, "rename");
        self.registry
            .rename(&from, &to, options)
            .await
            .map_err(remote)
    }
}
