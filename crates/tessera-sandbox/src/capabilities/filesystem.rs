use tessera_core::Uri;
use tessera_vfs::{
    DeleteOptions, DirEntry, FileStat, FsResult, RenameOptions, WriteOptions,
};

use crate::protocol::MainThreadFileSystemClient;

/// The host filesystem, reached over RPC.
#[derive(Debug, Clone)]
pub struct ExtHostFileSystem {
    client: MainThreadFileSystemClient,
}

impl ExtHostFileSystem {
    /// Wrap a host filesystem client.
    #[must_use]
    pub fn new(client: MainThreadFileSystemClient) -> Self {
        Self { client }
    }

    /// Metadata for `uri`.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn stat(&self, uri: &Uri) -> FsResult<FileStat> {
        self.client.stat(uri).await
    }

    /// True if `uri` exists. Other failures still surface.
    ///
    /// # Errors
    ///
    /// Returns errors other than not-found.
    pub async fn exists(&self, uri: &Uri) -> FsResult<bool> {
        match self.client.stat(uri).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whole-file read.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn read_file(&self, uri: &Uri) -> FsResult<Vec<u8>> {
        self.client.read_file(uri).await
    }

    /// Whole-file write.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn write_file(&self, uri: &Uri, content: &[u8], options: WriteOptions) -> FsResult<()> {
        self.client.write_file(uri, content, options).await
    }

    /// Directory listing.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn readdir(&self, uri: &Uri) -> FsResult<Vec<DirEntry>> {
        self.client.readdir(uri).await
    }

    /// Create a directory.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn mkdir(&self, uri: &Uri) -> FsResult<()> {
        self.client.mkdir(uri).await
    }

    /// Delete a file or directory.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn delete(&self, uri: &Uri, options: DeleteOptions) -> FsResult<()> {
        self.client.delete(uri, options).await
    }

    /// Move a file or directory.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn rename(&self, from: &Uri, to: &Uri, options: RenameOptions) -> FsResult<()> {
        self.client.rename(from, to, options).await
    }
}
