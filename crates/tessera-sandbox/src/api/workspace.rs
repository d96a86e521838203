use std::sync::Arc;

use tessera_capabilities::{CapabilityName, CapabilitySet};
use tessera_core::Uri;
use tessera_vfs::{DeleteOptions, DirEntry, FileStat, FsResult, RenameOptions, WriteOptions};

use crate::capabilities::{ExtHostDocuments, ExtHostFileSystem, TextDocument};
use crate::error::{SandboxError, SandboxResult};

/// `workspace.fs`: filesystem calls with editor-style defaults.
#[derive(Debug, Clone)]
pub struct FileSystemApi {
    fs: Arc<ExtHostFileSystem>,
}

impl FileSystemApi {
    /// Metadata for `uri`.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn stat(&self, uri: &Uri) -> FsResult<FileStat> {
        self.fs.stat(uri).await
    }

    /// Whole-file read.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn read_file(&self, uri: &Uri) -> FsResult<Vec<u8>> {
        self.fs.read_file(uri).await
    }

    /// Create or overwrite a file.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn write_file(&self, uri: &Uri, content: &[u8]) -> FsResult<()> {
        self.fs
            .write_file(uri, content, WriteOptions::default())
            .await
    }

    /// Directory listing.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn read_directory(&self, uri: &Uri) -> FsResult<Vec<DirEntry>> {
        self.fs.readdir(uri).await
    }

    /// Create a directory.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn create_directory(&self, uri: &Uri) -> FsResult<()> {
        self.fs.mkdir(uri).await
    }

    /// Delete a file or directory.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn delete(&self, uri: &Uri, recursive: bool) -> FsResult<()> {
        self.fs.delete(uri, DeleteOptions { recursive }).await
    }

    /// Move a file or directory.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn rename(&self, from: &Uri, to: &Uri, overwrite: bool) -> FsResult<()> {
        self.fs.rename(from, to, RenameOptions { overwrite }).await
    }
}

/// `workspace` namespace of the extension API.
#[derive(Debug, Clone)]
pub struct WorkspaceApi {
    fs: FileSystemApi,
    documents: Arc<ExtHostDocuments>,
    scheme: String,
}

impl WorkspaceApi {
    pub(crate) fn create(resolved: &CapabilitySet, scheme: &str) -> SandboxResult<Self> {
        Ok(Self {
            fs: FileSystemApi {
                fs: resolved.require(CapabilityName::FileSystem)?,
            },
            documents: resolved.require(CapabilityName::Documents)?,
            scheme: scheme.to_string(),
        })
    }

    /// Filesystem access.
    #[must_use]
    pub fn fs(&self) -> &FileSystemApi {
        &self.fs
    }

    /// URI for `path` on the default scheme.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Config`] if the configured scheme is invalid.
    pub fn uri(&self, path: &str) -> SandboxResult<Uri> {
        Uri::new(self.scheme.as_str(), "", path).map_err(|e| SandboxError::Config(e.to_string()))
    }

    /// Open `uri` as a text document.
    ///
    /// # Errors
    ///
    /// Returns the filesystem error or
    /// [`SandboxError::InvalidDocument`] for non-UTF-8 content.
    pub async fn open_text_document(&self, uri: &Uri) -> SandboxResult<Arc<TextDocument>> {
        self.documents.open_text_document(uri).await
    }

    /// Currently open documents.
    #[must_use]
    pub fn text_documents(&self) -> Vec<Arc<TextDocument>> {
        self.documents.text_documents()
    }
}
