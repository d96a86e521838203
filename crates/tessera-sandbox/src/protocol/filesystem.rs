use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tessera_core::Uri;
use tessera_rpc::{
    ProxyIdentifier, Proxy, RemoteError, RemoteInterface, RpcError, decode_args, encode_result,
};
use tessera_vfs::{
    DeleteOptions, DirEntry, FileStat, FsError, FsResult, RenameOptions, WriteOptions,
};

/// Marshal a filesystem error, keeping its code.
#[must_use]
pub fn fs_error_to_remote(err: &FsError) -> RemoteError {
    RemoteError::new(err.code(), err.detail())
}

/// Rebuild a filesystem error from a failed call. A channel that went away
/// reads as `Unavailable`.
#[must_use]
pub fn fs_error_from_rpc(err: RpcError) -> FsError {
    match err {
        RpcError::Remote(remote) => FsError::from_code(&remote.code, remote.message),
        RpcError::Disposed | RpcError::Closed => FsError::unavailable(err),
        other => FsError::Unknown(other.to_string()),
    }
}

fn decode_content(method: &str, encoded: &str) -> Result<Vec<u8>, RemoteError> {
    BASE64
        .decode(encoded)
        .map_err(|e| RemoteError::invalid_arguments(method, e))
}

/// The host filesystem as seen from the sandbox.
#[async_trait]
pub trait MainThreadFileSystem: Send + Sync {
    /// Metadata for `uri`.
    async fn stat(&self, uri: Uri) -> Result<FileStat, RemoteError>;
    /// Whole-file read.
    async fn read_file(&self, uri: Uri) -> Result<Vec<u8>, RemoteError>;
    /// Whole-file write.
    async fn write_file(
        &self,
        uri: Uri,
        content: Vec<u8>,
        options: WriteOptions,
    ) -> Result<(), RemoteError>;
    /// Directory listing.
    async fn readdir(&self, uri: Uri) -> Result<Vec<DirEntry>, RemoteError>;
    /// Create a directory.
    async fn mkdir(&self, uri: Uri) -> Result<(), RemoteError>;
    /// Delete a file or directory.
    async fn delete(&self, uri: Uri, options: DeleteOptions) -> Result<(), RemoteError>;
    /// Move a file or directory.
    async fn rename(&self, from: Uri, to: Uri, options: RenameOptions)
    -> Result<(), RemoteError>;
}

/// Binds [`MAIN_THREAD_FILE_SYSTEM`] to [`MainThreadFileSystem`].
#[derive(Debug)]
pub struct MainThreadFileSystemInterface;

/// Host filesystem.
pub const MAIN_THREAD_FILE_SYSTEM: ProxyIdentifier<MainThreadFileSystemInterface> =
    ProxyIdentifier::new("MainThreadFileSystem");

impl RemoteInterface for MainThreadFileSystemInterface {
    type Server = dyn MainThreadFileSystem;
    type Client = MainThreadFileSystemClient;

    fn client(proxy: Proxy) -> Self::Client {
        MainThreadFileSystemClient { proxy }
    }

    fn dispatch<'a>(
        server: &'a Self::Server,
        method: &'a str,
        args: Value,
    ) -> BoxFuture<'a, Result<Value, RemoteError>> {
        async move {
            match method {
                "stat" => {
                    let (uri,): (Uri,) = decode_args(method, args)?;
                    encode_result(&server.stat(uri).await?)
                },
                "read_file" => {
                    let (uri,): (Uri,) = decode_args(method, args)?;
                    let content = server.read_file(uri).await?;
                    encode_result(&BASE64.encode(content))
                },
                "write_file" => {
                    let (uri, encoded, options): (Uri, String, WriteOptions) =
                        decode_args(method, args)?;
                    let content = decode_content(method, &encoded)?;
                    encode_result(&server.write_file(uri, content, options).await?)
                },
                "readdir" => {
                    let (uri,): (Uri,) = decode_args(method, args)?;
                    encode_result(&server.readdir(uri).await?)
                },
                "mkdir" => {
                    let (uri,): (Uri,) = decode_args(method, args)?;
                    encode_result(&server.mkdir(uri).await?)
                },
                "delete" => {
                    let (uri, options): (Uri, DeleteOptions) = decode_args(method, args)?;
                    encode_result(&server.delete(uri, options).await?)
                },
                "rename" => {
                    let (from, to, options): (Uri, Uri, RenameOptions) =
                        decode_args(method, args)?;
                    encode_result(&server.rename(from, to, options).await?)
                },
                other => Err(RemoteError::unknown_method(
                    MAIN_THREAD_FILE_SYSTEM.name(),
                    other,
                )),
            }
        }
        .boxed()
    }
}

/// Typed client for [`MAIN_THREAD_FILE_SYSTEM`]. Failures come back as
/// [`FsError`] with their original kind.
#[derive(Debug, Clone)]
pub struct MainThreadFileSystemClient {
    proxy: Proxy,
}

impl MainThreadFileSystemClient {
    /// Metadata for `uri`.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn stat(&self, uri: &Uri) -> FsResult<FileStat> {
        self.proxy
            .call("stat", (uri,))
            .await
            .map_err(fs_error_from_rpc)
    }

    /// Whole-file read.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn read_file(&self, uri: &Uri) -> FsResult<Vec<u8>> {
        let encoded: String = self
            .proxy
            .call("read_file", (uri,))
            .await
            .map_err(fs_error_from_rpc)?;
        BASE64
            .decode(encoded)
            .map_err(|e| FsError::Unknown(format!("{uri}: {e}")))
    }

    /// Whole-file write.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn write_file(
        &self,
        uri: &Uri,
        content: &[u8],
        options: WriteOptions,
    ) -> FsResult<()> {
        self.proxy
            .call("write_file", (uri, BASE64.encode(content), options))
            .await
            .map_err(fs_error_from_rpc)
    }

    /// Directory listing.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn readdir(&self, uri: &Uri) -> FsResult<Vec<DirEntry>> {
        self.proxy
            .call("readdir", (uri,))
            .await
            .map_err(fs_error_from_rpc)
    }

    /// Create a directory.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn mkdir(&self, uri: &Uri) -> FsResult<()> {
        self.proxy
            .call("mkdir", (uri,))
            .await
            .map_err(fs_error_from_rpc)
    }

    /// Delete a file or directory.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn delete(&self, uri: &Uri, options: DeleteOptions) -> FsResult<()> {
        self.proxy
            .call("delete", (uri, options))
            .await
            .map_err(fs_error_from_rpc)
    }

    /// Move a file or directory.
    ///
    /// # Errors
    ///
    /// Returns the host's filesystem error.
    pub async fn rename(&self, from: &Uri, to: &Uri, options: RenameOptions) -> FsResult<()> {
        self.proxy
            .call("rename", (from, to, options))
            .await
            .map_err(fs_error_from_rpc)
    }
}
