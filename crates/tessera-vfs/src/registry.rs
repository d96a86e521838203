//! Per-scheme provider map.
//!
//! One registry exists per host instance. The default scheme is always
//! served by a [`LayeredFileSystem`] whose priority-0 delegate is an
//! in-memory store, so collaborators can write files before any other
//! store attaches. Scheme registration is only open until
//! [`start`](FileSystemRegistry::start) is called; delegates may still be
//! layered into the default scheme afterwards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tessera_core::{Disposable, Uri};
use tracing::{debug, info};

use crate::error::{FsError, FsResult};
use crate::layered::LayeredFileSystem;
use crate::memory::MemoryFileSystemProvider;
use crate::provider::FileSystemProvider;
use crate::types::{DeleteOptions, DirEntry, FileStat, RenameOptions, WriteOptions};

/// Priority of the built-in in-memory delegate of the default scheme.
pub const DEFAULT_MEMORY_PRIORITY: i32 = 0;

/// Scheme → provider routing for one host.
pub struct FileSystemRegistry {
    default_scheme: String,
    layered: Arc<LayeredFileSystem>,
    memory: Arc<MemoryFileSystemProvider>,
    providers: Arc<RwLock<HashMap<String, Arc<dyn FileSystemProvider>>>>,
    started: AtomicBool,
}

impl std::fmt::Debug for FileSystemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemRegistry")
            .field("default_scheme", &self.default_scheme)
            .field("schemes", &self.schemes())
            .field("started", &self.is_started())
            .finish()
    }
}

impl Default for FileSystemRegistry {
    fn default() -> Self {
        Self::new(tessera_core::uri::DEFAULT_SCHEME)
    }
}

impl FileSystemRegistry {
    /// Create a registry whose `default_scheme` is a layered filesystem
    /// seeded with an in-memory delegate.
    pub fn new(default_scheme: impl Into<String>) -> Self {
        let default_scheme = default_scheme.into().to_ascii_lowercase();
        let layered = Arc::new(LayeredFileSystem::new());
        let memory = Arc::new(MemoryFileSystemProvider::new());
        // The built-in delegate lives as long as the registry.
        let _ = layered.register(
            DEFAULT_MEMORY_PRIORITY,
            Arc::clone(&memory) as Arc<dyn FileSystemProvider>,
        );

        let mut providers: HashMap<String, Arc<dyn FileSystemProvider>> = HashMap::new();
        providers.insert(
            default_scheme.clone(),
            Arc::clone(&layered) as Arc<dyn FileSystemProvider>,
        );

        Self {
            default_scheme,
            layered,
            memory,
            providers: Arc::new(RwLock::new(providers)),
            started: AtomicBool::new(false),
        }
    }

    /// The scheme served by the layered filesystem.
    #[must_use]
    pub fn default_scheme(&self) -> &str {
        &self.default_scheme
    }

    /// The layered filesystem behind the default scheme.
    #[must_use]
    pub fn layered(&self) -> &Arc<LayeredFileSystem> {
        &self.layered
    }

    /// The built-in in-memory delegate of the default scheme.
    #[must_use]
    pub fn memory(&self) -> &Arc<MemoryFileSystemProvider> {
        &self.memory
    }

    /// Layer `provider` into the default scheme at `priority`.
    pub fn register_delegate(
        &self,
        priority: i32,
        provider: Arc<dyn FileSystemProvider>,
    ) -> Disposable {
        self.layered.register(priority, provider)
    }

    /// Serve `scheme` with `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::RegistryStarted`] after [`start`](Self::start) and
    /// [`FsError::SchemeTaken`] if the scheme already has a provider.
    pub fn register_provider(
        &self,
        scheme: &str,
        provider: Arc<dyn FileSystemProvider>,
    ) -> FsResult<Disposable> {
        if self.is_started() {
            return Err(FsError::RegistryStarted);
        }
        let scheme = scheme.to_ascii_lowercase();
        {
            let mut providers = self
                .providers
                .write()
                .map_err(|e| FsError::Unknown(e.to_string()))?;
            if providers.contains_key(&scheme) {
                return Err(FsError::SchemeTaken(scheme));
            }
            providers.insert(scheme.clone(), provider);
        }
        debug!(scheme = %scheme, "filesystem provider registered");

        let providers = Arc::downgrade(&self.providers);
        Ok(Disposable::new(move || {
            if let Some(providers) = providers.upgrade()
                && let Ok(mut providers) = providers.write()
            {
                providers.remove(&scheme);
            }
        }))
    }

    /// Close scheme registration.
    pub fn start(&self) {
        if !self.started.swap(true, Ordering::AcqRel) {
            info!(schemes = ?self.schemes(), "filesystem registry started");
        }
    }

    /// True once [`start`](Self::start) ran.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Registered schemes, sorted.
    #[must_use]
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self
            .providers
            .read()
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        schemes.sort();
        schemes
    }

    /// The provider serving `scheme`.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if nothing serves the scheme.
    pub fn provider(&self, scheme: &str) -> FsResult<Arc<dyn FileSystemProvider>> {
        let scheme = scheme.to_ascii_lowercase();
        self.providers
            .read()
            .map_err(|e| FsError::Unknown(e.to_string()))?
            .get(&scheme)
            .cloned()
            .ok_or_else(|| FsError::unavailable(format!("{scheme}: no provider")))
    }

    /// Stat through the provider for `uri.scheme()`.
    ///
    /// # Errors
    ///
    /// Propagates the provider's error, or `Unavailable` for unknown schemes.
    pub async fn stat(&self, uri: &Uri) -> FsResult<FileStat> {
        self.provider(uri.scheme())?.stat(uri).await
    }

    /// Read through the provider for `uri.scheme()`.
    ///
    /// # Errors
    ///
    /// Propagates the provider's error, or `Unavailable` for unknown schemes.
    pub async fn read_file(&self, uri: &Uri) -> FsResult<Vec<u8>> {
        self.provider(uri.scheme())?.read_file(uri).await
    }

    /// Write through the provider for `uri.scheme()`.
    ///
    /// # Errors
    ///
    /// Propagates the provider's error, or `Unavailable` for unknown schemes.
    pub async fn write_file(
        &self,
        uri: &Uri,
        content: &[u8],
        options: WriteOptions,
    ) -> FsResult<()> {
        self.provider(uri.scheme())?
            .write_file(uri, content, options)
            .await
    }

    /// List through the provider for `uri.scheme()`.
    ///
    /// # Errors
    ///
    /// Propagates the provider's error, or `Unavailable` for unknown schemes.
    pub async fn readdir(&self, uri: &Uri) -> FsResult<Vec<DirEntry>> {
        self.provider(uri.scheme())?.readdir(uri).await
    }

    /// Create a directory through the provider for `uri.scheme()`.
    ///
    /// # Errors
    ///
    /// Propagates the provider's error, or `Unavailable` for unknown schemes.
    pub async fn mkdir(&self, uri: &Uri) -> FsResult<()> {
        self.provider(uri.scheme())?.mkdir(uri).await
    }

    /// Delete through the provider for `uri.scheme()`.
    ///
    /// # Errors
    ///
    /// Propagates the provider's error, or `Unavailable` for unknown schemes.
    pub async fn delete(&self, uri: &Uri, options: DeleteOptions) -> FsResult<()> {
        self.provider(uri.scheme())?.delete(uri, options).await
    }

    /// Rename within one scheme.
    ///
    /// # Errors
    ///
    /// Returns `Unknown` for cross-scheme moves, otherwise propagates the
    /// provider's error.
    pub async fn rename(&self, from: &Uri, to: &Uri, options: RenameOptions) -> FsResult<()> {
        if from.scheme() != to.scheme() {
            return Err(FsError::Unknown(format!(
                "cannot rename across schemes: {from} -> {to}"
            )));
        }
        self.provider(from.scheme())?
            .rename(from, to, options)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileSystemCapabilities;

    #[tokio::test]
    async fn default_scheme_is_writable_memory() {
        let registry = FileSystemRegistry::default();
        assert_eq!(registry.default_scheme(), "file");
        assert_eq!(registry.layered().priorities(), vec![DEFAULT_MEMORY_PRIORITY]);

        let uri = Uri::file("/scratch.txt");
        registry
            .write_file(&uri, b"x", WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(registry.read_file(&uri).await.unwrap(), b"x");
        assert!(registry.memory().stat(&uri).await.is_ok());
    }

    #[tokio::test]
    async fn custom_scheme_routing() {
        let registry = FileSystemRegistry::default();
        let untitled = Arc::new(MemoryFileSystemProvider::new());
        registry
            .register_provider("untitled", Arc::clone(&untitled) as Arc<dyn FileSystemProvider>)
            .unwrap();

        let uri = Uri::parse("untitled:/Untitled-1").unwrap();
        registry
            .write_file(&uri, b"draft", WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(untitled.read_file(&uri).await.unwrap(), b"draft");
        assert!(registry.memory().stat(&Uri::file("/Untitled-1")).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_and_late_registration() {
        let registry = FileSystemRegistry::default();
        let provider = || Arc::new(MemoryFileSystemProvider::new()) as Arc<dyn FileSystemProvider>;

        assert!(matches!(
            registry.register_provider("FILE", provider()),
            Err(FsError::SchemeTaken(_))
        ));
        registry.register_provider("mem", provider()).unwrap();
        registry.start();
        assert!(matches!(
            registry.register_provider("other", provider()),
            Err(FsError::RegistryStarted)
        ));
        assert_eq!(registry.schemes(), vec!["file", "mem"]);

        // Delegates still attach after start.
        let ro = Arc::new(MemoryFileSystemProvider::new_readonly());
        registry.register_delegate(3, ro);
        assert_eq!(registry.layered().priorities(), vec![3, 0]);
        assert!(
            registry
                .layered()
                .capabilities()
                .contains(FileSystemCapabilities::READWRITE)
        );
    }

    #[tokio::test]
    async fn unknown_scheme_unavailable() {
        let registry = FileSystemRegistry::default();
        let err = registry
            .read_file(&Uri::parse("ftp://host/a").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "Unavailable");
    }

    #[tokio::test]
    async fn dispose_frees_scheme() {
        let registry = FileSystemRegistry::default();
        let handle = registry
            .register_provider("mem", Arc::new(MemoryFileSystemProvider::new()))
            .unwrap();
        handle.dispose();
        assert_eq!(registry.schemes(), vec!["file"]);
    }
}
