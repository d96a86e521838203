//! Mock implementations for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tessera_core::Uri;
use tessera_events::Emitter;
use tessera_vfs::{
    DeleteOptions, DirEntry, FileChange, FileStat, FileSystemCapabilities, FileSystemProvider,
    FileType, FsError, FsResult, RenameOptions, WriteOptions,
};
use tracing::trace;

/// A call observed by a [`ScriptedProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    /// `stat(path)`.
    Stat(String),
    /// `read_file(path)`.
    ReadFile(String),
    /// `write_file(path, content)`.
    WriteFile(String, Vec<u8>),
    /// `readdir(path)`.
    Readdir(String),
    /// `mkdir(path)`.
    Mkdir(String),
    /// `delete(path)`.
    Delete(String),
    /// `rename(from, to)`.
    Rename(String, String),
}

impl ProviderCall {
    /// Path the call was made against (the source for renames).
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Stat(p)
            | Self::ReadFile(p)
            | Self::WriteFile(p, _)
            | Self::Readdir(p)
            | Self::Mkdir(p)
            | Self::Delete(p)
            | Self::Rename(p, _) => p,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A [`FileSystemProvider`] with scripted files and per-path failures.
///
/// Directories are implied by the files below them. Every call is recorded
/// so tests can assert which delegates a layered filesystem consulted.
#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    capabilities: FileSystemCapabilities,
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, FsError>>,
    calls: Mutex<Vec<ProviderCall>>,
    changes: Emitter<Vec<FileChange>>,
}

impl ScriptedProvider {
    /// An empty, writable provider. `name` shows up in trace logs.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: FileSystemCapabilities::READWRITE,
            files: Mutex::new(BTreeMap::new()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            changes: Emitter::new(),
        }
    }

    /// Flag the whole provider read-only.
    #[must_use]
    pub fn readonly(mut self) -> Self {
        self.capabilities = FileSystemCapabilities::READONLY;
        self
    }

    /// Seed a file.
    #[must_use]
    pub fn with_file(self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        lock(&self.files).insert(path.to_string(), content.into());
        self
    }

    /// Fail every call against `path` with `error`.
    #[must_use]
    pub fn with_failure(self, path: &str, error: FsError) -> Self {
        self.fail(path, error);
        self
    }

    /// Fail every later call against `path` with `error`.
    pub fn fail(&self, path: &str, error: FsError) {
        lock(&self.failures).insert(path.to_string(), error);
    }

    /// Stop failing calls against `path`.
    pub fn heal(&self, path: &str) {
        lock(&self.failures).remove(path);
    }

    /// Upcast for registration.
    #[must_use]
    pub fn shared(self) -> Arc<dyn FileSystemProvider> {
        Arc::new(self)
    }

    /// Calls observed so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ProviderCall> {
        lock(&self.calls).clone()
    }

    /// Forget observed calls.
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Current file contents at `path`.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.files).get(path).cloned()
    }

    /// Emit a change batch as if the backing store had changed.
    pub fn fire_change(&self, changes: Vec<FileChange>) {
        self.changes.fire(changes);
    }

    fn record(&self, call: ProviderCall) -> FsResult<()> {
        trace!(provider = %self.name, call = ?call, "scripted call");
        let failure = lock(&self.failures).get(call.path()).cloned();
        lock(&self.calls).push(call);
        failure.map_or(Ok(()), Err)
    }

    fn check_writable(&self, uri: &Uri) -> FsResult<()> {
        if self.capabilities.is_readonly() {
            return Err(FsError::no_permission(uri));
        }
        Ok(())
    }

    fn is_directory(files: &BTreeMap<String, Vec<u8>>, path: &str) -> bool {
        if path == "/" {
            return true;
        }
        let prefix = format!("{path}/");
        files.keys().any(|k| k.starts_with(&prefix))
    }
}

#[async_trait]
impl FileSystemProvider for ScriptedProvider {
    fn capabilities(&self) -> FileSystemCapabilities {
        self.capabilities
    }

    fn on_did_change_file(&self) -> &Emitter<Vec<FileChange>> {
        &self.changes
    }

    async fn stat(&self, uri: &Uri) -> FsResult<FileStat> {
        self.record(ProviderCall::Stat(uri.path().to_string()))?;
        let files = lock(&self.files);
        if let Some(content) = files.get(uri.path()) {
            return Ok(FileStat::file(content.len() as u64, 0, 0));
        }
        if Self::is_directory(&files, uri.path()) {
            return Ok(FileStat::directory(0, 0));
        }
        Err(FsError::not_found(uri))
    }

    async fn read_file(&self, uri: &Uri) -> FsResult<Vec<u8>> {
        self.record(ProviderCall::ReadFile(uri.path().to_string()))?;
        let files = lock(&self.files);
        match files.get(uri.path()) {
            Some(content) => Ok(content.clone()),
            None if Self::is_directory(&files, uri.path()) => {
                Err(FsError::FileIsADirectory(uri.to_string()))
            },
            None => Err(FsError::not_found(uri)),
        }
    }

    async fn write_file(&self, uri: &Uri, content: &[u8], options: WriteOptions) -> FsResult<()> {
        self.record(ProviderCall::WriteFile(uri.path().to_string(), content.to_vec()))?;
        self.check_writable(uri)?;
        let mut files = lock(&self.files);
        let exists = files.contains_key(uri.path());
        if exists && !options.overwrite {
            return Err(FsError::FileExists(uri.to_string()));
        }
        if !exists && !options.create {
            return Err(FsError::not_found(uri));
        }
        files.insert(uri.path().to_string(), content.to_vec());
        Ok(())
    }

    async fn readdir(&self, uri: &Uri) -> FsResult<Vec<DirEntry>> {
        self.record(ProviderCall::Readdir(uri.path().to_string()))?;
        let files = lock(&self.files);
        if !Self::is_directory(&files, uri.path()) {
            return Err(FsError::not_found(uri));
        }
        let prefix = if uri.path() == "/" {
            "/".to_string()
        } else {
            format!("{}/", uri.path())
        };
        let mut entries: BTreeMap<String, FileType> = BTreeMap::new();
        for key in files.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    entries.insert(dir.to_string(), FileType::Directory);
                },
                None => {
                    entries.entry(rest.to_string()).or_insert(FileType::File);
                },
            }
        }
        Ok(entries.into_iter().collect())
    }

    async fn mkdir(&self, uri: &Uri) -> FsResult<()> {
        self.record(ProviderCall::Mkdir(uri.path().to_string()))?;
        self.check_writable(uri)
    }

    async fn delete(&self, uri: &Uri, _options: DeleteOptions) -> FsResult<()> {
        self.record(ProviderCall::Delete(uri.path().to_string()))?;
        self.check_writable(uri)?;
        match lock(&self.files).remove(uri.path()) {
            Some(_) => Ok(()),
            None => Err(FsError::not_found(uri)),
        }
    }

    async fn rename(&self, from: &Uri, to: &Uri, options: RenameOptions) -> FsResult<()> {
        self.record(ProviderCall::Rename(
            from.path().to_string(),
            to.path().to_string(),
        ))?;
        self.check_writable(from)?;
        let mut files = lock(&self.files);
        if files.contains_key(to.path()) && !options.overwrite {
            return Err(FsError::FileExists(to.to_string()));
        }
        let content = files
            .remove(from.path())
            .ok_or_else(|| FsError::not_found(from))?;
        files.insert(to.path().to_string(), content);
        Ok(())
    }
}
