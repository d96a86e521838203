//! Priority-ordered composition of delegate stores behind one filesystem.
//!
//! Reads try delegates highest priority first and move on after a
//! fallthrough error. Writes do the same but skip read-only delegates, and
//! a write that no delegate accepts fails with `NoPermission`. Directory
//! listings merge every delegate, higher priority winning on name clashes.
//! Change events from all delegates come out of one stream.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tessera_core::{Disposable, Uri};
use tessera_events::Emitter;
use tracing::{debug, trace};

use crate::error::{FsError, FsResult};
use crate::provider::FileSystemProvider;
use crate::types::{
    DeleteOptions, DirEntry, FileChange, FileStat, FileSystemCapabilities, FileType,
    RenameOptions, WatchOptions, WriteOptions,
};

type SharedProvider = Arc<dyn FileSystemProvider>;

struct Delegate {
    id: u64,
    priority: i32,
    provider: SharedProvider,
    forwarding: Disposable,
}

#[derive(Default)]
struct Delegates {
    /// Always sorted by descending priority; equal priorities keep
    /// attach order.
    entries: RwLock<Vec<Delegate>>,
    next_id: AtomicU64,
}

impl Delegates {
    fn snapshot(&self) -> Vec<(i32, SharedProvider)> {
        let collect = |entries: &Vec<Delegate>| {
            entries
                .iter()
                .map(|d| (d.priority, Arc::clone(&d.provider)))
                .collect()
        };
        match self.entries.read() {
            Ok(entries) => collect(&entries),
            Err(poisoned) => collect(&poisoned.into_inner()),
        }
    }

    fn with_entries<R>(&self, f: impl FnOnce(&mut Vec<Delegate>) -> R) -> R {
        match self.entries.write() {
            Ok(mut entries) => f(&mut entries),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

/// A filesystem composed of prioritized delegate stores.
pub struct LayeredFileSystem {
    delegates: Arc<Delegates>,
    changes: Emitter<Vec<FileChange>>,
}

impl std::fmt::Debug for LayeredFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredFileSystem")
            .field("priorities", &self.priorities())
            .finish()
    }
}

impl Default for LayeredFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl LayeredFileSystem {
    /// A filesystem with no delegates; every request fails `Unavailable`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            delegates: Arc::new(Delegates::default()),
            changes: Emitter::new(),
        }
    }

    /// Attach `provider` at `priority`. Disposing the handle detaches it.
    pub fn register(&self, priority: i32, provider: SharedProvider) -> Disposable {
        let sink = self.changes.clone();
        let forwarding = provider.on_did_change_file().on(move |batch| {
            sink.fire(batch.clone());
        });

        let id = self.delegates.next_id.fetch_add(1, Ordering::Relaxed);
        let count = self.delegates.with_entries(|entries| {
            entries.push(Delegate {
                id,
                priority,
                provider,
                forwarding,
            });
            entries.sort_by(|a, b| b.priority.cmp(&a.priority));
            entries.len()
        });
        debug!(priority, delegates = count, "filesystem delegate attached");

        let delegates = Arc::downgrade(&self.delegates);
        Disposable::new(move || {
            let Some(delegates) = delegates.upgrade() else {
                return;
            };
            let removed = delegates.with_entries(|entries| {
                let index = entries.iter().position(|d| d.id == id)?;
                let removed = entries.remove(index);
                entries.sort_by(|a, b| b.priority.cmp(&a.priority));
                Some(removed)
            });
            if let Some(delegate) = removed {
                delegate.forwarding.dispose();
                debug!(priority = delegate.priority, "filesystem delegate detached");
            }
        })
    }

    /// Attached priorities, in iteration order.
    #[must_use]
    pub fn priorities(&self) -> Vec<i32> {
        self.delegates.snapshot().into_iter().map(|(p, _)| p).collect()
    }

    /// Number of attached delegates.
    #[must_use]
    pub fn delegate_count(&self) -> usize {
        self.delegates.snapshot().len()
    }

    async fn read_through<T: Send>(
        &self,
        uri: &Uri,
        op: impl Fn(SharedProvider) -> BoxFuture<'static, FsResult<T>> + Send,
    ) -> FsResult<T> {
        let mut first_error = None;
        for (priority, provider) in self.delegates.snapshot() {
            match op(provider).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_fallthrough() => {
                    trace!(uri = %uri, priority, error = %e, "delegate fell through");
                    first_error.get_or_insert(e);
                },
                Err(e) => return Err(e),
            }
        }
        Err(first_error.unwrap_or_else(|| FsError::unavailable(uri)))
    }

    async fn write_through<T: Send>(
        &self,
        uri: &Uri,
        op: impl Fn(SharedProvider) -> BoxFuture<'static, FsResult<T>> + Send,
    ) -> FsResult<T> {
        for (priority, provider) in self.delegates.snapshot() {
            if provider.capabilities().is_readonly() {
                trace!(uri = %uri, priority, "skipping read-only delegate");
                continue;
            }
            match op(provider).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_fallthrough() => {
                    trace!(uri = %uri, priority, error = %e, "delegate refused write");
                },
                Err(e) => return Err(e),
            }
        }
        debug!(uri = %uri, "no delegate accepted the write");
        Err(FsError::no_permission(uri))
    }
}

#[async_trait]
impl FileSystemProvider for LayeredFileSystem {
    fn capabilities(&self) -> FileSystemCapabilities {
        let delegates = self.delegates.snapshot();
        let mut caps = if delegates
            .iter()
            .any(|(_, p)| !p.capabilities().is_readonly())
        {
            FileSystemCapabilities::READWRITE
        } else {
            FileSystemCapabilities::READONLY
        };
        if !delegates.is_empty()
            && delegates
                .iter()
                .all(|(_, p)| p.capabilities().contains(FileSystemCapabilities::CASE_SENSITIVE))
        {
            caps |= FileSystemCapabilities::CASE_SENSITIVE;
        }
        caps
    }

    fn on_did_change_file(&self) -> &Emitter<Vec<FileChange>> {
        &self.changes
    }

    fn watch(&self, uri: &Uri, options: &WatchOptions) -> Disposable {
        let handles: Vec<Disposable> = self
            .delegates
            .snapshot()
            .into_iter()
            .map(|(_, p)| p.watch(uri, options))
            .collect();
        Disposable::new(move || {
            for handle in handles {
                handle.dispose();
            }
        })
    }

    /// Files served by a read-only delegate report the per-file read-only
    /// bit even if the delegate itself does not set it.
    async fn stat(&self, uri: &Uri) -> FsResult<FileStat> {
        self.read_through(uri, |p| {
            let uri = uri.clone();
            Box::pin(async move {
                let readonly = p.capabilities().is_readonly();
                let stat = p.stat(&uri).await?;
                Ok(if readonly { stat.readonly() } else { stat })
            })
        })
        .await
    }

    async fn read_file(&self, uri: &Uri) -> FsResult<Vec<u8>> {
        self.read_through(uri, |p| {
            let uri = uri.clone();
            Box::pin(async move { p.read_file(&uri).await })
        })
        .await
    }

    async fn write_file(&self, uri: &Uri, content: &[u8], options: WriteOptions) -> FsResult<()> {
        match self.stat(uri).await {
            Ok(stat) if stat.is_readonly() => {
                debug!(uri = %uri, "write refused, file is read-only");
                return Err(FsError::no_permission(uri));
            },
            Ok(_) => {},
            Err(e) if e.is_fallthrough() => {},
            Err(e) => return Err(e),
        }
        let content: Arc<[u8]> = Arc::from(content);
        self.write_through(uri, |p| {
            let uri = uri.clone();
            let content = Arc::clone(&content);
            Box::pin(async move { p.write_file(&uri, &content, options).await })
        })
        .await
    }

    async fn readdir(&self, uri: &Uri) -> FsResult<Vec<DirEntry>> {
        let mut merged: BTreeMap<String, FileType> = BTreeMap::new();
        let mut any_success = false;
        let mut first_error = None;
        for (priority, provider) in self.delegates.snapshot() {
            match provider.readdir(uri).await {
                Ok(entries) => {
                    any_success = true;
                    for (name, kind) in entries {
                        merged.entry(name).or_insert(kind);
                    }
                },
                Err(e) if e.is_fallthrough() => {
                    trace!(uri = %uri, priority, error = %e, "delegate has no listing");
                    first_error.get_or_insert(e);
                },
                Err(e) => return Err(e),
            }
        }
        if any_success {
            Ok(merged.into_iter().collect())
        } else {
            Err(first_error.unwrap_or_else(|| FsError::unavailable(uri)))
        }
    }

    async fn mkdir(&self, uri: &Uri) -> FsResult<()> {
        self.write_through(uri, |p| {
            let uri = uri.clone();
            Box::pin(async move { p.mkdir(&uri).await })
        })
        .await
    }

    async fn delete(&self, uri: &Uri, options: DeleteOptions) -> FsResult<()> {
        self.write_through(uri, |p| {
            let uri = uri.clone();
            Box::pin(async move { p.delete(&uri, options).await })
        })
        .await
    }

    async fn rename(&self, from: &Uri, to: &Uri, options: RenameOptions) -> FsResult<()> {
        self.write_through(from, |p| {
            let from = from.clone();
            let to = to.clone();
            Box::pin(async move { p.rename(&from, &to, options).await })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFileSystemProvider;

    fn uri(path: &str) -> Uri {
        Uri::file(path)
    }

    fn memory() -> Arc<MemoryFileSystemProvider> {
        Arc::new(MemoryFileSystemProvider::new())
    }

    #[tokio::test]
    async fn no_delegates_is_unavailable() {
        let fs = LayeredFileSystem::new();
        let err = fs.read_file(&uri("/a")).await.unwrap_err();
        assert_eq!(err.code(), "Unavailable");
        assert_eq!(fs.readdir(&uri("/")).await.unwrap_err().code(), "Unavailable");
    }

    #[tokio::test]
    async fn delegates_sorted_by_priority() {
        let fs = LayeredFileSystem::new();
        let _a = fs.register(0, memory());
        let b = fs.register(5, memory());
        let _c = fs.register(-1, memory());
        let _d = fs.register(5, memory());
        assert_eq!(fs.priorities(), vec![5, 5, 0, -1]);
        b.dispose();
        assert_eq!(fs.priorities(), vec![5, 0, -1]);
    }

    #[tokio::test]
    async fn higher_priority_shadows_lower() {
        let fs = LayeredFileSystem::new();
        let low = memory();
        let high = memory();
        low.insert_file("/a.txt", "low");
        high.insert_file("/a.txt", "high");
        low.insert_file("/only-low.txt", "x");
        fs.register(0, low);
        let handle = fs.register(1, high);

        assert_eq!(fs.read_file(&uri("/a.txt")).await.unwrap(), b"high");
        assert_eq!(fs.read_file(&uri("/only-low.txt")).await.unwrap(), b"x");

        handle.dispose();
        assert_eq!(fs.read_file(&uri("/a.txt")).await.unwrap(), b"low");
    }

    #[tokio::test]
    async fn readonly_store_and_memory() {
        let fs = LayeredFileSystem::new();
        let readonly = Arc::new(MemoryFileSystemProvider::new_readonly());
        readonly.insert_file("/a.txt", "hi");
        let scratch = memory();
        fs.register(1, readonly);
        fs.register(0, Arc::clone(&scratch) as SharedProvider);

        assert_eq!(fs.read_file(&uri("/a.txt")).await.unwrap(), b"hi");
        let err = fs
            .write_file(&uri("/a.txt"), b"x", WriteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NoPermissions");
        fs.write_file(&uri("/b.txt"), b"x", WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(scratch.read_file(&uri("/b.txt")).await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn per_file_readonly_blocks_lower_store() {
        let fs = LayeredFileSystem::new();
        let high = memory();
        high.insert_file("/locked.txt", "v1");
        high.set_file_readonly("/locked.txt", true).unwrap();
        let low = memory();
        fs.register(1, Arc::clone(&high) as SharedProvider);
        fs.register(0, Arc::clone(&low) as SharedProvider);

        let err = fs
            .write_file(&uri("/locked.txt"), b"v2", WriteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NoPermissions");
        assert!(low.stat(&uri("/locked.txt")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn fatal_errors_stop_the_read() {
        let fs = LayeredFileSystem::new();
        let high = memory();
        high.insert_file("/d/x", "");
        let low = memory();
        low.insert_file("/d", "a file in the low store");
        fs.register(1, high);
        fs.register(0, low);

        let err = fs.read_file(&uri("/d")).await.unwrap_err();
        assert_eq!(err, FsError::FileIsADirectory("file:///d".into()));
    }

    #[tokio::test]
    async fn first_fallthrough_error_is_reported() {
        let fs = LayeredFileSystem::new();
        fs.register(1, Arc::new(MemoryFileSystemProvider::new_readonly()));
        fs.register(0, memory());
        let err = fs.read_file(&uri("/missing")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn readdir_merges_all_delegates() {
        let fs = LayeredFileSystem::new();
        let high = memory();
        high.insert_file("/shared/x", "");
        high.insert_file("/high.txt", "");
        let low = memory();
        low.insert_file("/shared", "low has a file here");
        low.insert_file("/low.txt", "");
        fs.register(1, high);
        fs.register(0, low);

        assert_eq!(
            fs.readdir(&uri("/")).await.unwrap(),
            vec![
                ("high.txt".to_owned(), FileType::File),
                ("low.txt".to_owned(), FileType::File),
                ("shared".to_owned(), FileType::Directory),
            ]
        );
    }

    #[tokio::test]
    async fn write_falls_through_to_next_writable() {
        let fs = LayeredFileSystem::new();
        let high = memory();
        let low = memory();
        low.insert_file("/only-low/keep", "");
        fs.register(1, Arc::clone(&high) as SharedProvider);
        fs.register(0, Arc::clone(&low) as SharedProvider);

        // The high store lacks the parent directory and reports NotFound.
        fs.write_file(&uri("/only-low/new.txt"), b"n", WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(low.read_file(&uri("/only-low/new.txt")).await.unwrap(), b"n");
    }

    #[tokio::test]
    async fn changes_forwarded_until_detach() {
        let fs = LayeredFileSystem::new();
        let store = memory();
        let handle = fs.register(0, Arc::clone(&store) as SharedProvider);
        let mut rx = fs.on_did_change_file().subscribe();

        store
            .write_file(&uri("/a"), b"1", WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(*rx.recv().await.unwrap(), vec![FileChange::created(uri("/a"))]);

        handle.dispose();
        store
            .write_file(&uri("/b"), b"1", WriteOptions::default())
            .await
            .unwrap();
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn capabilities_follow_delegates() {
        let fs = LayeredFileSystem::new();
        assert!(fs.capabilities().is_readonly());
        let handle = fs.register(0, Arc::new(MemoryFileSystemProvider::new_readonly()));
        assert!(fs.capabilities().is_readonly());
        fs.register(1, memory());
        assert!(!fs.capabilities().is_readonly());
        handle.dispose();
        assert!(
            fs.capabilities()
                .contains(FileSystemCapabilities::CASE_SENSITIVE)
        );
    }
}
