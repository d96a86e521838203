//! Provider persisting entries in a key-value namespace.
//!
//! Each file or directory is one JSON entry keyed by its normalized path.
//! The root directory is implicit. Mutations are serialized so that
//! check-then-write sequences stay consistent.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tessera_core::Uri;
use tessera_events::Emitter;
use tessera_storage::{ScopedKvStore, StorageError};
use tokio::sync::Mutex;
use tracing::trace;

use crate::error::{FsError, FsResult};
use crate::provider::FileSystemProvider;
use crate::types::{
    DeleteOptions, DirEntry, FileChange, FileStat, FileSystemCapabilities, FileType,
    RenameOptions, WriteOptions, now_millis,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    file_type: FileType,
    ctime: i64,
    mtime: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default)]
    readonly: bool,
}

impl Entry {
    fn directory(now: i64) -> Self {
        Self {
            file_type: FileType::Directory,
            ctime: now,
            mtime: now,
            content: None,
            readonly: false,
        }
    }

    fn file(content: &[u8], now: i64) -> Self {
        Self {
            file_type: FileType::File,
            ctime: now,
            mtime: now,
            content: Some(STANDARD.encode(content)),
            readonly: false,
        }
    }

    fn bytes(&self, uri: &Uri) -> FsResult<Vec<u8>> {
        STANDARD
            .decode(self.content.as_deref().unwrap_or_default())
            .map_err(|e| FsError::Unknown(format!("{uri}: corrupt entry: {e}")))
    }

    fn stat(&self) -> FileStat {
        let stat = match self.file_type {
            FileType::Directory => FileStat::directory(self.ctime, self.mtime),
            _ => {
                // base64 expands 3 bytes into 4 characters.
                let encoded = self.content.as_deref().map_or(0, str::len) as u64;
                let padding = self
                    .content
                    .as_deref()
                    .map_or(0, |c| c.bytes().rev().take_while(|b| *b == b'=').count())
                    as u64;
                let size = (encoded / 4).saturating_mul(3).saturating_sub(padding);
                FileStat::file(size, self.ctime, self.mtime)
            },
        };
        if self.readonly { stat.readonly() } else { stat }
    }
}

fn storage_error(uri: &Uri, err: &StorageError) -> FsError {
    FsError::Unknown(format!("{uri}: {err}"))
}

fn is_below(path: &str, dir: &str) -> bool {
    if dir == "/" {
        return path != "/";
    }
    path.strip_prefix(dir).is_some_and(|r| r.starts_with('/'))
}

/// A store whose entries live in a [`ScopedKvStore`].
pub struct KvFileSystemProvider {
    store: ScopedKvStore,
    readonly: bool,
    changes: Emitter<Vec<FileChange>>,
    write_lock: Mutex<()>,
    created: i64,
}

impl std::fmt::Debug for KvFileSystemProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvFileSystemProvider")
            .field("namespace", &self.store.namespace())
            .field("readonly", &self.readonly)
            .finish_non_exhaustive()
    }
}

impl KvFileSystemProvider {
    /// Serve the entries in `store`.
    #[must_use]
    pub fn new(store: ScopedKvStore) -> Self {
        Self {
            store,
            readonly: false,
            changes: Emitter::new(),
            write_lock: Mutex::new(()),
            created: now_millis(),
        }
    }

    /// Refuse every write.
    #[must_use]
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    fn check_writable(&self, uri: &Uri) -> FsResult<()> {
        if self.readonly {
            Err(FsError::no_permission(uri))
        } else {
            Ok(())
        }
    }

    async fn entry(&self, uri: &Uri) -> FsResult<Option<Entry>> {
        if uri.is_root() {
            return Ok(Some(Entry::directory(self.created)));
        }
        self.store
            .get_json::<Entry>(uri.path())
            .await
            .map_err(|e| storage_error(uri, &e))
    }

    async fn put(&self, uri: &Uri, entry: &Entry) -> FsResult<()> {
        self.store
            .set_json(uri.path(), entry)
            .await
            .map_err(|e| storage_error(uri, &e))
    }

    async fn require_parent_dir(&self, uri: &Uri) -> FsResult<()> {
        let Some(parent) = uri.parent() else {
            return Ok(());
        };
        match self.entry(&parent).await? {
            Some(e) if e.file_type == FileType::Directory => Ok(()),
            Some(_) => Err(FsError::FileNotADirectory(parent.to_string())),
            None => Err(FsError::not_found(&parent)),
        }
    }

    async fn keys_below(&self, uri: &Uri) -> FsResult<Vec<String>> {
        let keys = self
            .store
            .list_keys()
            .await
            .map_err(|e| storage_error(uri, &e))?;
        Ok(keys
            .into_iter()
            .filter(|k| is_below(k, uri.path()))
            .collect())
    }
}

#[async_trait]
impl FileSystemProvider for KvFileSystemProvider {
    fn capabilities(&self) -> FileSystemCapabilities {
        let base = FileSystemCapabilities::CASE_SENSITIVE;
        if self.readonly {
            base | FileSystemCapabilities::READONLY
        } else {
            base | FileSystemCapabilities::READWRITE
        }
    }

    fn on_did_change_file(&self) -> &Emitter<Vec<FileChange>> {
        &self.changes
    }

    async fn stat(&self, uri: &Uri) -> FsResult<FileStat> {
        let entry = self.entry(uri).await?.ok_or_else(|| FsError::not_found(uri))?;
        let stat = entry.stat();
        Ok(if self.readonly { stat.readonly() } else { stat })
    }

    async fn read_file(&self, uri: &Uri) -> FsResult<Vec<u8>> {
        match self.entry(uri).await? {
            Some(e) if e.file_type == FileType::Directory => {
                Err(FsError::FileIsADirectory(uri.to_string()))
            },
            Some(e) => e.bytes(uri),
            None => Err(FsError::not_found(uri)),
        }
    }

    async fn write_file(&self, uri: &Uri, content: &[u8], options: WriteOptions) -> FsResult<()> {
        self.check_writable(uri)?;
        let _guard = self.write_lock.lock().await;
        let now = now_millis();
        let change = match self.entry(uri).await? {
            Some(e) if e.file_type == FileType::Directory => {
                return Err(FsError::FileIsADirectory(uri.to_string()));
            },
            Some(_) if !options.overwrite => return Err(FsError::FileExists(uri.to_string())),
            Some(e) if e.readonly => return Err(FsError::no_permission(uri)),
            Some(e) => {
                let updated = Entry {
                    mtime: now,
                    content: Some(STANDARD.encode(content)),
                    ..e
                };
                self.put(uri, &updated).await?;
                FileChange::changed(uri.clone())
            },
            None if !options.create => return Err(FsError::not_found(uri)),
            None => {
                self.require_parent_dir(uri).await?;
                self.put(uri, &Entry::file(content, now)).await?;
                FileChange::created(uri.clone())
            },
        };
        trace!(uri = %uri, bytes = content.len(), "kv write");
        self.changes.fire(vec![change]);
        Ok(())
    }

    async fn readdir(&self, uri: &Uri) -> FsResult<Vec<DirEntry>> {
        match self.entry(uri).await? {
            Some(e) if e.file_type == FileType::Directory => {},
            Some(_) => return Err(FsError::FileNotADirectory(uri.to_string())),
            None => return Err(FsError::not_found(uri)),
        }
        let mut entries = Vec::new();
        for key in self.keys_below(uri).await? {
            let child = uri.with_path(&key);
            if child.parent().as_ref() != Some(uri) {
                continue;
            }
            if let Some(entry) = self.entry(&child).await? {
                entries.push((child.basename().to_owned(), entry.file_type));
            }
        }
        entries.sort();
        Ok(entries)
    }

    async fn mkdir(&self, uri: &Uri) -> FsResult<()> {
        self.check_writable(uri)?;
        let _guard = self.write_lock.lock().await;
        if self.entry(uri).await?.is_some() {
            return Err(FsError::FileExists(uri.to_string()));
        }
        self.require_parent_dir(uri).await?;
        self.put(uri, &Entry::directory(now_millis())).await?;
        self.changes.fire(vec![FileChange::created(uri.clone())]);
        Ok(())
    }

    async fn delete(&self, uri: &Uri, options: DeleteOptions) -> FsResult<()> {
        self.check_writable(uri)?;
        if uri.is_root() {
            return Err(FsError::no_permission(uri));
        }
        let _guard = self.write_lock.lock().await;
        if self.entry(uri).await?.is_none() {
            return Err(FsError::not_found(uri));
        }
        let children = self.keys_below(uri).await?;
        if !children.is_empty() && !options.recursive {
            return Err(FsError::Unknown(format!("{uri}: directory not empty")));
        }

        let mut changes = Vec::with_capacity(children.len().saturating_add(1));
        for key in children.iter().map(String::as_str).chain([uri.path()]) {
            self.store
                .delete(key)
                .await
                .map_err(|e| storage_error(uri, &e))?;
            changes.push(FileChange::deleted(uri.with_path(key)));
        }
        self.changes.fire(changes);
        Ok(())
    }

    async fn rename(&self, from: &Uri, to: &Uri, options: RenameOptions) -> FsResult<()> {
        self.check_writable(from)?;
        if from.is_root() || to.is_root() {
            return Err(FsError::no_permission(from));
        }
        if from == to {
            return Ok(());
        }
        if to.is_equal_or_descendant_of(from) {
            return Err(FsError::Unknown(format!("cannot move {from} into itself")));
        }
        let _guard = self.write_lock.lock().await;
        let Some(root_entry) = self.entry(from).await? else {
            return Err(FsError::not_found(from));
        };
        if self.entry(to).await?.is_some() {
            if !options.overwrite {
                return Err(FsError::FileExists(to.to_string()));
            }
            for key in self.keys_below(to).await?.iter().map(String::as_str).chain([to.path()]) {
                self.store
                    .delete(key)
                    .await
                    .map_err(|e| storage_error(to, &e))?;
            }
        }
        self.require_parent_dir(to).await?;

        self.put(to, &root_entry).await?;
        self.store
            .delete(from.path())
            .await
            .map_err(|e| storage_error(from, &e))?;
        for key in self.keys_below(from).await? {
            let old = from.with_path(&key);
            let new = to.with_path(&format!("{}{}", to.path(), &key[from.path().len()..]));
            if let Some(entry) = self.entry(&old).await? {
                self.put(&new, &entry).await?;
            }
            self.store
                .delete(&key)
                .await
                .map_err(|e| storage_error(&old, &e))?;
        }
        self.changes.fire(vec![
            FileChange::deleted(from.clone()),
            FileChange::created(to.clone()),
        ]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tessera_storage::{KvStore, MemoryKvStore};

    fn provider() -> (KvFileSystemProvider, Arc<dyn KvStore>) {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let scoped = ScopedKvStore::new(Arc::clone(&kv), "vfs").unwrap();
        (KvFileSystemProvider::new(scoped), kv)
    }

    fn uri(path: &str) -> Uri {
        Uri::file(path)
    }

    #[tokio::test]
    async fn write_read_persisted_as_json() {
        let (fs, kv) = provider();
        fs.write_file(&uri("/a.bin"), &[0, 1, 2, 255], WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(fs.read_file(&uri("/a.bin")).await.unwrap(), vec![0, 1, 2, 255]);
        assert_eq!(fs.stat(&uri("/a.bin")).await.unwrap().size, 4);

        let raw = kv.get("vfs", "/a.bin").await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["file_type"], "file");
    }

    #[tokio::test]
    async fn directories_and_listing() {
        let (fs, _) = provider();
        fs.mkdir(&uri("/src")).await.unwrap();
        fs.write_file(&uri("/src/lib.rs"), b"", WriteOptions::default())
            .await
            .unwrap();
        fs.write_file(&uri("/top.txt"), b"t", WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(
            fs.readdir(&uri("/")).await.unwrap(),
            vec![
                ("src".to_owned(), FileType::Directory),
                ("top.txt".to_owned(), FileType::File),
            ]
        );
        assert!(
            fs.write_file(&uri("/nope/x"), b"", WriteOptions::default())
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn rename_and_delete_subtree() {
        let (fs, kv) = provider();
        fs.mkdir(&uri("/d")).await.unwrap();
        fs.write_file(&uri("/d/a"), b"1", WriteOptions::default())
            .await
            .unwrap();
        fs.rename(&uri("/d"), &uri("/e"), RenameOptions::default())
            .await
            .unwrap();
        assert_eq!(fs.read_file(&uri("/e/a")).await.unwrap(), b"1");
        assert!(fs.stat(&uri("/d/a")).await.unwrap_err().is_not_found());

        fs.delete(&uri("/e"), DeleteOptions { recursive: true })
            .await
            .unwrap();
        assert!(kv.list_keys("vfs").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn size_accounts_for_padding() {
        let (fs, _) = provider();
        for len in 0..7usize {
            let path = format!("/f{len}");
            fs.write_file(&uri(&path), &vec![7u8; len], WriteOptions::default())
                .await
                .unwrap();
            assert_eq!(fs.stat(&uri(&path)).await.unwrap().size, len as u64);
        }
    }
}
