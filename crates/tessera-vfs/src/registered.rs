//! Provider over explicitly registered [`VirtualFile`]s.
//!
//! Collaborators inject defaults, scratch buffers and generated files here
//! before any real store attaches. Directories exist only as prefixes of
//! registered file paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, Weak};

use async_trait::async_trait;
use tessera_core::{Disposable, Uri};
use tessera_events::{Emitter, ListenerId};
use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::file::{VirtualFile, VirtualFileEvent};
use crate::provider::FileSystemProvider;
use crate::types::{
    DeleteOptions, DirEntry, FileChange, FileStat, FileSystemCapabilities, FileType,
    RenameOptions, WriteOptions, now_millis,
};

struct Registration {
    file: Arc<VirtualFile>,
    listener: ListenerId,
}

#[derive(Default)]
struct Inner {
    files: RwLock<HashMap<String, Registration>>,
    changes: Emitter<Vec<FileChange>>,
}

impl Inner {
    fn read<R>(&self, f: impl FnOnce(&HashMap<String, Registration>) -> R) -> R {
        match self.files.read() {
            Ok(files) => f(&files),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write<R>(&self, f: impl FnOnce(&mut HashMap<String, Registration>) -> R) -> R {
        match self.files.write() {
            Ok(mut files) => f(&mut files),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn file(&self, path: &str) -> Option<Arc<VirtualFile>> {
        self.read(|files| files.get(path).map(|r| Arc::clone(&r.file)))
    }

    /// Files at or below `path`.
    fn files_under(&self, path: &str) -> Vec<Arc<VirtualFile>> {
        self.read(|files| {
            files
                .iter()
                .filter(|(p, _)| is_at_or_below(p, path))
                .map(|(_, r)| Arc::clone(&r.file))
                .collect()
        })
    }

    fn is_directory(&self, path: &str) -> bool {
        path == "/" || self.read(|files| files.keys().any(|p| is_below(p, path)))
    }

    /// React to a file announcing its own lifecycle.
    fn on_file_event(&self, event: &VirtualFileEvent) {
        match event {
            VirtualFileEvent::Changed { uri } => {
                self.changes.fire(vec![FileChange::changed(uri.clone())]);
            },
            VirtualFileEvent::Deleted { uri } => {
                let removed = self.write(|files| files.remove(uri.path()));
                if let Some(registration) = removed {
                    registration.file.events().unlisten(registration.listener);
                    debug!(uri = %uri, "registered file forgotten");
                }
                self.changes.fire(vec![FileChange::deleted(uri.clone())]);
            },
            VirtualFileEvent::Renamed { from, to } => {
                let displaced = self.write(|files| {
                    let registration = files.remove(from.path())?;
                    files.insert(to.path().to_owned(), registration)
                });
                // A file renamed onto a registered path replaces that file.
                if let Some(displaced) = displaced {
                    displaced.file.events().unlisten(displaced.listener);
                    displaced.file.delete();
                    debug!(uri = %to, "registered file replaced by rename");
                }
                self.changes.fire(vec![
                    FileChange::deleted(from.clone()),
                    FileChange::created(to.clone()),
                ]);
            },
        }
    }
}

fn is_below(path: &str, dir: &str) -> bool {
    if dir == "/" {
        return path != "/";
    }
    path.strip_prefix(dir).is_some_and(|r| r.starts_with('/'))
}

fn is_at_or_below(path: &str, dir: &str) -> bool {
    path == dir || is_below(path, dir)
}

/// A provider whose files are [`VirtualFile`] objects registered by
/// collaborators.
pub struct RegisteredFileProvider {
    inner: Arc<Inner>,
    readonly: bool,
    created: i64,
}

impl std::fmt::Debug for RegisteredFileProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredFileProvider")
            .field("files", &self.len())
            .field("readonly", &self.readonly)
            .finish()
    }
}

impl Default for RegisteredFileProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisteredFileProvider {
    /// A provider that accepts writes and creates files on demand.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            readonly: false,
            created: now_millis(),
        }
    }

    /// A provider flagged read-only; layered writes skip it.
    #[must_use]
    pub fn new_readonly() -> Self {
        Self {
            readonly: true,
            ..Self::new()
        }
    }

    /// Number of registered files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read(HashMap::len)
    }

    /// True if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The file registered at `uri`, if any.
    #[must_use]
    pub fn get(&self, uri: &Uri) -> Option<Arc<VirtualFile>> {
        self.inner.file(uri.path())
    }

    /// Register `file` under its current path.
    ///
    /// Disposing the returned handle unregisters the file without deleting
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::FileExists`] if another file owns the path.
    pub fn register_file(&self, file: Arc<VirtualFile>) -> FsResult<Disposable> {
        let uri = file.uri();
        if self.inner.read(|files| files.contains_key(uri.path())) {
            return Err(FsError::FileExists(uri.to_string()));
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let listener = file.events().listen(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_file_event(event);
            }
        });
        self.inner.write(|files| {
            files.insert(
                uri.path().to_owned(),
                Registration {
                    file: Arc::clone(&file),
                    listener,
                },
            );
        });
        debug!(uri = %uri, "file registered");
        self.inner.changes.fire(vec![FileChange::created(uri)]);

        let weak = Arc::downgrade(&self.inner);
        let target = Arc::downgrade(&file);
        Ok(Disposable::new(move || {
            let (Some(inner), Some(target)) = (weak.upgrade(), target.upgrade()) else {
                return;
            };
            let removed = inner.write(|files| {
                let key = files
                    .iter()
                    .find(|(_, r)| Arc::ptr_eq(&r.file, &target))
                    .map(|(k, _)| k.clone());
                key.and_then(|k| files.remove(&k))
            });
            if let Some(registration) = removed {
                registration.file.events().unlisten(registration.listener);
            }
        }))
    }

    fn check_writable(&self, uri: &Uri) -> FsResult<()> {
        if self.readonly {
            Err(FsError::no_permission(uri))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl FileSystemProvider for RegisteredFileProvider {
    fn capabilities(&self) -> FileSystemCapabilities {
        let base = FileSystemCapabilities::CASE_SENSITIVE;
        if self.readonly {
            base | FileSystemCapabilities::READONLY
        } else {
            base | FileSystemCapabilities::READWRITE
        }
    }

    fn on_did_change_file(&self) -> &Emitter<Vec<FileChange>> {
        &self.inner.changes
    }

    async fn stat(&self, uri: &Uri) -> FsResult<FileStat> {
        if let Some(file) = self.inner.file(uri.path()) {
            let stat = file.stat()?;
            return Ok(if self.readonly { stat.readonly() } else { stat });
        }
        if self.inner.is_directory(uri.path()) {
            return Ok(FileStat::directory(self.created, self.created));
        }
        Err(FsError::not_found(uri))
    }

    async fn read_file(&self, uri: &Uri) -> FsResult<Vec<u8>> {
        match self.inner.file(uri.path()) {
            Some(file) => file.read(),
            None if self.inner.is_directory(uri.path()) => {
                Err(FsError::FileIsADirectory(uri.to_string()))
            },
            None => Err(FsError::not_found(uri)),
        }
    }

    async fn write_file(&self, uri: &Uri, content: &[u8], options: WriteOptions) -> FsResult<()> {
        self.check_writable(uri)?;
        if let Some(file) = self.inner.file(uri.path()) {
            if !options.overwrite {
                return Err(FsError::FileExists(uri.to_string()));
            }
            return file.write(content);
        }
        if self.inner.is_directory(uri.path()) {
            return Err(FsError::FileIsADirectory(uri.to_string()));
        }
        if !options.create {
            return Err(FsError::not_found(uri));
        }
        if let Some(parent) = uri.parent()
            && self.inner.file(parent.path()).is_some()
        {
            return Err(FsError::FileNotADirectory(parent.to_string()));
        }
        // The provider owns files it creates itself; their registration
        // lives as long as the file.
        self.register_file(Arc::new(VirtualFile::new(uri.clone(), content)))
            .map(drop)
    }

    async fn readdir(&self, uri: &Uri) -> FsResult<Vec<DirEntry>> {
        if self.inner.file(uri.path()).is_some() {
            return Err(FsError::FileNotADirectory(uri.to_string()));
        }
        let prefix = if uri.is_root() {
            "/".to_owned()
        } else {
            format!("{}/", uri.path())
        };
        let entries: BTreeMap<String, FileType> = self.inner.read(|files| {
            files
                .keys()
                .filter_map(|p| p.strip_prefix(&prefix))
                .map(|rest| match rest.split_once('/') {
                    Some((dir, _)) => (dir.to_owned(), FileType::Directory),
                    None => (rest.to_owned(), FileType::File),
                })
                .collect()
        });
        if entries.is_empty() && !uri.is_root() {
            return Err(FsError::not_found(uri));
        }
        Ok(entries.into_iter().collect())
    }

    /// Directories are implied by file paths, so there is nothing to create.
    /// Reported as `NoPermission` so a layered filesystem moves on.
    async fn mkdir(&self, uri: &Uri) -> FsResult<()> {
        Err(FsError::no_permission(uri))
    }

    async fn delete(&self, uri: &Uri, options: DeleteOptions) -> FsResult<()> {
        self.check_writable(uri)?;
        if let Some(file) = self.inner.file(uri.path()) {
            file.delete();
            return Ok(());
        }
        let doomed = self.inner.files_under(uri.path());
        if doomed.is_empty() {
            return Err(FsError::not_found(uri));
        }
        if !options.recursive {
            return Err(FsError::Unknown(format!("{uri}: directory not empty")));
        }
        for file in doomed {
            file.delete();
        }
        Ok(())
    }

    async fn rename(&self, from: &Uri, to: &Uri, options: RenameOptions) -> FsResult<()> {
        self.check_writable(from)?;
        if from.path() == "/" || to.path() == "/" {
            return Err(FsError::Unknown(format!(
                "cannot rename {from} to {to}: the root is not movable"
            )));
        }
        let moving = self.inner.files_under(from.path());
        if moving.is_empty() {
            return Err(FsError::not_found(from));
        }
        if from == to {
            return Ok(());
        }

        let existing = self.inner.files_under(to.path());
        if !existing.is_empty() {
            if !options.overwrite {
                return Err(FsError::FileExists(to.to_string()));
            }
            for file in existing {
                file.delete();
            }
        }

        for file in moving {
            let current = file.uri();
            let suffix = &current.path()[from.path().len()..];
            file.rename(to.with_path(&format!("{}{suffix}", to.path())))?;
        }
        Ok(())
    }
}
