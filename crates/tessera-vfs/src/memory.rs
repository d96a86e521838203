//! In-memory provider.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tessera_core::Uri;
use tessera_events::Emitter;
use tracing::trace;

use crate::error::{FsError, FsResult};
use crate::provider::FileSystemProvider;
use crate::types::{
    DeleteOptions, DirEntry, FileChange, FileStat, FileSystemCapabilities, FileType,
    RenameOptions, WriteOptions, now_millis,
};

#[derive(Debug, Clone)]
enum Node {
    File {
        content: Vec<u8>,
        ctime: i64,
        mtime: i64,
        readonly: bool,
    },
    Directory {
        ctime: i64,
        mtime: i64,
    },
}

impl Node {
    fn stat(&self) -> FileStat {
        match self {
            Self::File {
                content,
                ctime,
                mtime,
                readonly,
            } => {
                let stat = FileStat::file(content.len() as u64, *ctime, *mtime);
                if *readonly { stat.readonly() } else { stat }
            },
            Self::Directory { ctime, mtime } => FileStat::directory(*ctime, *mtime),
        }
    }

    fn file_type(&self) -> FileType {
        match self {
            Self::File { .. } => FileType::File,
            Self::Directory { .. } => FileType::Directory,
        }
    }
}

/// Nodes keyed by normalized path. The root `/` always exists.
type Tree = BTreeMap<String, Node>;

fn is_child_of(path: &str, dir: &str) -> bool {
    let rest = if dir == "/" {
        path.strip_prefix('/')
    } else {
        path.strip_prefix(dir).and_then(|r| r.strip_prefix('/'))
    };
    rest.is_some_and(|r| !r.is_empty() && !r.contains('/'))
}

fn is_descendant_of(path: &str, dir: &str) -> bool {
    if dir == "/" {
        return path != "/";
    }
    path.strip_prefix(dir).is_some_and(|r| r.starts_with('/'))
}

/// A full read/write tree held in memory.
#[derive(Debug)]
pub struct MemoryFileSystemProvider {
    tree: RwLock<Tree>,
    readonly: bool,
    changes: Emitter<Vec<FileChange>>,
}

impl Default for MemoryFileSystemProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFileSystemProvider {
    /// Create an empty writable tree.
    #[must_use]
    pub fn new() -> Self {
        let now = now_millis();
        let mut tree = Tree::new();
        tree.insert(
            "/".to_owned(),
            Node::Directory {
                ctime: now,
                mtime: now,
            },
        );
        Self {
            tree: RwLock::new(tree),
            readonly: false,
            changes: Emitter::new(),
        }
    }

    /// Create an empty tree that refuses every write through the SPI.
    /// Content can still be seeded with [`insert_file`](Self::insert_file).
    #[must_use]
    pub fn new_readonly() -> Self {
        Self {
            readonly: true,
            ..Self::new()
        }
    }

    fn read_tree<R>(&self, f: impl FnOnce(&Tree) -> R) -> R {
        match self.tree.read() {
            Ok(tree) => f(&tree),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write_tree<R>(&self, f: impl FnOnce(&mut Tree) -> R) -> R {
        match self.tree.write() {
            Ok(mut tree) => f(&mut tree),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Seed a file, creating missing parent directories. Bypasses the
    /// provider's read-only mode.
    pub fn insert_file(&self, path: &str, content: impl Into<Vec<u8>>) {
        let uri = Uri::file(path);
        let content = content.into();
        let now = now_millis();
        self.write_tree(|tree| {
            let mut parent = uri.parent();
            while let Some(dir) = parent {
                tree.entry(dir.path().to_owned())
                    .or_insert(Node::Directory {
                        ctime: now,
                        mtime: now,
                    });
                parent = dir.parent();
            }
            tree.insert(
                uri.path().to_owned(),
                Node::File {
                    content,
                    ctime: now,
                    mtime: now,
                    readonly: false,
                },
            );
        });
    }

    /// Set or clear the per-file read-only bit.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no file exists at `path`.
    pub fn set_file_readonly(&self, path: &str, value: bool) -> FsResult<()> {
        let uri = Uri::file(path);
        self.write_tree(|tree| match tree.get_mut(uri.path()) {
            Some(Node::File { readonly, .. }) => {
                *readonly = value;
                Ok(())
            },
            Some(Node::Directory { .. }) => Err(FsError::FileIsADirectory(uri.to_string())),
            None => Err(FsError::not_found(&uri)),
        })
    }

    fn check_writable(&self, uri: &Uri) -> FsResult<()> {
        if self.readonly {
            Err(FsError::no_permission(uri))
        } else {
            Ok(())
        }
    }

    fn require_parent_dir(tree: &Tree, uri: &Uri) -> FsResult<()> {
        let Some(parent) = uri.parent() else {
            return Ok(());
        };
        match tree.get(parent.path()) {
            Some(Node::Directory { .. }) => Ok(()),
            Some(Node::File { .. }) => Err(FsError::FileNotADirectory(parent.to_string())),
            None => Err(FsError::not_found(&parent)),
        }
    }

    fn touch_parent(tree: &mut Tree, uri: &Uri, now: i64) {
        if let Some(parent) = uri.parent()
            && let Some(Node::Directory { mtime, .. }) = tree.get_mut(parent.path())
        {
            *mtime = now;
        }
    }

    fn fire(&self, changes: Vec<FileChange>) {
        if !changes.is_empty() {
            self.changes.fire(changes);
        }
    }
}

#[async_trait]
impl FileSystemProvider for MemoryFileSystemProvider {
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
        let stat = self
            .read_tree(|tree| tree.get(uri.path()).map(Node::stat))
            .ok_or_else(|| FsError::not_found(uri))?;
        Ok(if self.readonly { stat.readonly() } else { stat })
    }

    async fn read_file(&self, uri: &Uri) -> FsResult<Vec<u8>> {
        self.read_tree(|tree| match tree.get(uri.path()) {
            Some(Node::File { content, .. }) => Ok(content.clone()),
            Some(Node::Directory { .. }) => Err(FsError::FileIsADirectory(uri.to_string())),
            None => Err(FsError::not_found(uri)),
        })
    }

    async fn write_file(&self, uri: &Uri, content: &[u8], options: WriteOptions) -> FsResult<()> {
        self.check_writable(uri)?;
        let change = self.write_tree(|tree| {
            let now = now_millis();
            match tree.get_mut(uri.path()) {
                Some(Node::Directory { .. }) => Err(FsError::FileIsADirectory(uri.to_string())),
                Some(Node::File { .. }) if !options.overwrite => {
                    Err(FsError::FileExists(uri.to_string()))
                },
                Some(Node::File { readonly: true, .. }) => Err(FsError::no_permission(uri)),
                Some(Node::File {
                    content: existing,
                    mtime,
                    ..
                }) => {
                    *existing = content.to_vec();
                    *mtime = now;
                    Ok(FileChange::changed(uri.clone()))
                },
                None if !options.create => Err(FsError::not_found(uri)),
                None => {
                    Self::require_parent_dir(tree, uri)?;
                    tree.insert(
                        uri.path().to_owned(),
                        Node::File {
                            content: content.to_vec(),
                            ctime: now,
                            mtime: now,
                            readonly: false,
                        },
                    );
                    Self::touch_parent(tree, uri, now);
                    Ok(FileChange::created(uri.clone()))
                },
            }
        })?;
        trace!(uri = %uri, bytes = content.len(), "memory write");
        self.fire(vec![change]);
        Ok(())
    }

    async fn readdir(&self, uri: &Uri) -> FsResult<Vec<DirEntry>> {
        self.read_tree(|tree| match tree.get(uri.path()) {
            Some(Node::Directory { .. }) => Ok(tree
                .iter()
                .filter(|(path, _)| is_child_of(path, uri.path()))
                .map(|(path, node)| {
                    let name = path.rsplit('/').next().unwrap_or_default().to_owned();
                    (name, node.file_type())
                })
                .collect()),
            Some(Node::File { .. }) => Err(FsError::FileNotADirectory(uri.to_string())),
            None => Err(FsError::not_found(uri)),
        })
    }

    async fn mkdir(&self, uri: &Uri) -> FsResult<()> {
        self.check_writable(uri)?;
        self.write_tree(|tree| {
            if tree.contains_key(uri.path()) {
                return Err(FsError::FileExists(uri.to_string()));
            }
            Self::require_parent_dir(tree, uri)?;
            let now = now_millis();
            tree.insert(
                uri.path().to_owned(),
                Node::Directory {
                    ctime: now,
                    mtime: now,
                },
            );
            Self::touch_parent(tree, uri, now);
            Ok(())
        })?;
        self.fire(vec![FileChange::created(uri.clone())]);
        Ok(())
    }

    async fn delete(&self, uri: &Uri, options: DeleteOptions) -> FsResult<()> {
        self.check_writable(uri)?;
        if uri.is_root() {
            return Err(FsError::no_permission(uri));
        }
        let removed = self.write_tree(|tree| {
            match tree.get(uri.path()) {
                None => return Err(FsError::not_found(uri)),
                Some(Node::Directory { .. }) => {
                    let has_children = tree.keys().any(|p| is_descendant_of(p, uri.path()));
                    if has_children && !options.recursive {
                        return Err(FsError::Unknown(format!(
                            "{uri}: directory not empty"
                        )));
                    }
                },
                Some(Node::File { .. }) => {},
            }
            let doomed: Vec<String> = tree
                .keys()
                .filter(|p| *p == uri.path() || is_descendant_of(p, uri.path()))
                .cloned()
                .collect();
            for path in &doomed {
                tree.remove(path);
            }
            Self::touch_parent(tree, uri, now_millis());
            Ok(doomed)
        })?;
        self.fire(
            removed
                .iter()
                .map(|path| FileChange::deleted(uri.with_path(path)))
                .collect(),
        );
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
            return Err(FsError::Unknown(format!(
                "cannot move {from} into itself"
            )));
        }
        self.write_tree(|tree| {
            if !tree.contains_key(from.path()) {
                return Err(FsError::not_found(from));
            }
            if tree.contains_key(to.path()) && !options.overwrite {
                return Err(FsError::FileExists(to.to_string()));
            }
            Self::require_parent_dir(tree, to)?;

            let moved: Vec<String> = tree
                .keys()
                .filter(|p| *p == from.path() || is_descendant_of(p, from.path()))
                .cloned()
                .collect();
            // Clear the target subtree when overwriting.
            let replaced: Vec<String> = tree
                .keys()
                .filter(|p| *p == to.path() || is_descendant_of(p, to.path()))
                .cloned()
                .collect();
            for path in replaced {
                tree.remove(&path);
            }
            for path in moved {
                if let Some(node) = tree.remove(&path) {
                    let suffix = &path[from.path().len()..];
                    tree.insert(format!("{}{suffix}", to.path()), node);
                }
            }
            let now = now_millis();
            Self::touch_parent(tree, from, now);
            Self::touch_parent(tree, to, now);
            Ok(())
        })?;
        self.fire(vec![
            FileChange::deleted(from.clone()),
            FileChange::created(to.clone()),
        ]);
        Ok(())
    }
}
