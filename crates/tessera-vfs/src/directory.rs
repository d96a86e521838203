//! Provider over a user-granted host directory.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tessera_core::Uri;
use tessera_events::Emitter;
use tracing::{debug, trace, warn};

use crate::error::{FsError, FsResult};
use crate::path::resolve_path;
use crate::provider::FileSystemProvider;
use crate::types::{
    DeleteOptions, DirEntry, FileChange, FileStat, FileSystemCapabilities, FileType,
    RenameOptions, WriteOptions,
};

fn millis(time: std::io::Result<SystemTime>) -> i64 {
    time.ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_millis()).ok())
        .unwrap_or_default()
}

fn file_type(ft: std::fs::FileType) -> FileType {
    if ft.is_dir() {
        FileType::Directory
    } else if ft.is_file() {
        FileType::File
    } else {
        FileType::Unknown
    }
}

/// Serves one host directory as the root of a logical filesystem.
///
/// Every URI path is resolved below the root, and symlinks that point
/// outside it are refused; nothing above the root is reachable. Changes made through this provider are reported on
/// [`on_did_change_file`](FileSystemProvider::on_did_change_file); changes
/// made on disk by other processes are not.
#[derive(Debug)]
pub struct DirectoryFileSystemProvider {
    root: PathBuf,
    readonly: bool,
    changes: Emitter<Vec<FileChange>>,
}

impl DirectoryFileSystemProvider {
    /// Serve `root` read/write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            readonly: false,
            changes: Emitter::new(),
        }
    }

    /// Refuse every write.
    #[must_use]
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// The host directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `uri` below the root, then make sure symlinks on the way do
    /// not lead out of it.
    ///
    /// The deepest existing ancestor is canonicalized and must stay under
    /// the canonical root; components that do not exist yet are appended to
    /// that canonical path.
    async fn host_path(&self, uri: &Uri) -> FsResult<PathBuf> {
        let resolved = resolve_path(&self.root, uri.path())?;
        let canonical_root = tokio::fs::canonicalize(&self.root)
            .await
            .unwrap_or_else(|_| self.root.clone());

        let mut existing = resolved.as_path();
        let mut missing = Vec::new();
        loop {
            if tokio::fs::symlink_metadata(existing).await.is_ok() {
                let canonical = tokio::fs::canonicalize(existing)
                    .await
                    .map_err(|e| FsError::from_io(&e, uri))?;
                if !canonical.starts_with(&canonical_root) {
                    warn!(uri = %uri, path = %canonical.display(), "path escapes the mounted directory");
                    return Err(FsError::no_permission(uri));
                }
                let mut host = canonical;
                host.extend(missing.into_iter().rev());
                return Ok(host);
            }
            let Some((parent, name)) = existing.parent().zip(existing.file_name()) else {
                break;
            };
            missing.push(name.to_owned());
            existing = parent;
        }
        Ok(resolved)
    }

    fn check_writable(&self, uri: &Uri) -> FsResult<()> {
        if self.readonly {
            Err(FsError::no_permission(uri))
        } else {
            Ok(())
        }
    }

    async fn metadata(&self, uri: &Uri) -> FsResult<std::fs::Metadata> {
        let path = self.host_path(uri).await?;
        tokio::fs::metadata(&path)
            .await
            .map_err(|e| FsError::from_io(&e, uri))
    }
}

#[async_trait]
impl FileSystemProvider for DirectoryFileSystemProvider {
    fn capabilities(&self) -> FileSystemCapabilities {
        let base = if cfg!(any(windows, target_os = "macos")) {
            FileSystemCapabilities::empty()
        } else {
            FileSystemCapabilities::CASE_SENSITIVE
        };
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
        let meta = self.metadata(uri).await?;
        let ctime = millis(meta.created());
        let mtime = millis(meta.modified());
        let mut stat = match file_type(meta.file_type()) {
            FileType::Directory => FileStat::directory(ctime, mtime),
            FileType::File => FileStat::file(meta.len(), ctime, mtime),
            FileType::Unknown => FileStat {
                file_type: FileType::Unknown,
                ..FileStat::file(meta.len(), ctime, mtime)
            },
        };
        if self.readonly || meta.permissions().readonly() {
            stat = stat.readonly();
        }
        Ok(stat)
    }

    async fn read_file(&self, uri: &Uri) -> FsResult<Vec<u8>> {
        let path = self.host_path(uri).await?;
        if tokio::fs::metadata(&path)
            .await
            .map_err(|e| FsError::from_io(&e, uri))?
            .is_dir()
        {
            return Err(FsError::FileIsADirectory(uri.to_string()));
        }
        tokio::fs::read(&path)
            .await
            .map_err(|e| FsError::from_io(&e, uri))
    }

    async fn write_file(&self, uri: &Uri, content: &[u8], options: WriteOptions) -> FsResult<()> {
        self.check_writable(uri)?;
        let path = self.host_path(uri).await?;
        let existed = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => return Err(FsError::FileIsADirectory(uri.to_string())),
            Ok(_) if !options.overwrite => return Err(FsError::FileExists(uri.to_string())),
            Ok(_) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if !options.create {
                    return Err(FsError::not_found(uri));
                }
                false
            },
            Err(e) => return Err(FsError::from_io(&e, uri)),
        };
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| FsError::from_io(&e, uri))?;
        trace!(path = %path.display(), bytes = content.len(), "directory write");
        self.changes.fire(vec![if existed {
            FileChange::changed(uri.clone())
        } else {
            FileChange::created(uri.clone())
        }]);
        Ok(())
    }

    async fn readdir(&self, uri: &Uri) -> FsResult<Vec<DirEntry>> {
        let path = self.host_path(uri).await?;
        let mut dir = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| FsError::from_io(&e, uri))?;
        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| FsError::from_io(&e, uri))?
        {
            let kind = entry
                .file_type()
                .await
                .map_or(FileType::Unknown, file_type);
            entries.push((entry.file_name().to_string_lossy().into_owned(), kind));
        }
        entries.sort();
        Ok(entries)
    }

    async fn mkdir(&self, uri: &Uri) -> FsResult<()> {
        self.check_writable(uri)?;
        let path = self.host_path(uri).await?;
        tokio::fs::create_dir(&path)
            .await
            .map_err(|e| FsError::from_io(&e, uri))?;
        self.changes.fire(vec![FileChange::created(uri.clone())]);
        Ok(())
    }

    async fn delete(&self, uri: &Uri, options: DeleteOptions) -> FsResult<()> {
        self.check_writable(uri)?;
        if uri.is_root() {
            return Err(FsError::no_permission(uri));
        }
        let path = self.host_path(uri).await?;
        let meta = self.metadata(uri).await?;
        let result = if meta.is_dir() {
            if options.recursive {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_dir(&path).await
            }
        } else {
            tokio::fs::remove_file(&path).await
        };
        result.map_err(|e| FsError::from_io(&e, uri))?;
        debug!(path = %path.display(), "directory entry deleted");
        self.changes.fire(vec![FileChange::deleted(uri.clone())]);
        Ok(())
    }

    async fn rename(&self, from: &Uri, to: &Uri, options: RenameOptions) -> FsResult<()> {
        self.check_writable(from)?;
        let source = self.host_path(from).await?;
        let target = self.host_path(to).await?;
        self.metadata(from).await?;
        if !options.overwrite && tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Err(FsError::FileExists(to.to_string()));
        }
        tokio::fs::rename(&source, &target)
            .await
            .map_err(|e| FsError::from_io(&e, from))?;
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

    fn uri(path: &str) -> Uri {
        Uri::file(path)
    }

    #[tokio::test]
    async fn reads_host_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();

        let fs = DirectoryFileSystemProvider::new(dir.path());
        assert_eq!(
            fs.read_file(&uri("/src/main.rs")).await.unwrap(),
            b"fn main() {}"
        );
        assert_eq!(
            fs.readdir(&uri("/")).await.unwrap(),
            vec![("src".to_owned(), FileType::Directory)]
        );
        let stat = fs.stat(&uri("/src/main.rs")).await.unwrap();
        assert_eq!(stat.size, 12);
        assert!(fs.stat(&uri("/nope")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn write_mkdir_rename_delete() {
        let dir = tempfile::tempdir().unwrap();
        let fs = DirectoryFileSystemProvider::new(dir.path());

        fs.mkdir(&uri("/out")).await.unwrap();
        fs.write_file(&uri("/out/a.txt"), b"a", WriteOptions::default())
            .await
            .unwrap();
        fs.rename(&uri("/out/a.txt"), &uri("/out/b.txt"), RenameOptions::default())
            .await
            .unwrap();
        assert_eq!(std::fs::read(dir.path().join("out/b.txt")).unwrap(), b"a");

        fs.delete(&uri("/out"), DeleteOptions { recursive: true })
            .await
            .unwrap();
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn readonly_refuses_writes() {
        let dir = tempfile::tempdir().unwrap();
        let fs = DirectoryFileSystemProvider::new(dir.path()).readonly();
        assert!(fs.capabilities().is_readonly());
        assert!(
            fs.write_file(&uri("/a"), b"x", WriteOptions::default())
                .await
                .unwrap_err()
                .is_fallthrough()
        );
        assert!(!dir.path().join("a").exists());
    }

    #[tokio::test]
    async fn write_without_create() {
        let dir = tempfile::tempdir().unwrap();
        let fs = DirectoryFileSystemProvider::new(dir.path());
        let options = WriteOptions {
            create: false,
            overwrite: true,
        };
        assert!(
            fs.write_file(&uri("/a"), b"x", options)
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_out_of_the_root_are_refused() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("inside.txt"), "inside").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("inside.txt"), dir.path().join("alias.txt"))
            .unwrap();

        let fs = DirectoryFileSystemProvider::new(dir.path());
        let err = fs.read_file(&uri("/escape/secret.txt")).await.unwrap_err();
        assert_eq!(err.code(), "NoPermissions");
        let err = fs
            .write_file(&uri("/escape/new.txt"), b"x", WriteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NoPermissions");
        assert!(!outside.path().join("new.txt").exists());

        assert_eq!(fs.read_file(&uri("/alias.txt")).await.unwrap(), b"inside");
    }
}
