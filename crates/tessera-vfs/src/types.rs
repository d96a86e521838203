//! Value types shared by every filesystem provider.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tessera_core::Uri;

bitflags! {
    /// What a provider supports as a whole.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct FileSystemCapabilities: u32 {
        /// Files can be read and written.
        const READWRITE = 1 << 1;
        /// Every write is refused; layered writes skip this provider.
        const READONLY = 1 << 11;
        /// Paths that differ only in case are different files.
        const CASE_SENSITIVE = 1 << 10;
    }
}

impl FileSystemCapabilities {
    /// True if writes must skip this provider.
    #[must_use]
    pub fn is_readonly(self) -> bool {
        self.contains(Self::READONLY)
    }
}

bitflags! {
    /// Per-file permission bits reported by `stat`.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct FilePermission: u32 {
        /// The file may not be written, regardless of its provider.
        const READONLY = 1;
    }
}

/// Kind of filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// A regular file.
    File,
    /// A directory.
    Directory,
    /// Anything else (sockets, devices, dangling links).
    Unknown,
}

/// Metadata returned by `stat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    /// Entry kind.
    pub file_type: FileType,
    /// Creation time, milliseconds since the UNIX epoch.
    pub ctime: i64,
    /// Modification time, milliseconds since the UNIX epoch.
    pub mtime: i64,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Per-file permission bits.
    #[serde(default)]
    pub permissions: FilePermission,
}

impl FileStat {
    /// Stat for a file.
    #[must_use]
    pub fn file(size: u64, ctime: i64, mtime: i64) -> Self {
        Self {
            file_type: FileType::File,
            ctime,
            mtime,
            size,
            permissions: FilePermission::empty(),
        }
    }

    /// Stat for a directory.
    #[must_use]
    pub fn directory(ctime: i64, mtime: i64) -> Self {
        Self {
            file_type: FileType::Directory,
            ctime,
            mtime,
            size: 0,
            permissions: FilePermission::empty(),
        }
    }

    /// Add the per-file read-only bit.
    #[must_use]
    pub fn readonly(mut self) -> Self {
        self.permissions |= FilePermission::READONLY;
        self
    }

    /// True if the per-file read-only bit is set.
    #[must_use]
    pub fn is_readonly(&self) -> bool {
        self.permissions.contains(FilePermission::READONLY)
    }

    /// True for directories.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

/// One directory listing entry.
pub type DirEntry = (String, FileType);

/// Options for `write_file`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Create the file if it does not exist.
    pub create: bool,
    /// Replace the file if it exists.
    pub overwrite: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            create: true,
            overwrite: true,
        }
    }
}

/// Options for `delete`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOptions {
    /// Remove directories together with their contents.
    pub recursive: bool,
}

/// Options for `rename`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameOptions {
    /// Replace an existing target.
    pub overwrite: bool,
}

/// Options for `watch`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchOptions {
    /// Watch the whole subtree.
    pub recursive: bool,
    /// Glob-like path prefixes to ignore.
    pub excludes: Vec<String>,
}

/// Kind of change reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    /// Contents or metadata changed.
    Changed,
    /// The entry was created.
    Created,
    /// The entry was removed.
    Deleted,
}

/// A single change notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileChange {
    /// What happened.
    pub kind: FileChangeKind,
    /// Where it happened.
    pub uri: Uri,
}

impl FileChange {
    /// A `Changed` event.
    #[must_use]
    pub fn changed(uri: Uri) -> Self {
        Self {
            kind: FileChangeKind::Changed,
            uri,
        }
    }

    /// A `Created` event.
    #[must_use]
    pub fn created(uri: Uri) -> Self {
        Self {
            kind: FileChangeKind::Created,
            uri,
        }
    }

    /// A `Deleted` event.
    #[must_use]
    pub fn deleted(uri: Uri) -> Self {
        Self {
            kind: FileChangeKind::Deleted,
            uri,
        }
    }
}

/// Current time in milliseconds since the UNIX epoch.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
