//! Single virtual files.
//!
//! A [`VirtualFile`] owns its content and timestamps and announces its own
//! lifecycle. Whoever registered the file (usually a
//! [`RegisteredFileProvider`](crate::RegisteredFileProvider)) listens to
//! those announcements to forget deleted files and re-key renamed ones.

use std::sync::RwLock;

use tessera_core::Uri;
use tessera_events::Emitter;
use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::types::{FileStat, now_millis};

/// Lifecycle events of a [`VirtualFile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualFileEvent {
    /// Content was replaced.
    Changed {
        /// The file.
        uri: Uri,
    },
    /// The file was deleted.
    Deleted {
        /// The file.
        uri: Uri,
    },
    /// The file moved.
    Renamed {
        /// Old location.
        from: Uri,
        /// New location.
        to: Uri,
    },
}

#[derive(Debug)]
struct FileState {
    uri: Uri,
    content: Vec<u8>,
    ctime: i64,
    mtime: i64,
    readonly: bool,
    deleted: bool,
}

/// An in-memory file with change, delete and rename events.
#[derive(Debug)]
pub struct VirtualFile {
    state: RwLock<FileState>,
    events: Emitter<VirtualFileEvent>,
}

impl VirtualFile {
    /// Create a writable file.
    pub fn new(uri: Uri, content: impl Into<Vec<u8>>) -> Self {
        let now = now_millis();
        Self {
            state: RwLock::new(FileState {
                uri,
                content: content.into(),
                ctime: now,
                mtime: now,
                readonly: false,
                deleted: false,
            }),
            events: Emitter::with_capacity(64),
        }
    }

    /// Mark the file read-only.
    #[must_use]
    pub fn readonly(self) -> Self {
        self.set_readonly(true);
        self
    }

    fn read_state<R>(&self, f: impl FnOnce(&FileState) -> R) -> R {
        match self.state.read() {
            Ok(state) => f(&state),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write_state<R>(&self, f: impl FnOnce(&mut FileState) -> R) -> R {
        match self.state.write() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Current location.
    #[must_use]
    pub fn uri(&self) -> Uri {
        self.read_state(|s| s.uri.clone())
    }

    /// True if writes are refused.
    #[must_use]
    pub fn is_readonly(&self) -> bool {
        self.read_state(|s| s.readonly)
    }

    /// Toggle the read-only flag.
    pub fn set_readonly(&self, readonly: bool) {
        self.write_state(|s| s.readonly = readonly);
    }

    /// True once `delete()` has run.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.read_state(|s| s.deleted)
    }

    /// Lifecycle events.
    #[must_use]
    pub fn events(&self) -> &Emitter<VirtualFileEvent> {
        &self.events
    }

    /// Copy of the content.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` once the file was deleted.
    pub fn read(&self) -> FsResult<Vec<u8>> {
        self.read_state(|s| {
            if s.deleted {
                Err(FsError::not_found(&s.uri))
            } else {
                Ok(s.content.clone())
            }
        })
    }

    /// Metadata; the read-only flag maps to the per-file permission bit.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` once the file was deleted.
    pub fn stat(&self) -> FsResult<FileStat> {
        self.read_state(|s| {
            if s.deleted {
                return Err(FsError::not_found(&s.uri));
            }
            let stat = FileStat::file(s.content.len() as u64, s.ctime, s.mtime);
            Ok(if s.readonly { stat.readonly() } else { stat })
        })
    }

    /// Replace the content, bump mtime, and fire `Changed`.
    ///
    /// # Errors
    ///
    /// Returns `NoPermission` for read-only files and `NotFound` once the
    /// file was deleted.
    pub fn write(&self, content: impl Into<Vec<u8>>) -> FsResult<()> {
        let content = content.into();
        let uri = self.write_state(|s| {
            if s.deleted {
                return Err(FsError::not_found(&s.uri));
            }
            if s.readonly {
                return Err(FsError::no_permission(&s.uri));
            }
            s.content = content;
            // Keep mtime strictly increasing even within one millisecond.
            s.mtime = now_millis().max(s.mtime.saturating_add(1));
            Ok(s.uri.clone())
        })?;
        debug!(uri = %uri, "virtual file written");
        self.events.fire(VirtualFileEvent::Changed { uri });
        Ok(())
    }

    /// Delete the file and fire `Deleted`. Deleting twice is a no-op.
    pub fn delete(&self) {
        let uri = self.write_state(|s| {
            if s.deleted {
                return None;
            }
            s.deleted = true;
            s.content = Vec::new();
            Some(s.uri.clone())
        });
        if let Some(uri) = uri {
            debug!(uri = %uri, "virtual file deleted");
            self.events.fire(VirtualFileEvent::Deleted { uri });
        }
    }

    /// Move the file to `to` and fire `Renamed`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` once the file was deleted.
    pub fn rename(&self, to: Uri) -> FsResult<()> {
        let from = self.write_state(|s| {
            if s.deleted {
                return Err(FsError::not_found(&s.uri));
            }
            let from = std::mem::replace(&mut s.uri, to.clone());
            s.mtime = now_millis().max(s.mtime);
            Ok(from)
        })?;
        debug!(from = %from, to = %to, "virtual file renamed");
        self.events.fire(VirtualFileEvent::Renamed { from, to });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder(file: &VirtualFile) -> Arc<Mutex<Vec<VirtualFileEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        file.events().listen(move |e| sink.lock().unwrap().push(e.clone()));
        seen
    }

    #[test]
    fn write_bumps_mtime_and_fires() {
        let file = VirtualFile::new(Uri::file("/a.txt"), "one");
        let seen = recorder(&file);
        let before = file.stat().unwrap().mtime;

        file.write("two").unwrap();
        assert_eq!(file.read().unwrap(), b"two");
        assert!(file.stat().unwrap().mtime > before);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![VirtualFileEvent::Changed {
                uri: Uri::file("/a.txt")
            }]
        );
    }

    #[test]
    fn readonly_refuses_writes() {
        let file = VirtualFile::new(Uri::file("/ro"), "x").readonly();
        assert!(file.stat().unwrap().is_readonly());
        let err = file.write("y").unwrap_err();
        assert_eq!(err.code(), "NoPermissions");
        assert_eq!(file.read().unwrap(), b"x");
    }

    #[test]
    fn delete_fires_once() {
        let file = VirtualFile::new(Uri::file("/gone"), "x");
        let seen = recorder(&file);
        file.delete();
        file.delete();
        assert!(file.is_deleted());
        assert!(file.read().unwrap_err().is_not_found());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn rename_rekeys() {
        let file = VirtualFile::new(Uri::file("/old"), "x");
        let seen = recorder(&file);
        file.rename(Uri::file("/new")).unwrap();
        assert_eq!(file.uri(), Uri::file("/new"));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![VirtualFileEvent::Renamed {
                from: Uri::file("/old"),
                to: Uri::file("/new")
            }]
        );
    }
}
