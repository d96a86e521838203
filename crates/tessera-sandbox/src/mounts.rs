//! Attach configured mounts to the default scheme.

use std::sync::Arc;

use tessera_config::{MountConfig, MountKind};
use tessera_core::DisposableStore;
use tessera_storage::{KvStore, ScopedKvStore};
use tessera_vfs::{
    DirectoryFileSystemProvider, FileSystemProvider, FileSystemRegistry, KvFileSystemProvider,
    MemoryFileSystemProvider,
};
use tracing::info;

use crate::error::{SandboxError, SandboxResult};

/// Layer every mount into `registry`'s default scheme.
///
/// Disposing the returned store detaches them all. `kv` mounts without an
/// explicit namespace use `fs.<priority>` inside `store`.
///
/// # Errors
///
/// Returns [`SandboxError::Config`] for a directory mount without a path and
/// [`SandboxError::Storage`] for an invalid namespace. Mounts attached before
/// the failure are detached again.
pub fn attach_mounts(
    registry: &FileSystemRegistry,
    mounts: &[MountConfig],
    store: &Arc<dyn KvStore>,
) -> SandboxResult<DisposableStore> {
    let attached = DisposableStore::new();
    for mount in mounts {
        let provider = match build_provider(mount, store) {
            Ok(provider) => provider,
            Err(e) => {
                attached.dispose();
                return Err(e);
            },
        };
        attached.add(registry.register_delegate(mount.priority, provider));
        info!(
            kind = %mount.kind,
            priority = mount.priority,
            readonly = mount.readonly,
            "Mount attached"
        );
    }
    Ok(attached)
}

fn build_provider(
    mount: &MountConfig,
    store: &Arc<dyn KvStore>,
) -> SandboxResult<Arc<dyn FileSystemProvider>> {
    let provider: Arc<dyn FileSystemProvider> = match mount.kind {
        MountKind::Memory if mount.readonly => Arc::new(MemoryFileSystemProvider::new_readonly()),
        MountKind::Memory => Arc::new(MemoryFileSystemProvider::new()),
        MountKind::Directory => {
            let path = mount.path.as_ref().ok_or_else(|| {
                SandboxError::Config(format!(
                    "directory mount at priority {} has no path",
                    mount.priority
                ))
            })?;
            let provider = DirectoryFileSystemProvider::new(path);
            if mount.readonly {
                Arc::new(provider.readonly())
            } else {
                Arc::new(provider)
            }
        },
        MountKind::Kv => {
            let namespace = mount
                .namespace
                .clone()
                .unwrap_or_else(|| format!("fs.{}", mount.priority));
            let provider = KvFileSystemProvider::new(ScopedKvStore::new(Arc::clone(store), namespace)?);
            if mount.readonly {
                Arc::new(provider.readonly())
            } else {
                Arc::new(provider)
            }
        },
    };
    Ok(provider)
}
