use std::path::{Component, Path, PathBuf};

use crate::error::{FsError, FsResult};

/// Lexically map a normalized URI path onto a host directory.
///
/// The leading `/` of `uri_path` is stripped and the rest is resolved
/// component by component below `root`. Nothing on disk is consulted, so a
/// symlink inside `root` can still point elsewhere; callers that touch the
/// disk check the canonical result as well.
///
/// # Errors
///
/// Returns `NoPermission` if the path would climb above `root` or carries a
/// prefix/root component of its own.
pub(crate) fn resolve_path(root: &Path, uri_path: &str) -> FsResult<PathBuf> {
    let relative = Path::new(uri_path.trim_start_matches('/'));
    let mut resolved = root.to_path_buf();

    for component in relative.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                return Err(FsError::no_permission(uri_path));
            },
            Component::CurDir => {},
            Component::ParentDir => {
                if resolved == root {
                    return Err(FsError::no_permission(uri_path));
                }
                resolved.pop();
            },
            Component::Normal(part) => resolved.push(part),
        }
    }

    Ok(resolved)
}
