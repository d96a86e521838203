//! Test fixtures for common types.

use std::path::Path;
use std::sync::Once;

use tempfile::TempDir;
use tessera_config::HostConfig;
use tessera_core::{ExtensionIdentity, Uri};
use tracing_subscriber::EnvFilter;

/// A `file` URI for `path`.
#[must_use]
pub fn test_uri(path: &str) -> Uri {
    Uri::file(path)
}

/// The identity `test.<name>`.
///
/// # Panics
///
/// Panics if `name` is not a valid identifier segment.
#[must_use]
pub fn test_identity(name: &str) -> ExtensionIdentity {
    ExtensionIdentity::new(format!("test.{name}")).expect("valid test identity")
}

/// Defaults with a short call timeout so hung calls fail fast.
#[must_use]
pub fn test_config() -> HostConfig {
    let mut config = HostConfig::default();
    config.rpc.call_timeout_ms = 5_000;
    config.log.level = "debug".to_string();
    config
}

/// A temporary directory seeded with `files` (relative path, contents).
///
/// # Panics
///
/// Panics if the directory or a file cannot be created.
#[must_use]
pub fn temp_workspace(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().expect("create temp dir");
    for (relative, contents) in files {
        write_file(dir.path(), relative, contents);
    }
    dir
}

fn write_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(path, contents).expect("write fixture file");
}

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per process.
///
/// Honors `RUST_LOG`, defaulting to `debug` for Tessera crates.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,tessera=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_fixture_creates_nested_files() {
        let dir = temp_workspace(&[("a.txt", "a"), ("nested/b.txt", "b")]);
        assert_eq!(std::fs::read_to_string(dir.path().join("nested/b.txt")).unwrap(), "b");
    }

    #[test]
    fn identity_fixture() {
        assert_eq!(test_identity("demo").as_str(), "test.demo");
        assert_eq!(test_uri("/x").path(), "/x");
    }

    #[test]
    fn config_fixture_is_valid() {
        assert!(tessera_config::validate::validate(&test_config()).is_ok());
    }
}
