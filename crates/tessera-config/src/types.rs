//! Configuration struct definitions.
//!
//! Every field has a serde default so a partial user file deserializes on
//! its own; the embedded `defaults.toml` mirrors these values.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level host configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Logging.
    pub log: LogSection,
    /// RPC channel between host and sandbox.
    pub rpc: RpcSection,
    /// Delegates layered into the default scheme.
    pub filesystem: FileSystemSection,
    /// Sandbox bootstrap.
    pub sandbox: SandboxSection,
}

/// `[log]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Base level filter.
    pub level: String,
    /// One of `pretty`, `compact`, `json`, `full`.
    pub format: String,
    /// Per-target directive overrides (e.g. `tessera_rpc=trace`).
    pub directives: Vec<String>,
    /// Write rotated log files here instead of stderr.
    pub directory: Option<PathBuf>,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
            directory: None,
        }
    }
}

/// `[rpc]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSection {
    /// Per-call timeout in milliseconds. `0` disables it.
    pub call_timeout_ms: u64,
    /// Largest encoded message accepted by the transport.
    pub max_message_bytes: usize,
}

impl Default for RpcSection {
    fn default() -> Self {
        Self {
            call_timeout_ms: 0,
            max_message_bytes: 16 * 1024 * 1024,
        }
    }
}

impl RpcSection {
    /// The call timeout, if one is configured.
    #[must_use]
    pub fn call_timeout(&self) -> Option<std::time::Duration> {
        (self.call_timeout_ms > 0).then(|| std::time::Duration::from_millis(self.call_timeout_ms))
    }
}

/// `[filesystem]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSystemSection {
    /// Extra delegates attached to the default scheme at bootstrap.
    pub mounts: Vec<MountConfig>,
}

/// Kind of backing store for a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    /// In-memory tree.
    Memory,
    /// A host directory.
    Directory,
    /// Entries persisted in a key-value namespace.
    Kv,
}

impl std::fmt::Display for MountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Directory => write!(f, "directory"),
            Self::Kv => write!(f, "kv"),
        }
    }
}

/// One `[[filesystem.mounts]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Higher priorities are consulted first.
    #[serde(default)]
    pub priority: i32,
    /// Backing store kind.
    pub kind: MountKind,
    /// Host directory, required for `directory` mounts.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Key-value namespace for `kv` mounts.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Mark the whole store read-only.
    #[serde(default)]
    pub readonly: bool,
}

/// `[sandbox]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    /// Scheme served by the layered filesystem.
    pub default_scheme: String,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            default_scheme: "file".to_owned(),
        }
    }
}
