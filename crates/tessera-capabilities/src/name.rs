//! The closed set of capability names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Names a capability provider. Adding a capability means adding a variant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityName {
    /// Command registration and execution.
    Commands,
    /// Filesystem access over RPC.
    FileSystem,
    /// Text documents backed by the filesystem.
    Documents,
    /// Per-extension persistent state.
    Storage,
}

impl CapabilityName {
    /// Every capability name, in declaration order.
    pub const ALL: [Self; 4] = [Self::Commands, Self::FileSystem, Self::Documents, Self::Storage];

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Commands => "commands",
            Self::FileSystem => "file_system",
            Self::Documents => "documents",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for CapabilityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
