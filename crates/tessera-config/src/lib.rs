//! Host configuration for Tessera.
//!
//! A single [`HostConfig`] describes logging, the RPC channel and the
//! filesystem delegates attached to the default scheme at bootstrap.
//!
//! # Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Environment variables** (`TESSERA_LOG_LEVEL`, `TESSERA_RPC_CALL_TIMEOUT_MS`)
//! 2. **User file** (`$TESSERA_HOME/config.toml`, else `~/.tessera/config.toml`)
//! 3. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! This crate has no internal dependencies;
//! conversion into domain types happens where the host is assembled.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Configuration error types.
pub mod error;
/// Layered loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Post-merge validation.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::*;

impl HostConfig {
    /// Load with the full precedence chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a file is malformed or the merged
    /// configuration fails validation.
    pub fn load() -> ConfigResult<Self> {
        loader::load(None, &loader::collect_env_vars())
    }

    /// Load using an explicit user config file instead of the discovered one.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file is malformed or the merged
    /// configuration fails validation.
    pub fn load_from(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load(Some(path), &loader::collect_env_vars())
    }

    /// Parse a TOML string layered over the embedded defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the string is malformed or invalid.
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        loader::load_str(content)
    }
}
