//! Post-merge configuration validation.

use std::collections::HashSet;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{HostConfig, MountKind};

/// Largest accepted `rpc.max_message_bytes` (256 MB).
const MAX_MESSAGE_BYTES_UPPER_BOUND: usize = 256 * 1024 * 1024;

/// Validate a merged configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &HostConfig) -> ConfigResult<()> {
    validate_logging(config)?;
    validate_rpc(config)?;
    validate_mounts(config)?;
    validate_sandbox(config)?;
    Ok(())
}

fn validate_logging(config: &HostConfig) -> ConfigResult<()> {
    let format = config.log.format.to_ascii_lowercase();
    if !matches!(format.as_str(), "pretty" | "compact" | "json" | "full") {
        return Err(ConfigError::ValidationError {
            field: "log.format".to_owned(),
            message: format!(
                "unknown format '{}'; expected one of: pretty, compact, json, full",
                config.log.format
            ),
        });
    }
    if config.log.level.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "log.level".to_owned(),
            message: "level must not be empty".to_owned(),
        });
    }
    Ok(())
}

fn validate_rpc(config: &HostConfig) -> ConfigResult<()> {
    let max = config.rpc.max_message_bytes;
    if max == 0 || max > MAX_MESSAGE_BYTES_UPPER_BOUND {
        return Err(ConfigError::ValidationError {
            field: "rpc.max_message_bytes".to_owned(),
            message: format!("must be between 1 and {MAX_MESSAGE_BYTES_UPPER_BOUND}"),
        });
    }
    Ok(())
}

fn validate_mounts(config: &HostConfig) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for (index, mount) in config.filesystem.mounts.iter().enumerate() {
        let field = format!("filesystem.mounts[{index}]");

        if mount.kind == MountKind::Directory && mount.path.is_none() {
            return Err(ConfigError::ValidationError {
                field: format!("{field}.path"),
                message: "directory mounts need a path".to_owned(),
            });
        }
        if mount.kind != MountKind::Directory && mount.path.is_some() {
            return Err(ConfigError::ValidationError {
                field: format!("{field}.path"),
                message: format!("path is only meaningful for directory mounts, not {}", mount.kind),
            });
        }
        if mount.namespace.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::ValidationError {
                field: format!("{field}.namespace"),
                message: "namespace must not be empty".to_owned(),
            });
        }

        let key = (mount.priority, mount.kind, mount.path.clone(), mount.namespace.clone());
        if !seen.insert(key) {
            return Err(ConfigError::ValidationError {
                field,
                message: format!(
                    "duplicate {} mount at priority {}",
                    mount.kind, mount.priority
                ),
            });
        }
    }
    Ok(())
}

fn validate_sandbox(config: &HostConfig) -> ConfigResult<()> {
    let scheme = &config.sandbox.default_scheme;
    let valid = scheme
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid {
        return Err(ConfigError::ValidationError {
            field: "sandbox.default_scheme".to_owned(),
            message: format!("'{scheme}' is not a valid URI scheme"),
        });
    }
    Ok(())
}
