//! Config file discovery and layered loading.
//!
//! 1. Parse `defaults.toml` → base
//! 2. Merge the user file (explicit path, `$TESSERA_HOME/config.toml`, or
//!    `~/.tessera/config.toml`)
//! 3. Apply `TESSERA_*` environment overrides
//! 4. Deserialize the merged tree → [`HostConfig`]
//! 5. Validate

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::HostConfig;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Environment variable naming the Tessera home directory.
pub const HOME_ENV: &str = "TESSERA_HOME";

/// Environment variables that override individual fields.
const ENV_OVERRIDES: &[(&str, &str, &str)] = &[
    ("TESSERA_LOG_LEVEL", "log", "level"),
    ("TESSERA_LOG_FORMAT", "log", "format"),
    ("TESSERA_RPC_CALL_TIMEOUT_MS", "rpc", "call_timeout_ms"),
    ("TESSERA_DEFAULT_SCHEME", "sandbox", "default_scheme"),
];

/// Snapshot the `TESSERA_*` variables of the current process.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with("TESSERA_"))
        .collect()
}

/// Load the layered configuration.
///
/// `explicit` replaces user file discovery; unlike a discovered file it
/// must exist.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a file is malformed, an override cannot be
/// parsed, or the merged configuration fails validation.
pub fn load(explicit: Option<&Path>, env_vars: &HashMap<String, String>) -> ConfigResult<HostConfig> {
    let mut merged = embedded_defaults()?;

    let user = match explicit {
        Some(path) => Some((read_file(path)?, path.to_path_buf())),
        None => match user_config_path(env_vars) {
            Some(path) => try_load_file(&path)?.map(|overlay| (overlay, path)),
            None => None,
        },
    };
    if let Some((overlay, path)) = user {
        deep_merge(&mut merged, &overlay);
        info!(path = %path.display(), "loaded user config");
    }

    let applied = apply_env_overrides(&mut merged, env_vars)?;
    if applied > 0 {
        debug!(count = applied, "applied environment overrides");
    }

    finish(merged, "<merged config>")
}

/// Parse a TOML string layered over the embedded defaults, without touching
/// the filesystem or environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the string is malformed or invalid.
pub fn load_str(content: &str) -> ConfigResult<HostConfig> {
    let mut merged = embedded_defaults()?;
    let overlay: toml::Value = toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: "<string>".to_owned(),
        source: e,
    })?;
    deep_merge(&mut merged, &overlay);
    finish(merged, "<string>")
}

fn embedded_defaults() -> ConfigResult<toml::Value> {
    toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
        path: "<embedded defaults>".to_owned(),
        source: e,
    })
}

fn finish(merged: toml::Value, label: &str) -> ConfigResult<HostConfig> {
    let config: HostConfig = merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: label.to_owned(),
            source: e,
        })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Where the user file lives: `$TESSERA_HOME/config.toml`, else
/// `~/.tessera/config.toml`.
fn user_config_path(env_vars: &HashMap<String, String>) -> Option<PathBuf> {
    if let Some(home) = env_vars.get(HOME_ENV).filter(|h| !h.is_empty()) {
        return Some(PathBuf::from(home).join("config.toml"));
    }
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".tessera").join("config.toml"))
}

/// Read and parse a file that must exist.
fn read_file(path: &Path) -> ConfigResult<toml::Value> {
    let metadata = std::fs::metadata(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                metadata.len()
            ),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })
}

/// Like [`read_file`] but a missing file yields `None`.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    if !path.exists() {
        debug!(path = %path.display(), "config file not found, skipping");
        return Ok(None);
    }
    read_file(path).map(Some)
}

/// Recursively deep-merge `overlay` into `base`.
///
/// Tables merge per field; scalars and arrays from the overlay replace the
/// base value.
fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
        },
    }
}

fn apply_env_overrides(
    merged: &mut toml::Value,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<usize> {
    let mut applied = 0usize;
    for (var, section, leaf) in ENV_OVERRIDES {
        let Some(raw) = env_vars.get(*var) else {
            continue;
        };

        // Keep the override typed like the field it replaces.
        let value = if *leaf == "call_timeout_ms" {
            let ms: i64 = raw.trim().parse().map_err(|_| ConfigError::EnvError {
                var: (*var).to_owned(),
                message: format!("expected a non-negative integer, got '{raw}'"),
            })?;
            if ms < 0 {
                return Err(ConfigError::EnvError {
                    var: (*var).to_owned(),
                    message: "must not be negative".to_owned(),
                });
            }
            toml::Value::Integer(ms)
        } else {
            toml::Value::String(raw.clone())
        };

        let Some(root) = merged.as_table_mut() else {
            continue;
        };
        let table = root
            .entry((*section).to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
        if let Some(table) = table.as_table_mut() {
            table.insert((*leaf).to_owned(), value);
            applied = applied.saturating_add(1);
            debug!(var = *var, "environment override applied");
        }
    }
    Ok(applied)
}
