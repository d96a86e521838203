//! Configuration error types.

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path of the file.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// A config file is not valid TOML or does not match the schema.
    #[error("failed to parse config {path}: {source}")]
    ParseError {
        /// Path of the file, or a placeholder for merged/embedded content.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// An environment override could not be applied.
    #[error("invalid value for {var}: {message}")]
    EnvError {
        /// Environment variable name.
        var: String,
        /// What was wrong with it.
        message: String,
    },

    /// A value is out of range or violates a cross-field rule.
    #[error("invalid config field {field}: {message}")]
    ValidationError {
        /// Dotted path of the offending field.
        field: String,
        /// Description of the violation.
        message: String,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
