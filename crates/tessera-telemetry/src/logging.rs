//! Logging configuration and setup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::error::{TelemetryError, TelemetryResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human-readable output.
    Pretty,
    /// Single-line output (default).
    #[default]
    Compact,
    /// Newline-delimited JSON.
    Json,
    /// The default `tracing-subscriber` layout.
    Full,
}

impl std::str::FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            "full" => Ok(Self::Full),
            other => Err(TelemetryError::ConfigError(format!(
                "unknown log format '{other}'"
            ))),
        }
    }
}

/// Where log lines go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Standard output.
    Stdout,
    /// Standard error (default).
    #[default]
    Stderr,
    /// A daily-rotated file in the given directory.
    File(PathBuf),
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Base level filter (e.g. `info`, `debug`).
    #[serde(default = "default_level")]
    pub level: String,
    /// Line format.
    #[serde(default)]
    pub format: LogFormat,
    /// Output target.
    #[serde(default)]
    pub target: LogTarget,
    /// Prefix for rotated log files.
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    /// Include timestamps.
    #[serde(default = "default_true")]
    pub timestamps: bool,
    /// Include source file and line.
    #[serde(default)]
    pub file_info: bool,
    /// Use ANSI colors.
    #[serde(default = "default_true")]
    pub ansi: bool,
    /// Per-target directive overrides (e.g. `tessera_rpc=trace`).
    #[serde(default)]
    pub directives: Vec<String>,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_file_prefix() -> String {
    "tessera".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            file_prefix: default_file_prefix(),
            timestamps: true,
            file_info: false,
            ansi: true,
            directives: Vec::new(),
        }
    }
}

impl LogConfig {
    /// Create a config with the given base level.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Default::default()
        }
    }

    /// Set the line format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the output target. File targets disable ANSI colors.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        if matches!(target, LogTarget::File(_)) {
            self.ansi = false;
        }
        self.target = target;
        self
    }

    /// Add a directive override.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Drop timestamps from log lines.
    #[must_use]
    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }

    /// Include source file and line.
    #[must_use]
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    fn build_filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| TelemetryError::ConfigError(e.to_string()))?;
        for directive in &self.directives {
            let parsed = directive
                .parse()
                .map_err(|e: tracing_subscriber::filter::ParseError| {
                    TelemetryError::ConfigError(format!("{directive}: {e}"))
                })?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }

    fn format_layer<W>(&self, writer: W) -> BoxedLayer
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let base = fmt::layer()
            .with_writer(writer)
            .with_ansi(self.ansi)
            .with_file(self.file_info)
            .with_line_number(self.file_info);

        match (self.format, self.timestamps) {
            (LogFormat::Json, true) => base.json().boxed(),
            (LogFormat::Json, false) => base.json().without_time().boxed(),
            (LogFormat::Pretty, true) => base.pretty().boxed(),
            (LogFormat::Pretty, false) => base.pretty().without_time().boxed(),
            (LogFormat::Compact, true) => base.compact().boxed(),
            (LogFormat::Compact, false) => base.compact().without_time().boxed(),
            (LogFormat::Full, true) => base.boxed(),
            (LogFormat::Full, false) => base.without_time().boxed(),
        }
    }
}

#[cfg(feature = "config")]
impl From<&tessera_config::LogSection> for LogConfig {
    fn from(section: &tessera_config::LogSection) -> Self {
        let mut config = Self::new(section.level.clone());
        config.format = section.format.parse().unwrap_or_default();
        config.directives.clone_from(&section.directives);
        if let Some(dir) = &section.directory {
            config = config.with_target(LogTarget::File(dir.clone()));
        }
        config
    }
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Returns [`TelemetryError::ConfigError`] for an invalid filter,
/// [`TelemetryError::IoError`] if the log directory cannot be created, and
/// [`TelemetryError::InitError`] if a global subscriber is already set.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.build_filter()?;

    let layer = match &config.target {
        LogTarget::Stdout => config.format_layer(std::io::stdout),
        LogTarget::Stderr => config.format_layer(std::io::stderr),
        LogTarget::File(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, &config.file_prefix);
            config.format_layer(appender)
        },
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::InitError(e.to_string()))
}

/// Install the default subscriber (info, stderr, compact).
///
/// # Errors
///
/// Returns an error if a global subscriber is already set.
pub fn setup_default_logging() -> TelemetryResult<()> {
    setup_logging(&LogConfig::default())
}
