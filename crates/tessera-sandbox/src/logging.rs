//! Logging setup from the host configuration.

use tessera_config::HostConfig;
use tessera_telemetry::{LogConfig, setup_logging};

use crate::error::SandboxResult;

/// Install the global subscriber described by `config.log`.
///
/// # Errors
///
/// Returns [`SandboxError::Logging`](crate::SandboxError::Logging) for an
/// invalid filter or if a subscriber is already installed.
pub fn init_logging(config: &HostConfig) -> SandboxResult<()> {
    setup_logging(&LogConfig::from(&config.log))?;
    Ok(())
}
