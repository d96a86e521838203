//! Tessera Telemetry - logging setup for the extension host.
//!
//! Libraries in this workspace only emit `tracing` events; installing a
//! subscriber is the embedding application's job and happens here.
//!
//! # Example
//!
//! ```rust,no_run
//! use tessera_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), tessera_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("tessera_rpc=trace");
//!
//! setup_logging(&config)?;
//! tracing::info!("host starting");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
