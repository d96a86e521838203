//! Host-side implementations of the `MainThread*` identifiers.

mod commands;
mod filesystem;

pub use commands::{CommandEvent, HostCommandService};
pub use filesystem::HostFileSystem;
