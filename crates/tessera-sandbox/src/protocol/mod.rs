//! Identifiers and interfaces shared by the host and sandbox sides.
//!
//! `MainThread*` identifiers are implemented on the host and called from the
//! sandbox; `ExtHost*` identifiers go the other way.

mod commands;
mod filesystem;

pub use commands::{
    CommandHandler, EXT_HOST_COMMANDS, ExtHostCommands, ExtHostCommandsClient,
    ExtHostCommandsInterface, MAIN_THREAD_COMMANDS, MainThreadCommands,
    MainThreadCommandsClient, MainThreadCommandsInterface, command_handler,
};
pub use filesystem::{
    MAIN_THREAD_FILE_SYSTEM, MainThreadFileSystem, MainThreadFileSystemClient,
    MainThreadFileSystemInterface, fs_error_from_rpc, fs_error_to_remote,
};

use tessera_rpc::ErasedIdentifier;

/// Identifiers the host side must implement.
pub const HOST_IDENTIFIERS: [ErasedIdentifier; 2] =
    [MAIN_THREAD_COMMANDS.erased(), MAIN_THREAD_FILE_SYSTEM.erased()];

/// Identifiers the sandbox side must implement.
pub const SANDBOX_IDENTIFIERS: [ErasedIdentifier; 1] = [EXT_HOST_COMMANDS.erased()];
