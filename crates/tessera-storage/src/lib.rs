//! Tessera Storage - namespaced key-value storage.
//!
//! The [`KvStore`] trait is the local-database abstraction behind
//! per-extension mementos and the key-value backed filesystem store.
//! Two implementations ship here:
//!
//! - [`MemoryKvStore`]: ephemeral, for tests and scratch state
//! - [`FileKvStore`]: a single JSON snapshot file on disk, rewritten
//!   atomically on every mutation
//!
//! Callers that only ever touch one namespace should hold a
//! [`ScopedKvStore`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod file;
mod kv;

pub use error::{StorageError, StorageResult};
pub use file::FileKvStore;
pub use kv::{KvStore, MemoryKvStore, ScopedKvStore};
