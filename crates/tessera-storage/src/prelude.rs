//! Common imports for storage consumers.
//!
//! ```rust
//! use tessera_storage::prelude::*;
//! ```

pub use crate::{
    FileKvStore, KvStore, MemoryKvStore, ScopedKvStore, StorageError, StorageResult,
};
