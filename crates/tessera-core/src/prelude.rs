//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tessera_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{CoreError, CoreResult};

// Addressing
pub use crate::{ExtensionIdentity, Uri};

// Lifecycle
pub use crate::{Disposable, DisposableStore};

// Dependency injection
pub use crate::{ServiceAccessor, ServiceCollection};
