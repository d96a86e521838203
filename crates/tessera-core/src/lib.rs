//! Tessera Core - Foundation types shared by every Tessera crate.
//!
//! This crate provides:
//! - [`Uri`], the scheme-addressed resource locator used by the filesystem layer
//! - [`ExtensionIdentity`], the key for per-extension state
//! - [`Disposable`] and [`DisposableStore`] for explicit teardown handles
//! - [`ServiceAccessor`], the typed container threaded through capability factories

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod disposable;
pub mod error;
pub mod identity;
pub mod services;
pub mod uri;

pub use disposable::{Disposable, DisposableStore};
pub use error::{CoreError, CoreResult};
pub use identity::ExtensionIdentity;
pub use services::{ServiceAccessor, ServiceCollection};
pub use uri::Uri;
