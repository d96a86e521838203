//! Tessera Events - typed event emitters.
//!
//! Every observable thing in Tessera (file changes, virtual file lifecycle,
//! command registration) is exposed through an [`Emitter<T>`]. There are two
//! ways to observe an emitter:
//!
//! 1. **Async receivers**: `emitter.subscribe()` returns an
//!    [`EventReceiver`] that can be polled from a task.
//! 2. **Synchronous listeners**: `emitter.listen(|event| ...)` runs the
//!    closure inline during `fire()`. This is how stores forward their
//!    change streams into one unified stream without an extra task.
//!
//! # Example
//!
//! ```rust
//! use tessera_events::Emitter;
//!
//! # async fn example() {
//! let emitter: Emitter<String> = Emitter::new();
//! let mut receiver = emitter.subscribe();
//!
//! emitter.fire("saved".to_string());
//!
//! let event = receiver.recv().await.unwrap();
//! assert_eq!(event.as_str(), "saved");
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod emitter;
mod listener;

pub use emitter::{DEFAULT_CHANNEL_CAPACITY, Emitter, EventReceiver};
pub use listener::{ListenerId, ListenerRegistry};
