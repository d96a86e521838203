//! Event emitter broadcasting to async receivers and synchronous listeners.

use std::fmt;
use std::sync::Arc;

use tessera_core::Disposable;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::listener::{ListenerId, ListenerRegistry};

/// Default channel capacity for an emitter.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A typed event source.
///
/// Clones share the same channel and the same listener registry, so an event
/// fired on any clone reaches every observer.
///
/// **WARNING:** storing a clone of an emitter inside one of its own
/// synchronous listeners creates an `Arc` cycle. Capture a
/// [`std::sync::Weak`] to the owning structure instead.
pub struct Emitter<T: Clone + Send + Sync + 'static> {
    sender: broadcast::Sender<Arc<T>>,
    listeners: Arc<ListenerRegistry<T>>,
    capacity: usize,
}

impl<T: Clone + Send + Sync + 'static> Emitter<T> {
    /// Create an emitter with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create an emitter with a specific async channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            listeners: Arc::new(ListenerRegistry::new()),
            capacity,
        }
    }

    /// Fire an event.
    ///
    /// Async receivers are fed first, then synchronous listeners run inline.
    /// Returns the number of async receivers that got the event.
    pub fn fire(&self, event: T) -> usize {
        let event = Arc::new(event);
        let count = self.sender.send(Arc::clone(&event)).unwrap_or_else(|_| {
            trace!("No receivers for event");
            0
        });
        self.listeners.notify(&event);
        count
    }

    /// Subscribe an async receiver.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver<T> {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Register a synchronous listener.
    pub fn listen(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        self.listeners.register(Arc::new(listener))
    }

    /// Unregister a synchronous listener.
    pub fn unlisten(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    /// Register a synchronous listener and wrap its removal in a [`Disposable`].
    pub fn on(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Disposable {
        let id = self.listen(listener);
        let listeners = Arc::downgrade(&self.listeners);
        Disposable::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.unregister(id);
            }
        })
    }

    /// Number of observers, async and synchronous.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.sender
            .receiver_count()
            .saturating_add(self.listeners.len())
    }

    /// Channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            listeners: Arc::clone(&self.listeners),
            capacity: self.capacity,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("receivers", &self.sender.receiver_count())
            .field("listeners", &self.listeners.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Async receiver for an [`Emitter`].
pub struct EventReceiver<T> {
    receiver: broadcast::Receiver<Arc<T>>,
}

impl<T: Clone> EventReceiver<T> {
    /// Receive the next event.
    ///
    /// Returns `None` once every emitter clone has been dropped. A receiver
    /// that falls behind skips the dropped events and keeps going.
    pub async fn recv(&mut self) -> Option<Arc<T>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<T>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn fire_and_receive() {
        let emitter: Emitter<u32> = Emitter::new();
        let mut rx = emitter.subscribe();
        assert_eq!(emitter.fire(5), 1);
        assert_eq!(*rx.recv().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn no_observers() {
        let emitter: Emitter<u32> = Emitter::new();
        assert_eq!(emitter.listener_count(), 0);
        assert_eq!(emitter.fire(1), 0);
    }

    #[tokio::test]
    async fn clones_share_listeners() {
        let emitter: Emitter<u32> = Emitter::new();
        let clone = emitter.clone();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        clone.listen(move |v| {
            c.fetch_add(*v as usize, Ordering::SeqCst);
        });
        emitter.fire(3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn on_returns_disposable() {
        let emitter: Emitter<u32> = Emitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let handle = emitter.on(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        emitter.fire(0);
        handle.dispose();
        emitter.fire(0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count(), 0);
    }

    #[tokio::test]
    async fn fifo_order_preserved() {
        let emitter: Emitter<u32> = Emitter::new();
        let mut rx = emitter.subscribe();
        for i in 0..10 {
            emitter.fire(i);
        }
        for i in 0..10 {
            assert_eq!(*rx.try_recv().unwrap(), i);
        }
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn lagging_receiver_recovers() {
        let emitter: Emitter<u32> = Emitter::with_capacity(2);
        let mut rx = emitter.subscribe();
        for i in 0..5 {
            emitter.fire(i);
        }
        // The oldest events were dropped; the receiver resumes at the
        // oldest retained one.
        assert_eq!(*rx.recv().await.unwrap(), 3);
        assert_eq!(*rx.recv().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn recv_none_after_drop() {
        let emitter: Emitter<u32> = Emitter::new();
        let mut rx = emitter.subscribe();
        drop(emitter);
        assert!(rx.recv().await.is_none());
    }
}
