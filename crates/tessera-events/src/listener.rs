//! Synchronous listener registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};
use uuid::Uuid;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Registration handle for a synchronous listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Registry of synchronous listeners, invoked in registration order.
pub struct ListenerRegistry<T> {
    /// Keyed by a monotonically increasing sequence so iteration order is
    /// registration order.
    listeners: RwLock<BTreeMap<u64, (ListenerId, Listener<T>)>>,
    next_seq: std::sync::atomic::AtomicU64,
}

impl<T> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(BTreeMap::new()),
            next_seq: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

impl<T> fmt::Debug for ListenerRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listener_count", &self.len())
            .finish()
    }
}

impl<T> ListenerRegistry<T> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn register(&self, listener: Listener<T>) -> ListenerId {
        let id = ListenerId::new();
        let seq = self
            .next_seq
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        match self.listeners.write() {
            Ok(mut listeners) => {
                listeners.insert(seq, (id, listener));
            },
            Err(poisoned) => {
                poisoned.into_inner().insert(seq, (id, listener));
            },
        }
        debug!(listener_id = ?id, "Listener registered");
        id
    }

    /// Unregister a listener. Returns `true` if it was present.
    pub fn unregister(&self, id: ListenerId) -> bool {
        // Take the listener out under the lock but drop it after releasing,
        // so a listener whose drop fires events cannot deadlock us.
        let removed = {
            let mut listeners = match self.listeners.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let seq = listeners
                .iter()
                .find(|(_, (lid, _))| *lid == id)
                .map(|(seq, _)| *seq);
            seq.and_then(|seq| listeners.remove(&seq))
        };
        let found = removed.is_some();
        drop(removed);
        if found {
            debug!(listener_id = ?id, "Listener unregistered");
        }
        found
    }

    /// Invoke every listener with `event`.
    ///
    /// The listener set is snapshotted first, so listeners may register or
    /// unregister (including themselves) while being notified.
    pub fn notify(&self, event: &T) {
        let snapshot: Vec<(ListenerId, Listener<T>)> = match self.listeners.read() {
            Ok(listeners) => listeners.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        };

        for (id, listener) in snapshot {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener(event);
            }));
            if let Err(e) = result {
                warn!(listener_id = ?id, error = ?e, "Listener panicked");
            }
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().map(|l| l.len()).unwrap_or_default()
    }

    /// True if no listeners are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every listener.
    pub fn clear(&self) {
        let drained = match self.listeners.write() {
            Ok(mut listeners) => std::mem::take(&mut *listeners),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        drop(drained);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn register_unregister() {
        let registry: ListenerRegistry<u32> = ListenerRegistry::new();
        assert!(registry.is_empty());
        let id = registry.register(Arc::new(|_| {}));
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn notify_in_registration_order() {
        let registry: ListenerRegistry<u32> = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            registry.register(Arc::new(move |v: &u32| {
                seen.lock().unwrap().push(format!("{tag}{v}"));
            }));
        }
        registry.notify(&1);
        assert_eq!(*seen.lock().unwrap(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let registry: ListenerRegistry<u32> = ListenerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        registry.register(Arc::new(|_| panic!("boom")));
        let c = Arc::clone(&count);
        registry.register(Arc::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        registry.notify(&0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_can_unregister_itself() {
        let registry: Arc<ListenerRegistry<u32>> = Arc::new(ListenerRegistry::new());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let weak = Arc::downgrade(&registry);
        let slot_clone = Arc::clone(&slot);
        let id = registry.register(Arc::new(move |_| {
            if let (Some(reg), Some(id)) = (weak.upgrade(), *slot_clone.lock().unwrap()) {
                reg.unregister(id);
            }
        }));
        *slot.lock().unwrap() = Some(id);

        registry.notify(&0);
        assert!(registry.is_empty());
    }
}
