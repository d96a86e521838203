//! Explicit teardown handles.
//!
//! Registrations across Tessera (filesystem delegates, event listeners,
//! watchers, command handlers) hand back a [`Disposable`]. Dropping the handle
//! does nothing; the registration lives until `dispose()` is called.

use std::fmt;
use std::sync::Mutex;

type Teardown = Box<dyn FnOnce() + Send>;

/// A handle whose teardown runs at most once.
pub struct Disposable {
    teardown: Mutex<Option<Teardown>>,
}

impl Disposable {
    /// Wrap a teardown closure.
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Mutex::new(Some(Box::new(teardown))),
        }
    }

    /// A handle with nothing to tear down.
    #[must_use]
    pub fn noop() -> Self {
        Self {
            teardown: Mutex::new(None),
        }
    }

    /// Run the teardown. Subsequent calls are no-ops.
    pub fn dispose(&self) {
        let teardown = match self.teardown.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    /// True once `dispose()` has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        match self.teardown.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// A bag of disposables torn down together, newest first.
#[derive(Debug, Default)]
pub struct DisposableStore {
    items: Mutex<Vec<Disposable>>,
    disposed: std::sync::atomic::AtomicBool,
}

impl DisposableStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a disposable. If the store is already disposed, the item is
    /// disposed immediately.
    pub fn add(&self, item: Disposable) {
        if self.disposed.load(std::sync::atomic::Ordering::Acquire) {
            tracing::warn!("adding to an already disposed store, disposing immediately");
            item.dispose();
            return;
        }
        match self.items.lock() {
            Ok(mut items) => items.push(item),
            Err(poisoned) => poisoned.into_inner().push(item),
        }
    }

    /// Number of tracked items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().map(|i| i.len()).unwrap_or_default()
    }

    /// True if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispose every tracked item in reverse insertion order.
    pub fn dispose(&self) {
        self.disposed
            .store(true, std::sync::atomic::Ordering::Release);
        let items = match self.items.lock() {
            Ok(mut items) => std::mem::take(&mut *items),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for item in items.into_iter().rev() {
            item.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dispose_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let d = Disposable::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!d.is_disposed());
        d.dispose();
        d.dispose();
        assert!(d.is_disposed());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_does_not_dispose() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        drop(Disposable::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn store_disposes_in_reverse() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let store = DisposableStore::new();
        for i in 0..3 {
            let order = Arc::clone(&order);
            store.add(Disposable::new(move || order.lock().unwrap().push(i)));
        }
        assert_eq!(store.len(), 3);
        store.dispose();
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
        assert!(store.is_empty());
    }

    #[test]
    fn add_after_dispose_disposes_immediately() {
        let store = DisposableStore::new();
        store.dispose();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        store.add(Disposable::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
