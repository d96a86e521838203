//! Typed service container.
//!
//! The host builds one [`ServiceCollection`] per host instance, freezes it
//! into a [`ServiceAccessor`], and threads the accessor through every
//! capability factory. There is no process-wide singleton; two hosts in the
//! same process own two independent accessors.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};

type Entry = (&'static str, Arc<dyn Any + Send + Sync>);

/// Mutable builder for a [`ServiceAccessor`].
#[derive(Default)]
pub struct ServiceCollection {
    services: HashMap<TypeId, Entry>,
}

impl ServiceCollection {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a service keyed by its type, replacing any previous one.
    #[must_use]
    pub fn with<T: Any + Send + Sync>(mut self, service: Arc<T>) -> Self {
        self.insert(service);
        self
    }

    /// Insert a service keyed by its type, replacing any previous one.
    pub fn insert<T: Any + Send + Sync>(&mut self, service: Arc<T>) {
        if self
            .services
            .insert(TypeId::of::<T>(), (type_name::<T>(), service))
            .is_some()
        {
            tracing::debug!(service = type_name::<T>(), "Replaced service");
        }
    }

    /// Freeze into a read-only accessor.
    #[must_use]
    pub fn build(self) -> ServiceAccessor {
        ServiceAccessor {
            services: Arc::new(self.services),
        }
    }
}

/// Read-only, cheaply cloneable view over host services.
#[derive(Clone, Default)]
pub struct ServiceAccessor {
    services: Arc<HashMap<TypeId, Entry>>,
}

impl ServiceAccessor {
    /// Look up a service by type.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|(_, service)| Arc::clone(service).downcast::<T>().ok())
    }

    /// Look up a service that must be present.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ServiceUnavailable`] if the host never inserted it.
    pub fn require<T: Any + Send + Sync>(&self) -> CoreResult<Arc<T>> {
        self.get::<T>()
            .ok_or(CoreError::ServiceUnavailable(type_name::<T>()))
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// True if no services are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for ServiceAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.services.values().map(|(name, _)| *name).collect();
        names.sort_unstable();
        f.debug_struct("ServiceAccessor")
            .field("services", &names)
            .finish()
    }
}
