//! Capability registry and dependency resolver.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tessera_core::ServiceAccessor;
use tracing::{debug, info, warn};

use crate::context::{CapabilitySet, HostContext};
use crate::error::{CapabilityError, CapabilityResult};
use crate::name::CapabilityName;
use crate::provider::CapabilityProvider;

/// Named providers with declared dependencies, initialized once in
/// dependency order.
///
/// Registration is open until [`CapabilityRegistry::initialize`] starts.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    /// Registration order. A re-registered name keeps its original slot.
    providers: Mutex<Vec<(CapabilityName, CapabilityProvider)>>,
    sealed: AtomicBool,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn providers(&self) -> MutexGuard<'_, Vec<(CapabilityName, CapabilityProvider)>> {
        match self.providers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register `provider` under `name`. A later registration under the same
    /// name replaces the earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Sealed`] once initialization has begun.
    pub fn register(&self, name: CapabilityName, provider: CapabilityProvider) -> CapabilityResult<()> {
        if self.is_initialized() {
            return Err(CapabilityError::Sealed(name));
        }
        let mut providers = self.providers();
        if let Some(slot) = providers.iter_mut().find(|(n, _)| *n == name) {
            warn!(capability = %name, "Capability re-registered, replacing previous provider");
            slot.1 = provider;
        } else {
            debug!(
                capability = %name,
                dependencies = ?provider.dependencies(),
                "Capability registered"
            );
            providers.push((name, provider));
        }
        Ok(())
    }

    /// True if a provider is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: CapabilityName) -> bool {
        self.providers().iter().any(|(n, _)| *n == name)
    }

    /// Registered names, in registration order.
    #[must_use]
    pub fn registered(&self) -> Vec<CapabilityName> {
        self.providers().iter().map(|(n, _)| *n).collect()
    }

    /// Topologically order the registered providers.
    ///
    /// Every provider comes after the providers it depends on. Among
    /// providers whose dependencies are satisfied, registration order wins.
    /// Dependencies on unregistered names are logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Cycle`] naming every provider that sits on
    /// or behind a dependency cycle.
    pub fn resolve(&self) -> CapabilityResult<Vec<CapabilityName>> {
        let providers = self.providers();
        let index: HashMap<CapabilityName, usize> = providers
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (*name, i))
            .collect();

        let mut in_degree = vec![0usize; providers.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); providers.len()];
        for (i, (name, provider)) in providers.iter().enumerate() {
            for dependency in provider.dependencies() {
                match index.get(dependency) {
                    Some(&d) => {
                        dependents[d].push(i);
                        in_degree[i] = in_degree[i].saturating_add(1);
                    },
                    None => {
                        warn!(
                            capability = %name,
                            dependency = %dependency,
                            "Dependency not registered, ignoring"
                        );
                    },
                }
            }
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(providers.len());
        while let Some(next) = ready.pop_first() {
            order.push(providers[next].0);
            for &dependent in &dependents[next] {
                in_degree[dependent] = in_degree[dependent].saturating_sub(1);
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < providers.len() {
            let stuck: Vec<CapabilityName> = providers
                .iter()
                .map(|(name, _)| *name)
                .filter(|name| !order.contains(name))
                .collect();
            warn!(capabilities = ?stuck, "Capability dependency cycle");
            return Err(CapabilityError::Cycle(stuck));
        }

        debug!(order = ?order, "Resolved capability order");
        Ok(order)
    }

    /// Seal the registry and run every factory once, in resolved order.
    ///
    /// Each factory sees the capabilities initialized before it. There are
    /// no retries: a failed or repeated call leaves the registry sealed.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::AlreadyInitialized`] on a second call,
    /// [`CapabilityError::Cycle`] from resolution, or
    /// [`CapabilityError::Factory`] for the first failing factory.
    pub async fn initialize(
        &self,
        services: &ServiceAccessor,
        host: &HostContext,
    ) -> CapabilityResult<CapabilitySet> {
        if self.sealed.swap(true, Ordering::AcqRel) {
            return Err(CapabilityError::AlreadyInitialized);
        }
        let order = self.resolve()?;
        let plan: Vec<(CapabilityName, CapabilityProvider)> = {
            let providers = self.providers();
            order
                .iter()
                .filter_map(|name| providers.iter().find(|(n, _)| n == name).cloned())
                .collect()
        };

        let mut resolved = CapabilitySet::new();
        for (name, provider) in plan {
            let exposed = provider
                .create(services.clone(), host.clone(), resolved.clone())
                .await
                .map_err(|e| {
                    warn!(capability = %name, error = %e, "Capability factory failed");
                    CapabilityError::Factory {
                        name,
                        message: format!("{e:#}"),
                    }
                })?;
            resolved.insert(name, exposed);
            debug!(capability = %name, "Capability initialized");
        }

        info!(count = resolved.len(), "Capabilities initialized");
        Ok(resolved)
    }

    /// True once `initialize` has been called.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }
}
