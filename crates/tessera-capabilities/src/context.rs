//! What every factory sees: host context and the capability set so far.

use std::any::{Any, type_name};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tessera_core::ServiceAccessor;
use tessera_rpc::RpcProtocol;

use crate::error::{CapabilityError, CapabilityResult};
use crate::name::CapabilityName;

/// An initialized capability's exposed object.
pub type Exposed = Arc<dyn Any + Send + Sync>;

/// Fixed per-host inputs: the RPC endpoint and host-injected hooks.
#[derive(Clone)]
pub struct HostContext {
    rpc: Arc<RpcProtocol>,
    hooks: ServiceAccessor,
}

impl HostContext {
    /// Context with no hooks.
    #[must_use]
    pub fn new(rpc: Arc<RpcProtocol>) -> Self {
        Self {
            rpc,
            hooks: ServiceAccessor::default(),
        }
    }

    /// Attach host hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: ServiceAccessor) -> Self {
        self.hooks = hooks;
        self
    }

    /// RPC endpoint of this side.
    #[must_use]
    pub fn rpc(&self) -> &Arc<RpcProtocol> {
        &self.rpc
    }

    /// Host-injected utilities.
    #[must_use]
    pub fn hooks(&self) -> &ServiceAccessor {
        &self.hooks
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext")
            .field("rpc", &self.rpc.side())
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Capabilities initialized so far, keyed by name.
///
/// Cloning is cheap; clones are snapshots.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    entries: BTreeMap<CapabilityName, Exposed>,
}

impl CapabilitySet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, name: CapabilityName, exposed: Exposed) {
        self.entries.insert(name, exposed);
    }

    /// Typed lookup. `None` if absent or of another type.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, name: CapabilityName) -> Option<Arc<T>> {
        self.entries
            .get(&name)
            .and_then(|exposed| Arc::clone(exposed).downcast::<T>().ok())
    }

    /// Typed lookup that must succeed.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Missing`] or [`CapabilityError::TypeMismatch`].
    pub fn require<T: Any + Send + Sync>(&self, name: CapabilityName) -> CapabilityResult<Arc<T>> {
        let exposed = self
            .entries
            .get(&name)
            .ok_or(CapabilityError::Missing(name))?;
        Arc::clone(exposed)
            .downcast::<T>()
            .map_err(|_| CapabilityError::TypeMismatch {
                name,
                expected: type_name::<T>(),
            })
    }

    /// True if `name` is initialized.
    #[must_use]
    pub fn contains(&self, name: CapabilityName) -> bool {
        self.entries.contains_key(&name)
    }

    /// Initialized names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<CapabilityName> {
        self.entries.keys().copied().collect()
    }

    /// Number of capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilitySet")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u32);

    #[test]
    fn typed_lookup() {
        let mut set = CapabilitySet::new();
        set.insert(CapabilityName::Commands, Arc::new(Counter(3)));

        assert_eq!(set.get::<Counter>(CapabilityName::Commands).unwrap().0, 3);
        assert!(set.get::<String>(CapabilityName::Commands).is_none());
        assert!(matches!(
            set.require::<String>(CapabilityName::Commands),
            Err(CapabilityError::TypeMismatch { .. })
        ));
        assert_eq!(
            set.require::<Counter>(CapabilityName::Storage).err(),
            Some(CapabilityError::Missing(CapabilityName::Storage))
        );
    }

    #[test]
    fn clones_are_snapshots() {
        let mut set = CapabilitySet::new();
        let snapshot = set.clone();
        set.insert(CapabilityName::Storage, Arc::new(Counter(1)));
        assert!(snapshot.is_empty());
        assert_eq!(set.names(), vec![CapabilityName::Storage]);
    }
}
