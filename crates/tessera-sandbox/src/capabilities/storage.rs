use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tessera_core::ExtensionIdentity;
use tessera_storage::{KvStore, ScopedKvStore};

use crate::error::SandboxResult;

/// Namespace for state not attributed to an extension.
pub const GLOBAL_NAMESPACE: &str = "global";

/// The backing store for per-extension state, supplied by the host as a
/// service.
#[derive(Clone)]
pub struct StateStore {
    store: Arc<dyn KvStore>,
}

impl StateStore {
    /// Wrap a key-value store.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore").finish_non_exhaustive()
    }
}

/// Hands out per-identity mementos.
#[derive(Debug, Clone)]
pub struct ExtHostStorage {
    state: StateStore,
}

impl ExtHostStorage {
    /// Serve mementos from `state`.
    #[must_use]
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }

    /// Memento for `identity`, or the global one. Identities differing only
    /// in case share a memento.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the namespace is rejected.
    pub fn memento(&self, identity: Option<&ExtensionIdentity>) -> SandboxResult<Memento> {
        let namespace = identity.map_or_else(
            || GLOBAL_NAMESPACE.to_string(),
            |id| format!("ext:{}", id.key()),
        );
        Ok(Memento {
            scope: ScopedKvStore::new(Arc::clone(self.state.store()), namespace)?,
        })
    }
}

/// JSON key-value state scoped to one extension.
#[derive(Debug, Clone)]
pub struct Memento {
    scope: ScopedKvStore,
}

impl Memento {
    /// Namespace backing this memento.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.scope.namespace()
    }

    /// Read `key`.
    ///
    /// # Errors
    ///
    /// Returns a storage error on read or decode failure.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> SandboxResult<Option<T>> {
        Ok(self.scope.get_json(key).await?)
    }

    /// Write `key`.
    ///
    /// # Errors
    ///
    /// Returns a storage error on encode or write failure.
    pub async fn update<T: Serialize + ?Sized + Sync>(&self, key: &str, value: &T) -> SandboxResult<()> {
        Ok(self.scope.set_json(key, value).await?)
    }

    /// Remove `key`. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns a storage error on write failure.
    pub async fn remove(&self, key: &str) -> SandboxResult<bool> {
        Ok(self.scope.delete(key).await?)
    }

    /// Stored keys, sorted.
    ///
    /// # Errors
    ///
    /// Returns a storage error on read failure.
    pub async fn keys(&self) -> SandboxResult<Vec<String>> {
        Ok(self.scope.list_keys().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_storage::MemoryKvStore;

    fn storage() -> ExtHostStorage {
        ExtHostStorage::new(StateStore::new(Arc::new(MemoryKvStore::new())))
    }

    #[tokio::test]
    async fn mementos_are_isolated_per_identity() {
        let storage = storage();
        let a = ExtensionIdentity::new("acme.alpha").unwrap();
        let b = ExtensionIdentity::new("acme.beta").unwrap();

        let alpha = storage.memento(Some(&a)).unwrap();
        alpha.update("count", &3u32).await.unwrap();

        let beta = storage.memento(Some(&b)).unwrap();
        assert_eq!(beta.get::<u32>("count").await.unwrap(), None);
        assert_eq!(alpha.get::<u32>("count").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn identity_case_is_ignored() {
        let storage = storage();
        let upper = ExtensionIdentity::new("Acme.Alpha").unwrap();
        let lower = ExtensionIdentity::new("acme.alpha").unwrap();

        storage
            .memento(Some(&upper))
            .unwrap()
            .update("k", "v")
            .await
            .unwrap();
        let value: Option<String> = storage.memento(Some(&lower)).unwrap().get("k").await.unwrap();
        assert_eq!(value.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn global_memento() {
        let storage = storage();
        let global = storage.memento(None).unwrap();
        assert_eq!(global.namespace(), GLOBAL_NAMESPACE);
        global.update("theme", "dark").await.unwrap();
        assert_eq!(global.keys().await.unwrap(), vec!["theme"]);
        assert!(global.remove("theme").await.unwrap());
        assert!(global.keys().await.unwrap().is_empty());
    }
}
