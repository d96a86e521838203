//! Key-value store trait, in-memory implementation and scoped view.
//!
//! Every operation is addressed by `(namespace, key)`. Extensions receive a
//! [`ScopedKvStore`] bound to their own namespace and never see anything
//! outside it.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};

/// Namespace → key → value.
pub(crate) type Namespaces = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// Namespaces must be non-empty and free of null bytes.
pub(crate) fn validate_namespace(namespace: &str) -> StorageResult<()> {
    if namespace.is_empty() {
        return Err(StorageError::InvalidKey(
            "namespace must not be empty".into(),
        ));
    }
    if namespace.contains('\0') {
        return Err(StorageError::InvalidKey(
            "namespace must not contain null bytes".into(),
        ));
    }
    Ok(())
}

/// Keys must be non-empty and free of null bytes.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".into()));
    }
    if key.contains('\0') {
        return Err(StorageError::InvalidKey(
            "key must not contain null bytes".into(),
        ));
    }
    Ok(())
}

/// Namespaced byte-level storage.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a value, `None` if the key does not exist.
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Set a value, overwriting any existing one.
    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Delete a key. Returns `true` if it existed.
    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// Check if a key exists.
    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        Ok(self.get(namespace, key).await?.is_some())
    }

    /// List every key in a namespace, in lexical order.
    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>>;

    /// Delete every key in a namespace, returning how many were removed.
    async fn clear_namespace(&self, namespace: &str) -> StorageResult<u64>;
}

/// Ephemeral in-memory store.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    data: RwLock<Namespaces>,
}

impl MemoryKvStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Namespaces>> {
        self.data
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Namespaces>> {
        self.data
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        Ok(self
            .read()?
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        self.write()?
            .entry(namespace.to_owned())
            .or_default()
            .insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let mut data = self.write()?;
        let Some(entries) = data.get_mut(namespace) else {
            return Ok(false);
        };
        let removed = entries.remove(key).is_some();
        if entries.is_empty() {
            data.remove(namespace);
        }
        Ok(removed)
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        validate_namespace(namespace)?;
        Ok(self
            .read()?
            .get(namespace)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear_namespace(&self, namespace: &str) -> StorageResult<u64> {
        validate_namespace(namespace)?;
        let removed = self.write()?.remove(namespace);
        Ok(removed.map_or(0, |entries| entries.len() as u64))
    }
}

/// A [`KvStore`] view bound to one namespace.
#[derive(Clone)]
pub struct ScopedKvStore {
    inner: Arc<dyn KvStore>,
    namespace: String,
}

impl std::fmt::Debug for ScopedKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedKvStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl ScopedKvStore {
    /// Bind `store` to `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the namespace is empty or
    /// contains null bytes.
    pub fn new(store: Arc<dyn KvStore>, namespace: impl Into<String>) -> StorageResult<Self> {
        let namespace = namespace.into();
        validate_namespace(&namespace)?;
        Ok(Self {
            inner: store,
            namespace,
        })
    }

    /// The bound namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Get raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] for an invalid key, or the
    /// backend's error.
    pub async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(&self.namespace, key).await
    }

    /// Set raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] for an invalid key, or the
    /// backend's error.
    pub async fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.inner.set(&self.namespace, key, value).await
    }

    /// Delete a key. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.inner.delete(&self.namespace, key).await
    }

    /// Check if a key exists.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(&self.namespace, key).await
    }

    /// Every key in the namespace.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub async fn list_keys(&self) -> StorageResult<Vec<String>> {
        self.inner.list_keys(&self.namespace).await
    }

    /// Delete every key in the namespace.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub async fn clear(&self) -> StorageResult<u64> {
        self.inner.clear_namespace(&self.namespace).await
    }

    /// Read and deserialize a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the stored bytes are not
    /// valid JSON for `T`.
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> StorageResult<Option<T>> {
        match self.get(key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Serialize a value as JSON and store it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if serialization fails.
    pub async fn set_json<T: serde::Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> StorageResult<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.set(key, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_get_set_delete() {
        let store = MemoryKvStore::new();
        assert_eq!(store.get("ns", "k").await.unwrap(), None);
        store.set("ns", "k", b"v".to_vec()).await.unwrap();
        assert_eq!(store.get("ns", "k").await.unwrap(), Some(b"v".to_vec()));
        assert!(store.exists("ns", "k").await.unwrap());
        assert!(store.delete("ns", "k").await.unwrap());
        assert!(!store.delete("ns", "k").await.unwrap());
        assert!(!store.exists("ns", "k").await.unwrap());
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let store = MemoryKvStore::new();
        store.set("a", "k", b"1".to_vec()).await.unwrap();
        store.set("b", "k", b"2".to_vec()).await.unwrap();
        assert_eq!(store.get("a", "k").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.clear_namespace("a").await.unwrap(), 1);
        assert_eq!(store.get("a", "k").await.unwrap(), None);
        assert_eq!(store.get("b", "k").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn list_keys_sorted() {
        let store = MemoryKvStore::new();
        for key in ["c", "a", "b"] {
            store.set("ns", key, Vec::new()).await.unwrap();
        }
        assert_eq!(store.list_keys("ns").await.unwrap(), vec!["a", "b", "c"]);
        assert!(store.list_keys("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_keys_rejected() {
        let store = MemoryKvStore::new();
        assert!(matches!(
            store.set("", "k", Vec::new()).await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            store.get("ns", "a\0b").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn scoped_json_round_trip() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let scoped = ScopedKvStore::new(Arc::clone(&store), "ext:acme.demo").unwrap();
        scoped.set_json("count", &3u32).await.unwrap();
        assert_eq!(scoped.get_json::<u32>("count").await.unwrap(), Some(3));
        assert_eq!(scoped.list_keys().await.unwrap(), vec!["count"]);
        assert!(store.exists("ext:acme.demo", "count").await.unwrap());
    }

    #[tokio::test]
    async fn scoped_bad_json() {
        let scoped = ScopedKvStore::new(Arc::new(MemoryKvStore::new()), "ns").unwrap();
        scoped.set("k", b"not json".to_vec()).await.unwrap();
        assert!(matches!(
            scoped.get_json::<u32>("k").await,
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn scoped_rejects_empty_namespace() {
        assert!(ScopedKvStore::new(Arc::new(MemoryKvStore::new()), "").is_err());
    }
}
