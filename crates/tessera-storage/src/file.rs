//! Persistent key-value store backed by one JSON snapshot file.
//!
//! The whole store lives in memory; every mutation rewrites the snapshot
//! through a temporary file and a rename, so a crash leaves either the old
//! or the new snapshot on disk. Values are base64-encoded in the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::kv::{KvStore, Namespaces, validate_key, validate_namespace};

type Snapshot = BTreeMap<String, BTreeMap<String, String>>;

/// A [`KvStore`] persisted to a JSON file.
#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    data: Mutex<Namespaces>,
}

impl FileKvStore {
    /// Open the store at `path`, loading an existing snapshot if present.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the file exists but cannot be read,
    /// or [`StorageError::Serialization`] if it is not a valid snapshot.
    pub async fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => decode_snapshot(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Namespaces::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), namespaces = data.len(), "opened kv snapshot");
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Location of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, data: &Namespaces) -> StorageResult<()> {
        let snapshot: Snapshot = data
            .iter()
            .map(|(ns, entries)| {
                let encoded = entries
                    .iter()
                    .map(|(k, v)| (k.clone(), STANDARD.encode(v)))
                    .collect();
                (ns.clone(), encoded)
            })
            .collect();
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn decode_snapshot(bytes: &[u8]) -> StorageResult<Namespaces> {
    let snapshot: Snapshot =
        serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
    snapshot
        .into_iter()
        .map(|(ns, entries)| {
            let decoded = entries
                .into_iter()
                .map(|(k, v)| {
                    STANDARD
                        .decode(v)
                        .map(|v| (k, v))
                        .map_err(|e| StorageError::Serialization(e.to_string()))
                })
                .collect::<StorageResult<BTreeMap<_, _>>>()?;
            Ok((ns, decoded))
        })
        .collect()
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let data = self.data.lock().await;
        Ok(data.get(namespace).and_then(|e| e.get(key)).cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let mut data = self.data.lock().await;
        data.entry(namespace.to_owned())
            .or_default()
            .insert(key.to_owned(), value);
        self.persist(&data).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let mut data = self.data.lock().await;
        let removed = data
            .get_mut(namespace)
            .is_some_and(|entries| entries.remove(key).is_some());
        if !removed {
            return Ok(false);
        }
        if data.get(namespace).is_some_and(BTreeMap::is_empty) {
            data.remove(namespace);
        }
        self.persist(&data).await?;
        Ok(true)
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        validate_namespace(namespace)?;
        let data = self.data.lock().await;
        Ok(data
            .get(namespace)
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear_namespace(&self, namespace: &str) -> StorageResult<u64> {
        validate_namespace(namespace)?;
        let mut data = self.data.lock().await;
        let Some(removed) = data.remove(namespace) else {
            return Ok(0);
        };
        self.persist(&data).await?;
        Ok(removed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("kv.json");

        let store = FileKvStore::open(&path).await.unwrap();
        store.set("ns", "bin", vec![0, 159, 255]).await.unwrap();
        store.set("ns", "text", b"hello".to_vec()).await.unwrap();
        assert!(store.delete("ns", "text").await.unwrap());
        drop(store);

        let reopened = FileKvStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get("ns", "bin").await.unwrap(),
            Some(vec![0, 159, 255])
        );
        assert_eq!(reopened.get("ns", "text").await.unwrap(), None);
        assert_eq!(reopened.list_keys("ns").await.unwrap(), vec!["bin"]);
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKvStore::open(dir.path().join("kv.json")).await.unwrap();
        assert!(store.list_keys("ns").await.unwrap().is_empty());
        assert_eq!(store.clear_namespace("ns").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileKvStore::open(&path).await,
            Err(StorageError::Serialization(_))
        ));
    }
}
