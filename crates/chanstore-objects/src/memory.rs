//! In-memory object store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::error::{ObjectStoreError, Result};
use crate::traits::{validate_bucket, ObjectLocator, ObjectStore};

/// Object store kept entirely in memory.
///
/// Counts bucket creations so callers can observe that `ensure_bucket` is
/// idempotent.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: RwLock<HashMap<String, HashMap<String, Bytes>>>,
    bucket_creations: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times a bucket was actually created.
    pub fn bucket_creations(&self) -> usize {
        self.bucket_creations.load(Ordering::SeqCst)
    }

    /// Total number of stored objects across all buckets.
    pub async fn object_count(&self) -> usize {
        self.buckets.read().await.values().map(HashMap::len).sum()
    }

    pub async fn contains(&self, locator: &ObjectLocator) -> bool {
        self.buckets
            .read()
            .await
            .get(&locator.bucket)
            .map_or(false, |objects| objects.contains_key(&locator.key))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        validate_bucket(bucket)?;
        let mut buckets = self.buckets.write().await;
        if !buckets.contains_key(bucket) {
            buckets.insert(bucket.to_string(), HashMap::new());
            self.bucket_creations.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(bucket, "created bucket");
        }
        Ok(())
    }

    async fn put(&self, bucket: &str, key: &str, bytes: Bytes) -> Result<ObjectLocator> {
        let locator = ObjectLocator::new(bucket, key)?;
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| ObjectStoreError::NoSuchBucket(bucket.to_string()))?;
        objects.insert(key.to_string(), bytes);
        Ok(locator)
    }

    async fn get(&self, locator: &ObjectLocator) -> Result<Bytes> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(&locator.bucket)
            .ok_or_else(|| ObjectStoreError::NoSuchBucket(locator.bucket.clone()))?;
        objects
            .get(&locator.key)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NoSuchObject(locator.to_string()))
    }

    async fn delete(&self, locator: &ObjectLocator) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        if let Some(objects) = buckets.get_mut(&locator.bucket) {
            objects.remove(&locator.key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_bucket_idempotent() {
        let store = MemoryObjectStore::new();
        store.ensure_bucket("manifests").await.unwrap();
        store.ensure_bucket("manifests").await.unwrap();
        assert_eq!(store.bucket_creations(), 1);
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryObjectStore::new();
        store.ensure_bucket("manifests").await.unwrap();

        let loc = store
            .put("manifests", "acme/c/k", Bytes::from_static(b"cipher"))
            .await
            .unwrap();
        assert_eq!(loc.to_string(), "objects://manifests/acme/c/k");
        assert_eq!(store.get(&loc).await.unwrap(), Bytes::from_static(b"cipher"));
        assert!(store.contains(&loc).await);

        store.delete(&loc).await.unwrap();
        assert!(!store.contains(&loc).await);
        assert!(matches!(
            store.get(&loc).await,
            Err(ObjectStoreError::NoSuchObject(_))
        ));

        // Deleting again is fine.
        store.delete(&loc).await.unwrap();
    }

    #[tokio::test]
    async fn test_put_requires_bucket() {
        let store = MemoryObjectStore::new();
        let err = store
            .put("missing", "k", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectStoreError::NoSuchBucket(b) if b == "missing"));
    }
}
