//! Filesystem object store: one directory per bucket under a root path.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{ObjectStoreError, Result};
use crate::traits::{validate_bucket, ObjectLocator, ObjectStore};

/// Object store backed by plain files.
///
/// Keys map to relative paths inside the bucket directory; locators never
/// escape the root because `..` and absolute segments are rejected on parse.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Use `root` as the store root. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn object_path(&self, locator: &ObjectLocator) -> PathBuf {
        let mut path = self.bucket_dir(&locator.bucket);
        path.extend(locator.key.split('/'));
        path
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        validate_bucket(bucket)?;
        let dir = self.bucket_dir(bucket);
        if tokio::fs::metadata(&dir).await.is_err() {
            tokio::fs::create_dir_all(&dir).await?;
            tracing::debug!(bucket, path = %dir.display(), "created bucket directory");
        }
        Ok(())
    }

    async fn put(&self, bucket: &str, key: &str, bytes: Bytes) -> Result<ObjectLocator> {
        let locator = ObjectLocator::new(bucket, key)?;
        if tokio::fs::metadata(self.bucket_dir(bucket)).await.is_err() {
            return Err(ObjectStoreError::NoSuchBucket(bucket.to_string()));
        }

        let path = self.object_path(&locator);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        tracing::debug!(%locator, len = bytes.len(), "wrote object");
        Ok(locator)
    }

    async fn get(&self, locator: &ObjectLocator) -> Result<Bytes> {
        match tokio::fs::read(self.object_path(locator)).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ObjectStoreError::NoSuchObject(locator.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, locator: &ObjectLocator) -> Result<()> {
        match tokio::fs::remove_file(self.object_path(locator)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.ensure_bucket("manifests").await.unwrap();
        store.ensure_bucket("manifests").await.unwrap();

        let loc = store
            .put("manifests", "acme/00ff/abcd", Bytes::from_static(b"sealed"))
            .await
            .unwrap();
        assert!(dir.path().join("manifests/acme/00ff/abcd").exists());
        assert_eq!(store.get(&loc).await.unwrap(), Bytes::from_static(b"sealed"));

        store.delete(&loc).await.unwrap();
        store.delete(&loc).await.unwrap();
        assert!(matches!(
            store.get(&loc).await,
            Err(ObjectStoreError::NoSuchObject(_))
        ));
    }

    #[tokio::test]
    async fn test_put_without_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        assert!(matches!(
            store.put("nope", "k", Bytes::from_static(b"x")).await,
            Err(ObjectStoreError::NoSuchBucket(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.ensure_bucket("b").await.unwrap();
        assert!(matches!(
            store.put("b", "../outside", Bytes::from_static(b"x")).await,
            Err(ObjectStoreError::InvalidKey(_))
        ));
    }
}
