//! Storage backends for version ciphertext.
//!
//! New content goes to the backend chosen by configuration. Existing content
//! is read and deleted by the backend its [`StoredContent`] tag names, so
//! switching configuration never strands older versions.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use chanstore_core::{ChannelId, Location, OrgId, StoredContent};
use chanstore_objects::{ObjectLocator, ObjectStore, ObjectStoreError};

/// Errors from a storage backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Content lives in the object store but no object client is wired, or
    /// writes target the object store without a bucket.
    #[error("object store is not configured")]
    NotConfigured,

    /// Content was handed to a backend that does not hold it.
    #[error("{expected} backend cannot handle {found} content")]
    WrongLocation { expected: Location, found: Location },

    #[error(transparent)]
    Object(#[from] ObjectStoreError),
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// Identifies the version a payload belongs to.
#[derive(Debug, Clone, Copy)]
pub struct PayloadTarget<'a> {
    pub org_id: &'a OrgId,
    pub channel_id: &'a ChannelId,
    pub name: &'a str,
}

/// Deterministic object key: `{org}/{channel hex}/{blake3(lowercase name) hex}`.
pub fn object_key(target: &PayloadTarget<'_>) -> String {
    let name_hash = blake3::hash(target.name.to_lowercase().as_bytes());
    format!(
        "{}/{}/{}",
        target.org_id,
        target.channel_id.to_hex(),
        name_hash.to_hex()
    )
}

/// Persists ciphertext and hands back what the record should store.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn location(&self) -> Location;

    async fn write(&self, target: &PayloadTarget<'_>, ciphertext: Vec<u8>) -> Result<StoredContent>;

    async fn read(&self, content: &StoredContent) -> Result<Bytes>;

    async fn delete(&self, content: &StoredContent) -> Result<()>;
}

/// Ciphertext embedded in the version record itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineBackend;

#[async_trait]
impl StorageBackend for InlineBackend {
    fn location(&self) -> Location {
        Location::Inline
    }

    async fn write(&self, _target: &PayloadTarget<'_>, ciphertext: Vec<u8>) -> Result<StoredContent> {
        Ok(StoredContent::Inline(ciphertext))
    }

    async fn read(&self, content: &StoredContent) -> Result<Bytes> {
        match content {
            StoredContent::Inline(bytes) => Ok(Bytes::copy_from_slice(bytes)),
            other => Err(BackendError::WrongLocation {
                expected: Location::Inline,
                found: other.location(),
            }),
        }
    }

    async fn delete(&self, _content: &StoredContent) -> Result<()> {
        // Goes away with the record.
        Ok(())
    }
}

/// Ciphertext stored as an object; the record keeps the locator.
pub struct ObjectStoreBackend {
    client: Arc<dyn ObjectStore>,
    /// Write target. Reads and deletes take the bucket from the locator.
    bucket: Option<String>,
}

impl ObjectStoreBackend {
    pub fn new(client: Arc<dyn ObjectStore>, bucket: Option<String>) -> Self {
        Self { client, bucket }
    }

    pub fn client(&self) -> Arc<dyn ObjectStore> {
        self.client.clone()
    }

    fn locator(content: &StoredContent) -> Result<ObjectLocator> {
        let locator = content.locator().ok_or(BackendError::WrongLocation {
            expected: Location::ObjectStore,
            found: content.location(),
        })?;
        Ok(ObjectLocator::parse(locator)?)
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    fn location(&self) -> Location {
        Location::ObjectStore
    }

    async fn write(&self, target: &PayloadTarget<'_>, ciphertext: Vec<u8>) -> Result<StoredContent> {
        let bucket = self.bucket.as_deref().ok_or(BackendError::NotConfigured)?;
        self.client.ensure_bucket(bucket).await?;

        let key = object_key(target);
        let len = ciphertext.len();
        let locator = self.client.put(bucket, &key, Bytes::from(ciphertext)).await?;
        tracing::debug!(%locator, len, "uploaded version payload");
        Ok(StoredContent::ObjectStore(locator.to_string()))
    }

    async fn read(&self, content: &StoredContent) -> Result<Bytes> {
        let locator = Self::locator(content)?;
        Ok(self.client.get(&locator).await?)
    }

    async fn delete(&self, content: &StoredContent) -> Result<()> {
        let locator = Self::locator(content)?;
        self.client.delete(&locator).await?;
        tracing::debug!(%locator, "deleted version payload");
        Ok(())
    }
}

/// Picks the backend for each operation.
pub struct Backends {
    inline: InlineBackend,
    objects: Option<ObjectStoreBackend>,
    write_to_objects: bool,
}

impl Backends {
    /// `bucket` is the configured write target; `None` means new content is
    /// stored inline.
    pub fn new(client: Option<Arc<dyn ObjectStore>>, bucket: Option<String>) -> Self {
        let write_to_objects = bucket.is_some();
        Self {
            inline: InlineBackend,
            objects: client.map(|c| ObjectStoreBackend::new(c, bucket)),
            write_to_objects,
        }
    }

    /// Where new content will be written.
    pub fn write_location(&self) -> Location {
        if self.write_to_objects {
            Location::ObjectStore
        } else {
            Location::Inline
        }
    }

    fn by_location(&self, location: Location) -> Result<&dyn StorageBackend> {
        match location {
            Location::Inline => Ok(&self.inline as &dyn StorageBackend),
            Location::ObjectStore => self
                .objects
                .as_ref()
                .map(|b| b as &dyn StorageBackend)
                .ok_or(BackendError::NotConfigured),
        }
    }

    pub async fn write(&self, target: &PayloadTarget<'_>, ciphertext: Vec<u8>) -> Result<StoredContent> {
        self.by_location(self.write_location())?
            .write(target, ciphertext)
            .await
    }

    pub async fn read(&self, content: &StoredContent) -> Result<Bytes> {
        self.by_location(content.location())?.read(content).await
    }

    pub async fn delete(&self, content: &StoredContent) -> Result<()> {
        self.by_location(content.location())?.delete(content).await
    }

    /// The object client, for bulk operations that bypass the per-record path.
    pub fn object_client(&self) -> Option<Arc<dyn ObjectStore>> {
        self.objects.as_ref().map(ObjectStoreBackend::client)
    }
}
