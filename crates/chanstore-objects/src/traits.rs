//! Object store client trait and locator type.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{ObjectStoreError, Result};

/// Scheme prefix of every locator string.
pub const LOCATOR_SCHEME: &str = "objects://";

/// Address of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocator {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocator {
    /// Build a locator, validating both parts.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        let key = key.into();
        validate_bucket(&bucket)?;
        validate_key(&key)?;
        Ok(Self { bucket, key })
    }

    /// Parse `objects://{bucket}/{key}`.
    pub fn parse(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix(LOCATOR_SCHEME)
            .ok_or_else(|| ObjectStoreError::InvalidLocator(s.to_string()))?;
        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| ObjectStoreError::InvalidLocator(s.to_string()))?;
        Self::new(bucket, key).map_err(|_| ObjectStoreError::InvalidLocator(s.to_string()))
    }
}

impl fmt::Display for ObjectLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", LOCATOR_SCHEME, self.bucket, self.key)
    }
}

impl FromStr for ObjectLocator {
    type Err = ObjectStoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Bucket names are a single non-empty path segment.
pub fn validate_bucket(bucket: &str) -> Result<()> {
    if bucket.is_empty() || bucket.contains('/') || bucket == "." || bucket == ".." {
        return Err(ObjectStoreError::InvalidKey(bucket.to_string()));
    }
    Ok(())
}

/// Keys are relative `/`-separated paths with no empty, `.` or `..` segments.
pub fn validate_key(key: &str) -> Result<()> {
    let bad_segment = key
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == ".." || seg.contains('\\'));
    if key.is_empty() || bad_segment {
        return Err(ObjectStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Async object store client.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create the bucket if it does not exist. Calling it again is a no-op.
    async fn ensure_bucket(&self, bucket: &str) -> Result<()>;

    /// Store `bytes` under `key`, replacing any previous object.
    async fn put(&self, bucket: &str, key: &str, bytes: Bytes) -> Result<ObjectLocator>;

    /// Fetch an object's bytes.
    async fn get(&self, locator: &ObjectLocator) -> Result<Bytes>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, locator: &ObjectLocator) -> Result<()>;
}
