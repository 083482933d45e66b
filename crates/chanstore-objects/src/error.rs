//! Error types for object store clients.

use thiserror::Error;

/// Errors that can occur talking to an object store.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// The bucket has not been created.
    #[error("no such bucket: {0}")]
    NoSuchBucket(String),

    /// No object exists at the locator.
    #[error("no such object: {0}")]
    NoSuchObject(String),

    /// The locator string is not of the form `objects://bucket/key`.
    #[error("invalid object locator: {0:?}")]
    InvalidLocator(String),

    /// Bucket or key contains characters the store cannot address.
    #[error("invalid object key: {0:?}")]
    InvalidKey(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure reported by the backing service.
    #[error("object store error: {0}")]
    Backend(String),
}

/// Result type for object store operations.
pub type Result<T> = std::result::Result<T, ObjectStoreError>;
