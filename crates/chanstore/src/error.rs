//! Error taxonomy surfaced to callers of the channel version store.
//!
//! Domain errors (validation, not-found, dependency, authorization) pass
//! through unchanged. Everything else is logged with a fresh correlation id
//! and collapsed into [`ChannelStoreError::Internal`].

use std::fmt;

use rand::RngCore;
use thiserror::Error;

use chanstore_access::{AccessError, AuthorizationError};
use chanstore_core::ValidationError;
use chanstore_objects::ObjectStoreError;
use chanstore_store::StoreError;

use crate::backend::BackendError;
use crate::cascade::CascadeError;

/// Which lookup layer came up empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Missing {
    Organization,
    Channel,
    /// The channel exists but its index has no matching entry.
    VersionSummary,
    /// The index entry exists but the authoritative record does not.
    VersionRecord,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Missing::Organization => "organization",
            Missing::Channel => "channel",
            Missing::VersionSummary => "version",
            Missing::VersionRecord => "version record",
        })
    }
}

/// Errors returned by [`ChannelVersionStore`](crate::ChannelVersionStore).
#[derive(Debug, Error)]
pub enum ChannelStoreError {
    /// Bad input, duplicate name, quota, size or manifest syntax.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0} not found")]
    NotFound(Missing),

    /// Subscriptions still reference the resource. Nothing was changed.
    #[error("{resource} is referenced by {count} subscription(s)")]
    Dependency { resource: String, count: usize },

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    /// An infrastructure failure. Details are in the logs under the id.
    #[error("internal error (correlation id {correlation_id})")]
    Internal { correlation_id: String },
}

impl ChannelStoreError {
    /// Log `source` under a new correlation id and return the opaque error.
    pub fn internal(source: impl Into<anyhow::Error>) -> Self {
        let source = source.into();
        let correlation_id = correlation_id();
        tracing::error!(correlation_id = %correlation_id, error = ?source, "internal failure");
        ChannelStoreError::Internal { correlation_id }
    }

    /// The missing layer, for `NotFound` errors.
    pub fn missing(&self) -> Option<Missing> {
        match self {
            ChannelStoreError::NotFound(missing) => Some(*missing),
            _ => None,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, ChannelStoreError::Internal { .. })
    }
}

fn correlation_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl From<AccessError> for ChannelStoreError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::UnknownOrganization(_) => ChannelStoreError::NotFound(Missing::Organization),
            other => ChannelStoreError::internal(other),
        }
    }
}

impl From<StoreError> for ChannelStoreError {
    fn from(e: StoreError) -> Self {
        ChannelStoreError::internal(e)
    }
}

impl From<ObjectStoreError> for ChannelStoreError {
    fn from(e: ObjectStoreError) -> Self {
        ChannelStoreError::internal(e)
    }
}

impl From<BackendError> for ChannelStoreError {
    fn from(e: BackendError) -> Self {
        ChannelStoreError::internal(e)
    }
}

impl From<CascadeError> for ChannelStoreError {
    fn from(e: CascadeError) -> Self {
        ChannelStoreError::internal(e)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, ChannelStoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chanstore_core::OrgId;

    #[test]
    fn test_internal_hides_source() {
        let err = ChannelStoreError::internal(StoreError::InvalidData("secret detail".into()));
        let msg = err.to_string();
        assert!(err.is_internal());
        assert!(!msg.contains("secret"));
        match err {
            ChannelStoreError::Internal { correlation_id } => assert_eq!(correlation_id.len(), 16),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_org_is_not_found() {
        let err: ChannelStoreError = AccessError::UnknownOrganization(OrgId::new("ghost")).into();
        assert_eq!(err.missing(), Some(Missing::Organization));

        let err: ChannelStoreError = AccessError::Decryption("tag mismatch".into()).into();
        assert!(err.is_internal());
    }

    #[test]
    fn test_validation_passes_through() {
        let err: ChannelStoreError = ValidationError::EmptyName.into();
        assert_eq!(err.to_string(), "name must not be empty");
    }
}
