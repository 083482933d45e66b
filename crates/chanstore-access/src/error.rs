//! Error types for the access module.

use chanstore_core::OrgId;
use thiserror::Error;

use crate::authz::{Action, ResourceType};

/// Errors from encryption and key management.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Encryption error.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Decryption error. Also what a rotated key looks like at read time.
    #[error("decryption error: {0}")]
    Decryption(String),

    /// The organization is unknown to the key manager.
    #[error("unknown organization: {0}")]
    UnknownOrganization(OrgId),

    /// The organization exists but has no keys.
    #[error("organization {0} has no encryption keys")]
    NoKeys(OrgId),

    /// Key material of the wrong length.
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
}

/// The actor lacks the capability for an action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{actor} may not {action} {resource_type} {resource}")]
pub struct AuthorizationError {
    pub actor: String,
    pub action: Action,
    pub resource_type: ResourceType,
    pub resource: String,
}

/// Result type for access operations.
pub type Result<T> = std::result::Result<T, AccessError>;
