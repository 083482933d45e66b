//! # Chanstore Access
//!
//! Content encryption, tenant keys, and authorization checks.
//!
//! ## Overview
//!
//! - **Cipher**: AES-256-GCM over tenant content with a fresh 16-byte
//!   initialization vector per version record
//! - **Key Manager**: resolves an organization's current key (the first of its
//!   ordered key list)
//! - **Authorization Gateway**: decides whether an actor may perform an action
//!   on a channel or version
//!
//! The store consumes these as trait objects. [`OrgKeyring`] and
//! [`GrantTable`] are in-process implementations used by tests and embedded
//! deployments.
//!
//! ## Key Rotation
//!
//! Records carry only their IV, not a key reference. Encryption and
//! decryption both use the organization's current key, so rotating the key
//! list makes previously written content undecryptable.

pub mod authz;
pub mod cipher;
pub mod error;
pub mod keys;

pub use authz::{AccessRequest, Action, Actor, AuthorizationGateway, GrantScope, GrantTable, ResourceType};
pub use cipher::{InitVector, OrgKey, SealedContent, KEY_LEN};
pub use error::{AccessError, AuthorizationError, Result};
pub use keys::{KeyManager, OrgKeyring};
