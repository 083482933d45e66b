//! # Chanstore Core
//!
//! Pure data model for the channel version store: tenant channels, their
//! denormalized version index, and the authoritative version records.
//!
//! This crate contains no I/O, no storage, no encryption. It is pure
//! computation over the records the store persists.
//!
//! ## Key Types
//!
//! - [`Channel`] - A tenant-scoped, named collection of ordered versions
//! - [`VersionSummary`] - Index entry inside a channel mirroring one record
//! - [`VersionRecord`] - The immutable, encrypted unit of manifest content
//! - [`StoredContent`] - Tagged union of the two storage backends
//! - [`ManifestFormat`] / [`ManifestSyntax`] - Format tag and syntax checker
//!
//! ## Index Invariant
//!
//! Every summary in [`Channel::versions`] corresponds to exactly one record
//! with matching id, name and location. Records are written before their
//! summary and outlive it on delete, so a crash can only ever leave an
//! orphan record, never a dangling summary.

pub mod channel;
pub mod error;
pub mod manifest;
pub mod types;
pub mod validation;
pub mod version;

pub use channel::{normalize_tags, Channel, ChannelPatch, ChannelRef, VersionSummary};
pub use error::{SyntaxError, ValidationError};
pub use manifest::{ManifestFormat, ManifestSyntax, YamlDocuments};
pub use types::{now_millis, ChannelId, OrgId, SubscriptionId, VersionId};
pub use validation::{
    check_content_size, check_content_source, check_manifest, check_object_name_collision,
    check_unique_version_name, check_version_quota, validate_name, validate_tags, Limits,
};
pub use version::{
    Location, StoredContent, Subscription, Version, VersionRecord, VersionRef, IV_LEN,
};
