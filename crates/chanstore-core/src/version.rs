//! Version records: the authoritative, immutable unit of channel content.
//!
//! A record is written exactly once and never updated. Its storage location
//! is fixed at creation and is carried by the [`StoredContent`] tag, so reads
//! and deletes never consult the store's current configuration.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::channel::VersionSummary;
use crate::manifest::ManifestFormat;
use crate::types::{ChannelId, OrgId, SubscriptionId, VersionId};

/// Length of the per-record initialization vector.
pub const IV_LEN: usize = 16;

/// Where a version's ciphertext lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Location {
    /// Ciphertext embedded in the version record.
    Inline,
    /// Ciphertext stored as an object; the record holds its locator.
    ObjectStore,
}

impl Location {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Location::Inline => "inline",
            Location::ObjectStore => "object-store",
        }
    }

    /// Convert to the integer persisted by SQL backends.
    pub const fn to_u8(self) -> u8 {
        match self {
            Location::Inline => 0,
            Location::ObjectStore => 1,
        }
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Location::Inline),
            1 => Some(Location::ObjectStore),
            _ => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persisted payload of a version record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoredContent {
    /// Ciphertext bytes.
    Inline(Vec<u8>),
    /// Resource locator of the ciphertext object.
    ObjectStore(String),
}

impl StoredContent {
    pub fn location(&self) -> Location {
        match self {
            StoredContent::Inline(_) => Location::Inline,
            StoredContent::ObjectStore(_) => Location::ObjectStore,
        }
    }

    /// The object locator, if this content lives in the object store.
    pub fn locator(&self) -> Option<&str> {
        match self {
            StoredContent::ObjectStore(locator) => Some(locator),
            StoredContent::Inline(_) => None,
        }
    }
}

impl fmt::Debug for StoredContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoredContent::Inline(bytes) => write!(f, "Inline({} bytes)", bytes.len()),
            StoredContent::ObjectStore(locator) => write!(f, "ObjectStore({})", locator),
        }
    }
}

/// An authoritative version record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub id: VersionId,
    pub org_id: OrgId,
    pub channel_id: ChannelId,
    /// Unique within the channel.
    pub name: String,
    pub description: String,
    pub format: ManifestFormat,
    pub content: StoredContent,
    /// Recorded once, reused for every decryption of this record.
    pub iv: [u8; IV_LEN],
    pub created_by: String,
    /// Unix milliseconds.
    pub created_at: i64,
}

impl VersionRecord {
    pub fn location(&self) -> Location {
        self.content.location()
    }

    /// Build the index entry mirroring this record.
    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            location: self.location(),
            created_at: self.created_at,
        }
    }

    /// Check that an index entry mirrors this record.
    pub fn matches_summary(&self, summary: &VersionSummary) -> bool {
        summary.id == self.id && summary.name == self.name && summary.location == self.location()
    }
}

/// A version with its decrypted content, as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub id: VersionId,
    pub channel_id: ChannelId,
    pub name: String,
    pub description: String,
    pub format: ManifestFormat,
    pub location: Location,
    pub created_by: String,
    pub created_at: i64,
    /// Plaintext manifest content.
    pub content: Bytes,
}

impl Version {
    pub fn from_record(record: VersionRecord, plaintext: impl Into<Bytes>) -> Self {
        let location = record.location();
        Self {
            id: record.id,
            channel_id: record.channel_id,
            name: record.name,
            description: record.description,
            format: record.format,
            location,
            created_by: record.created_by,
            created_at: record.created_at,
            content: plaintext.into(),
        }
    }
}

/// Reference to a version within a channel, by id or by unique name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRef {
    Id(VersionId),
    Name(String),
}

impl VersionRef {
    pub fn name(name: impl Into<String>) -> Self {
        VersionRef::Name(name.into())
    }
}

impl From<VersionId> for VersionRef {
    fn from(id: VersionId) -> Self {
        VersionRef::Id(id)
    }
}

impl fmt::Display for VersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRef::Id(id) => write!(f, "{}", id),
            VersionRef::Name(name) => write!(f, "{:?}", name),
        }
    }
}

/// A remote agent's subscription. Its existence blocks deletion of the
/// channel or version it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub org_id: OrgId,
    pub channel_id: Option<ChannelId>,
    pub version_id: Option<VersionId>,
}

impl Subscription {
    pub fn to_channel(org_id: OrgId, channel_id: ChannelId) -> Self {
        Self {
            id: SubscriptionId::generate(),
            org_id,
            channel_id: Some(channel_id),
            version_id: None,
        }
    }

    pub fn to_version(org_id: OrgId, channel_id: ChannelId, version_id: VersionId) -> Self {
        Self {
            id: SubscriptionId::generate(),
            org_id,
            channel_id: Some(channel_id),
            version_id: Some(version_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(content: StoredContent) -> VersionRecord {
        VersionRecord {
            id: VersionId::from_bytes([1; 16]),
            org_id: OrgId::new("acme"),
            channel_id: ChannelId::from_bytes([2; 16]),
            name: "v1".into(),
            description: "first".into(),
            format: ManifestFormat::Json,
            content,
            iv: [7; IV_LEN],
            created_by: "ops".into(),
            created_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_location_follows_content_tag() {
        assert_eq!(record(StoredContent::Inline(vec![1])).location(), Location::Inline);
        assert_eq!(
            record(StoredContent::ObjectStore("objects://b/k".into())).location(),
            Location::ObjectStore
        );
    }

    #[test]
    fn test_location_u8_roundtrip() {
        for location in [Location::Inline, Location::ObjectStore] {
            assert_eq!(Location::from_u8(location.to_u8()), Some(location));
        }
        assert_eq!(Location::from_u8(9), None);
    }

    #[test]
    fn test_summary_mirrors_record() {
        let r = record(StoredContent::Inline(vec![1, 2, 3]));
        let summary = r.summary();
        assert!(r.matches_summary(&summary));

        let mut renamed = summary.clone();
        renamed.name = "v2".into();
        assert!(!r.matches_summary(&renamed));

        let mut moved = summary;
        moved.location = Location::ObjectStore;
        assert!(!r.matches_summary(&moved));
    }

    #[test]
    fn test_debug_hides_ciphertext() {
        let content = StoredContent::Inline(vec![0xff; 64]);
        assert_eq!(format!("{:?}", content), "Inline(64 bytes)");
    }
}
