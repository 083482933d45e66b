//! Channels and their denormalized version index.
//!
//! A channel carries an ordered list of [`VersionSummary`] entries, one per
//! version record. The list is the only shared mutable state in the system;
//! persistence layers must apply [`Channel::append_summary`] and
//! [`Channel::remove_summary`] inside their own per-document atomic unit.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, OrgId, VersionId};
use crate::version::{Location, VersionRef};

/// Index entry mirroring one version record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub id: VersionId,
    pub name: String,
    pub description: String,
    pub location: Location,
    /// Unix milliseconds.
    pub created_at: i64,
}

/// A tenant-owned, named collection of ordered manifest versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub org_id: OrgId,
    /// Unique within the tenant.
    pub name: String,
    pub tags: Vec<String>,
    /// Version index, in creation order.
    pub versions: Vec<VersionSummary>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Channel {
    /// Create an empty channel with a fresh identifier.
    pub fn new(org_id: OrgId, name: impl Into<String>, tags: Vec<String>, now: i64) -> Self {
        Self {
            id: ChannelId::generate(),
            org_id,
            name: name.into(),
            tags: normalize_tags(tags),
            versions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// Exact-match name lookup.
    pub fn has_version_named(&self, name: &str) -> bool {
        self.versions.iter().any(|v| v.name == name)
    }

    /// Resolve a summary by id or by unique name.
    pub fn find_version(&self, version: &VersionRef) -> Option<&VersionSummary> {
        match version {
            VersionRef::Id(id) => self.versions.iter().find(|v| v.id == *id),
            VersionRef::Name(name) => self.versions.iter().find(|v| v.name == *name),
        }
    }

    /// Append a summary to the index.
    ///
    /// Returns `false` without modifying the list if an entry with the same
    /// id or name is already present.
    pub fn append_summary(&mut self, summary: VersionSummary, now: i64) -> bool {
        if self
            .versions
            .iter()
            .any(|v| v.id == summary.id || v.name == summary.name)
        {
            return false;
        }
        self.versions.push(summary);
        self.updated_at = now;
        true
    }

    /// Remove the summary with the given id, keeping the order of the rest.
    pub fn remove_summary(&mut self, id: &VersionId, now: i64) -> Option<VersionSummary> {
        let index = self.versions.iter().position(|v| v.id == *id)?;
        self.updated_at = now;
        Some(self.versions.remove(index))
    }
}

/// Reference to a channel by id or by unique name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    Id(ChannelId),
    Name(String),
}

impl ChannelRef {
    pub fn name(name: impl Into<String>) -> Self {
        ChannelRef::Name(name.into())
    }

    pub fn id(&self) -> Option<ChannelId> {
        match self {
            ChannelRef::Id(id) => Some(*id),
            ChannelRef::Name(_) => None,
        }
    }

    pub fn name_str(&self) -> Option<&str> {
        match self {
            ChannelRef::Name(name) => Some(name),
            ChannelRef::Id(_) => None,
        }
    }
}

impl From<ChannelId> for ChannelRef {
    fn from(id: ChannelId) -> Self {
        ChannelRef::Id(id)
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRef::Id(id) => write!(f, "{}", id),
            ChannelRef::Name(name) => write!(f, "{:?}", name),
        }
    }
}

/// Metadata changes to a channel. Never touches the version index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelPatch {
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl ChannelPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            tags: None,
        }
    }

    pub fn retag(tags: Vec<String>) -> Self {
        Self {
            name: None,
            tags: Some(tags),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.tags.is_none()
    }
}

/// Trim and deduplicate tags, keeping first-seen order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}
