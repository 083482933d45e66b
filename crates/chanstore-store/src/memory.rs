//! In-memory implementation of the Store trait.
//!
//! Primarily for tests and embedding. It has the same semantics as SQLite,
//! including the uniqueness constraints, but keeps everything in memory.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use chanstore_core::{
    Channel, ChannelId, ChannelPatch, OrgId, Subscription, SubscriptionId, VersionId,
    VersionRecord, VersionSummary,
};

use crate::error::{Result, StoreError};
use crate::traits::{Store, WriteResult};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; every
/// trait method runs under a single guard, which is what makes the index
/// read-modify-writes atomic.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Channels indexed by (tenant, id).
    channels: HashMap<(OrgId, ChannelId), Channel>,

    /// Version records indexed by (tenant, id).
    versions: HashMap<(OrgId, VersionId), VersionRecord>,

    /// Uniqueness index: (tenant, channel, name) -> version id.
    version_names: HashMap<(OrgId, ChannelId, String), VersionId>,

    /// Subscriptions.
    subscriptions: HashMap<SubscriptionId, Subscription>,
}

impl MemoryStoreInner {
    fn channel_name_taken(&self, org_id: &OrgId, name: &str, except: Option<&ChannelId>) -> bool {
        self.channels.values().any(|c| {
            c.org_id == *org_id && c.name == name && except.map_or(true, |id| c.id != *id)
        })
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_channel(&self, channel: &Channel) -> Result<WriteResult> {
        let mut inner = self.write()?;

        if inner.channel_name_taken(&channel.org_id, &channel.name, None) {
            return Ok(WriteResult::NameTaken);
        }

        inner
            .channels
            .insert((channel.org_id.clone(), channel.id), channel.clone());
        Ok(WriteResult::Written)
    }

    async fn get_channel(&self, org_id: &OrgId, id: &ChannelId) -> Result<Option<Channel>> {
        let inner = self.read()?;
        Ok(inner.channels.get(&(org_id.clone(), *id)).cloned())
    }

    async fn get_channel_by_name(&self, org_id: &OrgId, name: &str) -> Result<Option<Channel>> {
        let inner = self.read()?;
        Ok(inner
            .channels
            .values()
            .find(|c| c.org_id == *org_id && c.name == name)
            .cloned())
    }

    async fn list_channels(&self, org_id: &OrgId) -> Result<Vec<Channel>> {
        let inner = self.read()?;
        let mut channels: Vec<Channel> = inner
            .channels
            .values()
            .filter(|c| c.org_id == *org_id)
            .cloned()
            .collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(channels)
    }

    async fn update_channel_meta(
        &self,
        org_id: &OrgId,
        id: &ChannelId,
        patch: &ChannelPatch,
        now: i64,
    ) -> Result<WriteResult> {
        let mut inner = self.write()?;

        if let Some(name) = &patch.name {
            if inner.channel_name_taken(org_id, name, Some(id)) {
                return Ok(WriteResult::NameTaken);
            }
        }

        let Some(channel) = inner.channels.get_mut(&(org_id.clone(), *id)) else {
            return Ok(WriteResult::Missing);
        };
        if let Some(name) = &patch.name {
            channel.name = name.clone();
        }
        if let Some(tags) = &patch.tags {
            channel.tags = tags.clone();
        }
        channel.updated_at = now;
        Ok(WriteResult::Written)
    }

    async fn delete_channel(&self, org_id: &OrgId, id: &ChannelId) -> Result<bool> {
        let mut inner = self.write()?;
        Ok(inner.channels.remove(&(org_id.clone(), *id)).is_some())
    }

    async fn append_version_summary(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
        summary: &VersionSummary,
        now: i64,
    ) -> Result<WriteResult> {
        let mut inner = self.write()?;

        let Some(channel) = inner.channels.get_mut(&(org_id.clone(), *channel_id)) else {
            return Ok(WriteResult::Missing);
        };
        if channel.append_summary(summary.clone(), now) {
            Ok(WriteResult::Written)
        } else {
            Ok(WriteResult::NameTaken)
        }
    }

    async fn remove_version_summary(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
        version_id: &VersionId,
        now: i64,
    ) -> Result<Option<VersionSummary>> {
        let mut inner = self.write()?;
        Ok(inner
            .channels
            .get_mut(&(org_id.clone(), *channel_id))
            .and_then(|channel| channel.remove_summary(version_id, now)))
    }

    async fn insert_version(&self, record: &VersionRecord) -> Result<WriteResult> {
        let mut inner = self.write()?;

        let name_key = (record.org_id.clone(), record.channel_id, record.name.clone());
        if inner.version_names.contains_key(&name_key) {
            return Ok(WriteResult::NameTaken);
        }
        if inner
            .versions
            .contains_key(&(record.org_id.clone(), record.id))
        {
            return Err(StoreError::InvalidData(format!(
                "version id {} already in use",
                record.id
            )));
        }

        inner.version_names.insert(name_key, record.id);
        inner
            .versions
            .insert((record.org_id.clone(), record.id), record.clone());
        Ok(WriteResult::Written)
    }

    async fn get_version(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
        version_id: &VersionId,
    ) -> Result<Option<VersionRecord>> {
        let inner = self.read()?;
        Ok(inner
            .versions
            .get(&(org_id.clone(), *version_id))
            .filter(|r| r.channel_id == *channel_id)
            .cloned())
    }

    async fn list_versions(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
    ) -> Result<Vec<VersionRecord>> {
        let inner = self.read()?;
        let mut records: Vec<VersionRecord> = inner
            .versions
            .values()
            .filter(|r| r.org_id == *org_id && r.channel_id == *channel_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn delete_version(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
        version_id: &VersionId,
    ) -> Result<bool> {
        let mut inner = self.write()?;

        let key = (org_id.clone(), *version_id);
        match inner.versions.get(&key) {
            Some(record) if record.channel_id == *channel_id => {}
            _ => return Ok(false),
        }
        if let Some(record) = inner.versions.remove(&key) {
            inner
                .version_names
                .remove(&(record.org_id, record.channel_id, record.name));
        }
        Ok(true)
    }

    async fn delete_versions_for_channel(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
    ) -> Result<usize> {
        let mut inner = self.write()?;

        let doomed: Vec<(OrgId, VersionId)> = inner
            .versions
            .iter()
            .filter(|(_, r)| r.org_id == *org_id && r.channel_id == *channel_id)
            .map(|(k, _)| k.clone())
            .collect();

        for key in &doomed {
            if let Some(record) = inner.versions.remove(key) {
                inner
                    .version_names
                    .remove(&(record.org_id, record.channel_id, record.name));
            }
        }
        Ok(doomed.len())
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<()> {
        let mut inner = self.write()?;
        inner
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn delete_subscription(&self, subscription: &Subscription) -> Result<bool> {
        let mut inner = self.write()?;
        Ok(inner.subscriptions.remove(&subscription.id).is_some())
    }

    async fn count_channel_subscriptions(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
    ) -> Result<usize> {
        let inner = self.read()?;
        Ok(inner
            .subscriptions
            .values()
            .filter(|s| s.org_id == *org_id && s.channel_id == Some(*channel_id))
            .count())
    }

    async fn count_version_subscriptions(
        &self,
        org_id: &OrgId,
        version_id: &VersionId,
    ) -> Result<usize> {
        let inner = self.read()?;
        Ok(inner
            .subscriptions
            .values()
            .filter(|s| s.org_id == *org_id && s.version_id == Some(*version_id))
            .count())
    }
}
