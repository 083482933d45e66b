//! Store trait: the abstract interface for channel and version persistence.
//!
//! This trait allows the facade to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use chanstore_core::{
    Channel, ChannelId, ChannelPatch, OrgId, Subscription, VersionId, VersionRecord,
    VersionSummary,
};

use crate::error::Result;

/// Result of a write subject to a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    /// The write was applied.
    Written,
    /// A uniqueness constraint on the name rejected the write.
    NameTaken,
    /// The document the write targets does not exist.
    Missing,
}

/// The Store trait: async interface for channel and version persistence.
///
/// Every method is individually atomic. Nothing here spans the channel and
/// version collections in one transaction; ordering across them is the
/// caller's job.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Channel Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a new channel. `NameTaken` if the tenant already has one with
    /// that name.
    async fn insert_channel(&self, channel: &Channel) -> Result<WriteResult>;

    /// Get a channel by id.
    async fn get_channel(&self, org_id: &OrgId, id: &ChannelId) -> Result<Option<Channel>>;

    /// Get a channel by its unique name.
    async fn get_channel_by_name(&self, org_id: &OrgId, name: &str) -> Result<Option<Channel>>;

    /// List a tenant's channels, ordered by name.
    async fn list_channels(&self, org_id: &OrgId) -> Result<Vec<Channel>>;

    /// Apply a rename and/or retag. Never touches the version index.
    async fn update_channel_meta(
        &self,
        org_id: &OrgId,
        id: &ChannelId,
        patch: &ChannelPatch,
        now: i64,
    ) -> Result<WriteResult>;

    /// Delete a channel document. Returns whether it existed.
    async fn delete_channel(&self, org_id: &OrgId, id: &ChannelId) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Version Index Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a summary to a channel's index as one atomic read-modify-write.
    ///
    /// `NameTaken` if an entry with the same id or name is already indexed.
    async fn append_version_summary(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
        summary: &VersionSummary,
        now: i64,
    ) -> Result<WriteResult>;

    /// Remove a summary from a channel's index, keeping the order of the
    /// rest. Returns the removed entry.
    async fn remove_version_summary(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
        version_id: &VersionId,
        now: i64,
    ) -> Result<Option<VersionSummary>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Version Record Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a version record. `NameTaken` if the channel already has a
    /// record with that name.
    async fn insert_version(&self, record: &VersionRecord) -> Result<WriteResult>;

    /// Get a version record by (tenant, channel, version id).
    async fn get_version(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
        version_id: &VersionId,
    ) -> Result<Option<VersionRecord>>;

    /// All records of a channel, oldest first.
    async fn list_versions(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
    ) -> Result<Vec<VersionRecord>>;

    /// Delete one record. Returns whether it existed.
    async fn delete_version(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
        version_id: &VersionId,
    ) -> Result<bool>;

    /// Delete every record of a channel. Returns how many were removed.
    async fn delete_versions_for_channel(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
    ) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────────
    // Subscription Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a subscription.
    async fn insert_subscription(&self, subscription: &Subscription) -> Result<()>;

    /// Delete a subscription. Returns whether it existed.
    async fn delete_subscription(&self, subscription: &Subscription) -> Result<bool>;

    /// Number of subscriptions referencing a channel.
    async fn count_channel_subscriptions(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
    ) -> Result<usize>;

    /// Number of subscriptions referencing a version.
    async fn count_version_subscriptions(
        &self,
        org_id: &OrgId,
        version_id: &VersionId,
    ) -> Result<usize>;
}
