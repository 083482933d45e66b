//! The channel version store: the composing component.
//!
//! Every public operation authorizes first, then validates, then touches
//! state. Channels and version records live in two collections with no
//! transaction spanning them, so the write order matters:
//!
//! - create: upload payload, insert record, then append the summary
//! - delete: remove the summary, delete payload, then delete the record
//!
//! A crash between steps can leave an orphan record (no summary), which
//! [`ChannelVersionStore::audit_channel`] reports. It can never leave a
//! summary pointing at nothing.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::Instrument;

use chanstore_access::{
    AccessRequest, Action, Actor, AuthorizationGateway, InitVector, KeyManager, ResourceType,
    SealedContent,
};
use chanstore_core::{
    check_content_size, check_content_source, check_manifest, check_object_name_collision,
    check_unique_version_name, check_version_quota, now_millis, validate_name, validate_tags,
    Channel, ChannelId, ChannelPatch, ChannelRef, Location, ManifestFormat, ManifestSyntax, OrgId,
    ValidationError, Version, VersionId, VersionRecord, VersionRef, VersionSummary, YamlDocuments,
};
use chanstore_objects::{ObjectLocator, ObjectStore};
use chanstore_store::{Store, WriteResult};

use crate::backend::{BackendError, Backends, PayloadTarget};
use crate::cascade;
use crate::config::StoreConfig;
use crate::error::{ChannelStoreError, Missing, Result};

/// A streamed upload source.
pub type Upload = Box<dyn AsyncRead + Send + Unpin>;

/// Input to [`ChannelVersionStore::add_version`].
///
/// Exactly one of `content` and `upload` must be set.
pub struct NewVersion {
    pub name: String,
    /// Format name, parsed into a [`ManifestFormat`].
    pub format: String,
    pub description: String,
    pub content: Option<Bytes>,
    pub upload: Option<Upload>,
}

impl NewVersion {
    /// A version whose content is already in memory.
    pub fn inline(name: impl Into<String>, format: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            format: format.into(),
            description: String::new(),
            content: Some(content.into()),
            upload: None,
        }
    }

    /// A version whose content is read from a stream.
    pub fn streamed(name: impl Into<String>, format: impl Into<String>, upload: Upload) -> Self {
        Self {
            name: name.into(),
            format: format.into(),
            description: String::new(),
            content: None,
            upload: Some(upload),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl fmt::Debug for NewVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewVersion")
            .field("name", &self.name)
            .field("format", &self.format)
            .field("description", &self.description)
            .field("content", &self.content.as_ref().map(Bytes::len))
            .field("upload", &self.upload.is_some())
            .finish()
    }
}

/// Result of comparing a channel's index against its version records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexAudit {
    /// Records with no summary. Left behind by a crash mid-create.
    pub orphans: Vec<VersionId>,
    /// Summaries with no record, or whose record disagrees on name or
    /// location.
    pub dangling: Vec<VersionId>,
}

impl IndexAudit {
    pub fn is_consistent(&self) -> bool {
        self.orphans.is_empty() && self.dangling.is_empty()
    }
}

/// Encrypted, versioned manifest storage for tenant channels.
pub struct ChannelVersionStore<S: Store> {
    store: Arc<S>,
    authz: Arc<dyn AuthorizationGateway>,
    keys: Arc<dyn KeyManager>,
    manifests: Arc<dyn ManifestSyntax>,
    backends: Backends,
    config: StoreConfig,
}

impl<S: Store> ChannelVersionStore<S> {
    /// Create a store with inline persistence only.
    ///
    /// If `config.object_store` is set, attach a client with
    /// [`with_object_store`](Self::with_object_store) before writing.
    pub fn new(
        store: S,
        authz: Arc<dyn AuthorizationGateway>,
        keys: Arc<dyn KeyManager>,
        config: StoreConfig,
    ) -> Self {
        let backends = Backends::new(None, bucket(&config));
        Self {
            store: Arc::new(store),
            authz,
            keys,
            manifests: Arc::new(YamlDocuments),
            backends,
            config,
        }
    }

    /// Wire an object store client.
    pub fn with_object_store(mut self, client: Arc<dyn ObjectStore>) -> Self {
        self.backends = Backends::new(Some(client), bucket(&self.config));
        self
    }

    /// Replace the manifest syntax checker.
    pub fn with_manifest_syntax(mut self, manifests: Arc<dyn ManifestSyntax>) -> Self {
        self.manifests = manifests;
        self
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Channel Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a channel in the actor's organization.
    pub async fn add_channel(&self, actor: &Actor, name: &str, tags: Vec<String>) -> Result<ChannelId> {
        self.add_channel_inner(actor, name, tags)
            .instrument(tracing::info_span!("add_channel", org = %actor.org_id, channel = name))
            .await
    }

    async fn add_channel_inner(&self, actor: &Actor, name: &str, tags: Vec<String>) -> Result<ChannelId> {
        let request = AccessRequest::new(actor, Action::Create, ResourceType::Channel, "add_channel")
            .resource_name(name);
        self.authorize(&request).await?;

        validate_name(name)?;
        let tags = validate_tags(tags)?;
        let org_id = &actor.org_id;

        if self.store.get_channel_by_name(org_id, name).await?.is_some() {
            return Err(ValidationError::DuplicateChannelName(name.to_string()).into());
        }

        let channel = Channel::new(org_id.clone(), name, tags, now_millis());
        match self.store.insert_channel(&channel).await? {
            WriteResult::Written => {}
            WriteResult::NameTaken | WriteResult::Missing => {
                return Err(ValidationError::DuplicateChannelName(name.to_string()).into())
            }
        }

        tracing::info!(channel_id = %channel.id, "added channel");
        Ok(channel.id)
    }

    pub async fn get_channel(&self, actor: &Actor, channel: &ChannelRef) -> Result<Channel> {
        self.get_channel_inner(actor, channel)
            .instrument(tracing::info_span!("get_channel", org = %actor.org_id, channel = %channel))
            .await
    }

    async fn get_channel_inner(&self, actor: &Actor, channel: &ChannelRef) -> Result<Channel> {
        let request = channel_request(actor, Action::Read, ResourceType::Channel, "get_channel", channel);
        self.authorize(&request).await?;
        self.resolve_channel(&actor.org_id, channel).await
    }

    /// All channels of the actor's organization, ordered by name.
    pub async fn list_channels(&self, actor: &Actor) -> Result<Vec<Channel>> {
        self.list_channels_inner(actor)
            .instrument(tracing::info_span!("list_channels", org = %actor.org_id))
            .await
    }

    async fn list_channels_inner(&self, actor: &Actor) -> Result<Vec<Channel>> {
        let request = AccessRequest::new(actor, Action::Read, ResourceType::Channel, "list_channels");
        self.authorize(&request).await?;
        Ok(self.store.list_channels(&actor.org_id).await?)
    }

    /// Rename and/or retag a channel. The version index is untouched.
    pub async fn update_channel(
        &self,
        actor: &Actor,
        channel: &ChannelRef,
        patch: ChannelPatch,
    ) -> Result<Channel> {
        self.update_channel_inner(actor, channel, patch)
            .instrument(tracing::info_span!("update_channel", org = %actor.org_id, channel = %channel))
            .await
    }

    async fn update_channel_inner(
        &self,
        actor: &Actor,
        channel: &ChannelRef,
        patch: ChannelPatch,
    ) -> Result<Channel> {
        let request = channel_request(actor, Action::Update, ResourceType::Channel, "update_channel", channel);
        self.authorize(&request).await?;

        if let Some(name) = &patch.name {
            validate_name(name)?;
        }
        let patch = ChannelPatch {
            name: patch.name,
            tags: patch.tags.map(validate_tags).transpose()?,
        };

        let org_id = &actor.org_id;
        let current = self.resolve_channel(org_id, channel).await?;
        if patch.is_empty() {
            return Ok(current);
        }

        match self
            .store
            .update_channel_meta(org_id, &current.id, &patch, now_millis())
            .await?
        {
            WriteResult::Written => {}
            WriteResult::NameTaken => {
                let name = patch.name.unwrap_or_default();
                return Err(ValidationError::DuplicateChannelName(name).into());
            }
            WriteResult::Missing => return Err(ChannelStoreError::NotFound(Missing::Channel)),
        }

        tracing::info!(channel_id = %current.id, "updated channel");
        self.store
            .get_channel(org_id, &current.id)
            .await?
            .ok_or(ChannelStoreError::NotFound(Missing::Channel))
    }

    /// Delete a channel and every version in it.
    ///
    /// Refused while any subscription references the channel. Object
    /// payloads are deleted first, at most `delete_concurrency` at a time;
    /// the first failure aborts before any record is removed.
    pub async fn remove_channel(&self, actor: &Actor, channel: &ChannelRef) -> Result<()> {
        self.remove_channel_inner(actor, channel)
            .instrument(tracing::info_span!("remove_channel", org = %actor.org_id, channel = %channel))
            .await
    }

    async fn remove_channel_inner(&self, actor: &Actor, channel: &ChannelRef) -> Result<()> {
        let request = channel_request(actor, Action::Delete, ResourceType::Channel, "remove_channel", channel);
        self.authorize(&request).await?;

        let org_id = &actor.org_id;
        let channel = self.resolve_channel(org_id, channel).await?;

        let subscribers = self.store.count_channel_subscriptions(org_id, &channel.id).await?;
        if subscribers > 0 {
            tracing::warn!(channel_id = %channel.id, subscribers, "channel still has subscribers");
            return Err(ChannelStoreError::Dependency {
                resource: format!("channel {:?}", channel.name),
                count: subscribers,
            });
        }

        let records = self.store.list_versions(org_id, &channel.id).await?;
        let locators = records
            .iter()
            .filter_map(|r| r.content.locator())
            .map(ObjectLocator::parse)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if !locators.is_empty() {
            let client = self
                .backends
                .object_client()
                .ok_or(BackendError::NotConfigured)?;
            let deleted =
                cascade::delete_objects(client, locators, self.config.delete_concurrency).await?;
            tracing::debug!(channel_id = %channel.id, deleted, "deleted version payloads");
        }

        let removed = self.store.delete_versions_for_channel(org_id, &channel.id).await?;
        self.store.delete_channel(org_id, &channel.id).await?;

        tracing::info!(channel_id = %channel.id, versions = removed, "removed channel");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Version Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// The channel's version index, in insertion order.
    pub async fn list_versions(&self, actor: &Actor, channel: &ChannelRef) -> Result<Vec<VersionSummary>> {
        self.list_versions_inner(actor, channel)
            .instrument(tracing::info_span!("list_versions", org = %actor.org_id, channel = %channel))
            .await
    }

    async fn list_versions_inner(&self, actor: &Actor, channel: &ChannelRef) -> Result<Vec<VersionSummary>> {
        let request =
            channel_request(actor, Action::Read, ResourceType::ChannelVersion, "list_versions", channel);
        self.authorize(&request).await?;
        Ok(self.resolve_channel(&actor.org_id, channel).await?.versions)
    }

    /// Validate, encrypt and persist a new version. Returns its id.
    pub async fn add_version(
        &self,
        actor: &Actor,
        channel: &ChannelRef,
        new: NewVersion,
    ) -> Result<VersionId> {
        let span = tracing::info_span!(
            "add_version",
            org = %actor.org_id,
            channel = %channel,
            version = %new.name
        );
        self.add_version_inner(actor, channel, new).instrument(span).await
    }

    async fn add_version_inner(
        &self,
        actor: &Actor,
        channel: &ChannelRef,
        new: NewVersion,
    ) -> Result<VersionId> {
        let request =
            channel_request(actor, Action::ManageVersions, ResourceType::Channel, "add_version", channel);
        self.authorize(&request).await?;

        let NewVersion {
            name,
            format,
            description,
            content,
            upload,
        } = new;
        validate_name(&name)?;
        let format: ManifestFormat = format.parse()?;
        check_content_source(content.as_deref(), upload.is_some())?;

        let org_id = &actor.org_id;
        let limits = self.config.limits();
        let channel = self.resolve_channel(org_id, channel).await?;
        check_unique_version_name(&channel, &name)?;
        if self.backends.write_location() == Location::ObjectStore {
            check_object_name_collision(&channel, &name)?;
        }
        if let Err(e) = check_version_quota(&channel, &limits) {
            tracing::warn!(channel_id = %channel.id, count = channel.version_count(), "version quota reached");
            return Err(e.into());
        }

        let plaintext = self.materialize(content, upload).await?;
        check_content_size(plaintext.len(), &limits)?;
        let documents = check_manifest(self.manifests.as_ref(), &plaintext)?;

        let key = self.keys.current_key(org_id).await?;
        let sealed = SealedContent::seal(&plaintext, &key)?;

        let target = PayloadTarget {
            org_id,
            channel_id: &channel.id,
            name: &name,
        };
        let stored = self.backends.write(&target, sealed.ciphertext).await?;

        let record = VersionRecord {
            id: VersionId::generate(),
            org_id: org_id.clone(),
            channel_id: channel.id,
            name,
            description,
            format,
            content: stored,
            iv: sealed.iv.0,
            created_by: actor.id.clone(),
            created_at: now_millis(),
        };

        match self.store.insert_version(&record).await? {
            WriteResult::Written => {}
            WriteResult::NameTaken => {
                tracing::warn!(
                    location = %record.location(),
                    "lost version name race; payload left for collection"
                );
                return Err(ValidationError::DuplicateVersionName(record.name).into());
            }
            WriteResult::Missing => return Err(ChannelStoreError::NotFound(Missing::Channel)),
        }

        match self
            .store
            .append_version_summary(org_id, &channel.id, &record.summary(), record.created_at)
            .await?
        {
            WriteResult::Written => {}
            WriteResult::NameTaken => {
                tracing::warn!(version_id = %record.id, "index already lists this version name; record orphaned");
                return Err(ValidationError::DuplicateVersionName(record.name).into());
            }
            WriteResult::Missing => {
                tracing::warn!(version_id = %record.id, "channel vanished during add; record orphaned");
                return Err(ChannelStoreError::NotFound(Missing::Channel));
            }
        }

        tracing::info!(
            channel_id = %channel.id,
            version_id = %record.id,
            location = %record.location(),
            documents,
            "added version"
        );
        Ok(record.id)
    }

    /// Fetch and decrypt a version.
    pub async fn get_version(
        &self,
        actor: &Actor,
        channel: &ChannelRef,
        version: &VersionRef,
    ) -> Result<Version> {
        self.get_version_inner(actor, channel, version)
            .instrument(tracing::info_span!(
                "get_version",
                org = %actor.org_id,
                channel = %channel,
                version = %version
            ))
            .await
    }

    async fn get_version_inner(
        &self,
        actor: &Actor,
        channel: &ChannelRef,
        version: &VersionRef,
    ) -> Result<Version> {
        let request = version_request(actor, Action::Read, "get_version", version);
        self.authorize(&request).await?;

        let org_id = &actor.org_id;
        let record = self.resolve_version(org_id, channel, version).await?.1;

        let ciphertext = self.backends.read(&record.content).await?;
        let key = self.keys.current_key(org_id).await?;
        let plaintext = key.decrypt(&ciphertext, &InitVector::from_bytes(record.iv))?;

        Ok(Version::from_record(record, plaintext))
    }

    /// Delete one version.
    ///
    /// Refused while any subscription references it. The index entry goes
    /// first so that a failure part way leaves an orphan record at worst.
    pub async fn remove_version(
        &self,
        actor: &Actor,
        channel: &ChannelRef,
        version: &VersionRef,
    ) -> Result<()> {
        self.remove_version_inner(actor, channel, version)
            .instrument(tracing::info_span!(
                "remove_version",
                org = %actor.org_id,
                channel = %channel,
                version = %version
            ))
            .await
    }

    async fn remove_version_inner(
        &self,
        actor: &Actor,
        channel: &ChannelRef,
        version: &VersionRef,
    ) -> Result<()> {
        let request = channel_request(
            actor,
            Action::ManageVersions,
            ResourceType::Channel,
            "remove_version",
            channel,
        );
        self.authorize(&request).await?;

        let org_id = &actor.org_id;
        let (channel, record) = self.resolve_version(org_id, channel, version).await?;

        let subscribers = self.store.count_version_subscriptions(org_id, &record.id).await?;
        if subscribers > 0 {
            tracing::warn!(version_id = %record.id, subscribers, "version still has subscribers");
            return Err(ChannelStoreError::Dependency {
                resource: format!("version {:?}", record.name),
                count: subscribers,
            });
        }

        self.store
            .remove_version_summary(org_id, &channel.id, &record.id, now_millis())
            .await?;
        self.backends.delete(&record.content).await?;
        self.store.delete_version(org_id, &channel.id, &record.id).await?;

        tracing::info!(channel_id = %channel.id, version_id = %record.id, "removed version");
        Ok(())
    }

    /// Compare the channel's index with its records without changing either.
    pub async fn audit_channel(&self, actor: &Actor, channel: &ChannelRef) -> Result<IndexAudit> {
        self.audit_channel_inner(actor, channel)
            .instrument(tracing::info_span!("audit_channel", org = %actor.org_id, channel = %channel))
            .await
    }

    async fn audit_channel_inner(&self, actor: &Actor, channel: &ChannelRef) -> Result<IndexAudit> {
        let request = channel_request(actor, Action::Read, ResourceType::Channel, "audit_channel", channel);
        self.authorize(&request).await?;

        let org_id = &actor.org_id;
        let channel = self.resolve_channel(org_id, channel).await?;
        let records = self.store.list_versions(org_id, &channel.id).await?;

        let indexed: HashSet<VersionId> = channel.versions.iter().map(|s| s.id).collect();
        let orphans = records
            .iter()
            .filter(|r| !indexed.contains(&r.id))
            .map(|r| r.id)
            .collect();
        let dangling = channel
            .versions
            .iter()
            .filter(|s| !records.iter().any(|r| r.matches_summary(s)))
            .map(|s| s.id)
            .collect();

        let audit = IndexAudit { orphans, dangling };
        if !audit.is_consistent() {
            tracing::warn!(
                channel_id = %channel.id,
                orphans = audit.orphans.len(),
                dangling = audit.dangling.len(),
                "channel index disagrees with version records"
            );
        }
        Ok(audit)
    }

    /// Delete version records the channel's index does not list, with their
    /// payloads. Returns how many were removed.
    ///
    /// Records younger than `grace` are kept, since a concurrent add may not
    /// have indexed them yet. Orphans still referenced by a subscription are
    /// kept as well.
    pub async fn purge_orphans(
        &self,
        actor: &Actor,
        channel: &ChannelRef,
        grace: Duration,
    ) -> Result<usize> {
        self.purge_orphans_inner(actor, channel, grace)
            .instrument(tracing::info_span!("purge_orphans", org = %actor.org_id, channel = %channel))
            .await
    }

    async fn purge_orphans_inner(
        &self,
        actor: &Actor,
        channel: &ChannelRef,
        grace: Duration,
    ) -> Result<usize> {
        let request =
            channel_request(actor, Action::ManageVersions, ResourceType::Channel, "purge_orphans", channel);
        self.authorize(&request).await?;

        let org_id = &actor.org_id;
        let channel = self.resolve_channel(org_id, channel).await?;
        let records = self.store.list_versions(org_id, &channel.id).await?;

        let cutoff = now_millis().saturating_sub(i64::try_from(grace.as_millis()).unwrap_or(i64::MAX));
        let mut purged = 0;
        for record in records {
            if channel.find_version(&VersionRef::Id(record.id)).is_some() || record.created_at > cutoff {
                continue;
            }
            if self.store.count_version_subscriptions(org_id, &record.id).await? > 0 {
                tracing::warn!(version_id = %record.id, "orphan record still has subscribers; kept");
                continue;
            }

            self.backends.delete(&record.content).await?;
            self.store.delete_version(org_id, &channel.id, &record.id).await?;
            tracing::debug!(version_id = %record.id, name = %record.name, "purged orphan record");
            purged += 1;
        }

        if purged > 0 {
            tracing::info!(channel_id = %channel.id, purged, "purged orphan records");
        }
        Ok(purged)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    async fn authorize(&self, request: &AccessRequest<'_>) -> Result<()> {
        Ok(self.authz.check(request).await?)
    }

    async fn resolve_channel(&self, org_id: &OrgId, channel: &ChannelRef) -> Result<Channel> {
        let found = match channel {
            ChannelRef::Id(id) => self.store.get_channel(org_id, id).await?,
            ChannelRef::Name(name) => self.store.get_channel_by_name(org_id, name).await?,
        };
        found.ok_or(ChannelStoreError::NotFound(Missing::Channel))
    }

    /// Resolve channel, then summary, then record, reporting the first
    /// missing layer.
    async fn resolve_version(
        &self,
        org_id: &OrgId,
        channel: &ChannelRef,
        version: &VersionRef,
    ) -> Result<(Channel, VersionRecord)> {
        let channel = self.resolve_channel(org_id, channel).await?;
        let version_id = channel
            .find_version(version)
            .map(|s| s.id)
            .ok_or(ChannelStoreError::NotFound(Missing::VersionSummary))?;
        let record = self
            .store
            .get_version(org_id, &channel.id, &version_id)
            .await?
            .ok_or(ChannelStoreError::NotFound(Missing::VersionRecord))?;
        Ok((channel, record))
    }

    /// Collect the content into one buffer. Uploads are read with a hard cap
    /// of one byte past the limit so oversized streams are detected without
    /// being buffered whole.
    async fn materialize(&self, content: Option<Bytes>, upload: Option<Upload>) -> Result<Bytes> {
        match (content, upload) {
            (Some(bytes), _) => Ok(bytes),
            (None, Some(upload)) => {
                let cap = self.config.max_content_bytes as u64 + 1;
                let mut buf = Vec::new();
                upload
                    .take(cap)
                    .read_to_end(&mut buf)
                    .await
                    .map_err(ChannelStoreError::internal)?;
                Ok(Bytes::from(buf))
            }
            (None, None) => Err(ValidationError::MissingContent.into()),
        }
    }
}

fn bucket(config: &StoreConfig) -> Option<String> {
    config.object_store.as_ref().map(|os| os.bucket.clone())
}

fn channel_request<'a>(
    actor: &'a Actor,
    action: Action,
    resource_type: ResourceType,
    context: &'a str,
    channel: &ChannelRef,
) -> AccessRequest<'a> {
    let request = AccessRequest::new(actor, action, resource_type, context);
    match channel {
        ChannelRef::Id(id) => request.resource_id(id.to_hex()),
        ChannelRef::Name(name) => request.resource_name(name.as_str()),
    }
}

fn version_request<'a>(
    actor: &'a Actor,
    action: Action,
    context: &'a str,
    version: &VersionRef,
) -> AccessRequest<'a> {
    let request = AccessRequest::new(actor, action, ResourceType::ChannelVersion, context);
    match version {
        VersionRef::Id(id) => request.resource_id(id.to_hex()),
        VersionRef::Name(name) => request.resource_name(name.as_str()),
    }
}
