//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

use chanstore_core::{
    Channel, ChannelId, ChannelPatch, ManifestFormat, OrgId, StoredContent, Subscription,
    VersionId, VersionRecord, VersionSummary, IV_LEN, Location,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{Store, WriteResult};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Blocking(e.to_string()))?
    }
}

fn encode_cbor<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn id_bytes(bytes: Vec<u8>, column: &str) -> Result<[u8; 16]> {
    bytes
        .try_into()
        .map_err(|_| StoreError::InvalidData(format!("{} is not 16 bytes", column)))
}

// Raw channel row, decoded outside the rusqlite row callback so CBOR errors
// surface as StoreError.
struct ChannelRow {
    org_id: String,
    channel_id: Vec<u8>,
    name: String,
    tags: Vec<u8>,
    versions: Vec<u8>,
    created_at: i64,
    updated_at: i64,
}

const CHANNEL_COLUMNS: &str =
    "org_id, channel_id, name, tags, versions, created_at, updated_at";

fn read_channel_row(row: &Row<'_>) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        org_id: row.get("org_id")?,
        channel_id: row.get("channel_id")?,
        name: row.get("name")?,
        tags: row.get("tags")?,
        versions: row.get("versions")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl ChannelRow {
    fn into_channel(self) -> Result<Channel> {
        Ok(Channel {
            id: ChannelId::from_bytes(id_bytes(self.channel_id, "channel_id")?),
            org_id: OrgId::new(self.org_id),
            name: self.name,
            tags: decode_cbor(&self.tags)?,
            versions: decode_cbor(&self.versions)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct VersionRow {
    org_id: String,
    version_id: Vec<u8>,
    channel_id: Vec<u8>,
    name: String,
    description: String,
    format: String,
    location: u8,
    content: Option<Vec<u8>>,
    locator: Option<String>,
    iv: Vec<u8>,
    created_by: String,
    created_at: i64,
}

const VERSION_COLUMNS: &str = "org_id, version_id, channel_id, name, description, format, \
     location, content, locator, iv, created_by, created_at";

fn read_version_row(row: &Row<'_>) -> rusqlite::Result<VersionRow> {
    Ok(VersionRow {
        org_id: row.get("org_id")?,
        version_id: row.get("version_id")?,
        channel_id: row.get("channel_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        format: row.get("format")?,
        location: row.get("location")?,
        content: row.get("content")?,
        locator: row.get("locator")?,
        iv: row.get("iv")?,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
    })
}

impl VersionRow {
    fn into_record(self) -> Result<VersionRecord> {
        let location = Location::from_u8(self.location)
            .ok_or_else(|| StoreError::InvalidData(format!("location {}", self.location)))?;
        let content = match (location, self.content, self.locator) {
            (Location::Inline, Some(bytes), _) => StoredContent::Inline(bytes),
            (Location::ObjectStore, _, Some(locator)) => StoredContent::ObjectStore(locator),
            (location, _, _) => {
                return Err(StoreError::InvalidData(format!(
                    "{} version without content",
                    location
                )))
            }
        };
        let format: ManifestFormat = self
            .format
            .parse()
            .map_err(|_| StoreError::InvalidData(format!("format {:?}", self.format)))?;
        let iv: [u8; IV_LEN] = self
            .iv
            .try_into()
            .map_err(|_| StoreError::InvalidData("iv has wrong length".into()))?;

        Ok(VersionRecord {
            id: VersionId::from_bytes(id_bytes(self.version_id, "version_id")?),
            org_id: OrgId::new(self.org_id),
            channel_id: ChannelId::from_bytes(id_bytes(self.channel_id, "channel_id")?),
            name: self.name,
            description: self.description,
            format,
            content,
            iv,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

fn load_channel(conn: &Connection, org_id: &str, id: &ChannelId) -> Result<Option<Channel>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM channels WHERE org_id = ?1 AND channel_id = ?2",
            CHANNEL_COLUMNS
        ),
        params![org_id, id.as_bytes().as_slice()],
        read_channel_row,
    )
    .optional()?
    .map(ChannelRow::into_channel)
    .transpose()
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_channel(&self, channel: &Channel) -> Result<WriteResult> {
        let channel = channel.clone();
        self.blocking(move |conn| {
            let tags = encode_cbor(&channel.tags)?;
            let versions = encode_cbor(&channel.versions)?;
            let inserted = conn.execute(
                "INSERT INTO channels (org_id, channel_id, name, tags, versions, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    channel.org_id.as_str(),
                    channel.id.as_bytes().as_slice(),
                    channel.name,
                    tags,
                    versions,
                    channel.created_at,
                    channel.updated_at,
                ],
            );
            match inserted {
                Ok(_) => Ok(WriteResult::Written),
                Err(e) if is_unique_violation(&e) => Ok(WriteResult::NameTaken),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get_channel(&self, org_id: &OrgId, id: &ChannelId) -> Result<Option<Channel>> {
        let org_id = org_id.clone();
        let id = *id;
        self.blocking(move |conn| load_channel(conn, org_id.as_str(), &id))
            .await
    }

    async fn get_channel_by_name(&self, org_id: &OrgId, name: &str) -> Result<Option<Channel>> {
        let org_id = org_id.clone();
        let name = name.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM channels WHERE org_id = ?1 AND name = ?2",
                    CHANNEL_COLUMNS
                ),
                params![org_id.as_str(), name],
                read_channel_row,
            )
            .optional()?
            .map(ChannelRow::into_channel)
            .transpose()
        })
        .await
    }

    async fn list_channels(&self, org_id: &OrgId) -> Result<Vec<Channel>> {
        let org_id = org_id.clone();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM channels WHERE org_id = ?1 ORDER BY name",
                CHANNEL_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![org_id.as_str()], read_channel_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(ChannelRow::into_channel).collect()
        })
        .await
    }

    async fn update_channel_meta(
        &self,
        org_id: &OrgId,
        id: &ChannelId,
        patch: &ChannelPatch,
        now: i64,
    ) -> Result<WriteResult> {
        let org_id = org_id.clone();
        let id = *id;
        let patch = patch.clone();
        self.blocking(move |conn| {
            let tags = patch.tags.as_ref().map(|t| encode_cbor(t)).transpose()?;
            let updated = conn.execute(
                "UPDATE channels
                 SET name = COALESCE(?3, name), tags = COALESCE(?4, tags), updated_at = ?5
                 WHERE org_id = ?1 AND channel_id = ?2",
                params![
                    org_id.as_str(),
                    id.as_bytes().as_slice(),
                    patch.name,
                    tags,
                    now,
                ],
            );
            match updated {
                Ok(0) => Ok(WriteResult::Missing),
                Ok(_) => Ok(WriteResult::Written),
                Err(e) if is_unique_violation(&e) => Ok(WriteResult::NameTaken),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn delete_channel(&self, org_id: &OrgId, id: &ChannelId) -> Result<bool> {
        let org_id = org_id.clone();
        let id = *id;
        self.blocking(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM channels WHERE org_id = ?1 AND channel_id = ?2",
                params![org_id.as_str(), id.as_bytes().as_slice()],
            )?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn append_version_summary(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
        summary: &VersionSummary,
        now: i64,
    ) -> Result<WriteResult> {
        let org_id = org_id.clone();
        let channel_id = *channel_id;
        let summary = summary.clone();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let Some(mut channel) = load_channel(&tx, org_id.as_str(), &channel_id)? else {
                return Ok(WriteResult::Missing);
            };
            if !channel.append_summary(summary, now) {
                return Ok(WriteResult::NameTaken);
            }
            tx.execute(
                "UPDATE channels SET versions = ?3, updated_at = ?4
                 WHERE org_id = ?1 AND channel_id = ?2",
                params![
                    org_id.as_str(),
                    channel_id.as_bytes().as_slice(),
                    encode_cbor(&channel.versions)?,
                    channel.updated_at,
                ],
            )?;
            tx.commit()?;
            Ok(WriteResult::Written)
        })
        .await
    }

    async fn remove_version_summary(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
        version_id: &VersionId,
        now: i64,
    ) -> Result<Option<VersionSummary>> {
        let org_id = org_id.clone();
        let channel_id = *channel_id;
        let version_id = *version_id;
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let Some(mut channel) = load_channel(&tx, org_id.as_str(), &channel_id)? else {
                return Ok(None);
            };
            let Some(removed) = channel.remove_summary(&version_id, now) else {
                return Ok(None);
            };
            tx.execute(
                "UPDATE channels SET versions = ?3, updated_at = ?4
                 WHERE org_id = ?1 AND channel_id = ?2",
                params![
                    org_id.as_str(),
                    channel_id.as_bytes().as_slice(),
                    encode_cbor(&channel.versions)?,
                    channel.updated_at,
                ],
            )?;
            tx.commit()?;
            Ok(Some(removed))
        })
        .await
    }

    async fn insert_version(&self, record: &VersionRecord) -> Result<WriteResult> {
        let record = record.clone();
        self.blocking(move |conn| {
            // Name collisions are reported as NameTaken; an id collision is a
            // primary key violation and means something is badly wrong.
            let name_taken: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM channel_versions
                 WHERE org_id = ?1 AND channel_id = ?2 AND name = ?3)",
                params![
                    record.org_id.as_str(),
                    record.channel_id.as_bytes().as_slice(),
                    record.name,
                ],
                |row| row.get(0),
            )?;
            if name_taken {
                return Ok(WriteResult::NameTaken);
            }

            let (content, locator) = match &record.content {
                StoredContent::Inline(bytes) => (Some(bytes.as_slice()), None),
                StoredContent::ObjectStore(locator) => (None, Some(locator.as_str())),
            };
            let inserted = conn.execute(
                "INSERT INTO channel_versions (
                    org_id, version_id, channel_id, name, description, format,
                    location, content, locator, iv, created_by, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    record.org_id.as_str(),
                    record.id.as_bytes().as_slice(),
                    record.channel_id.as_bytes().as_slice(),
                    record.name,
                    record.description,
                    record.format.as_str(),
                    record.location().to_u8(),
                    content,
                    locator,
                    record.iv.as_slice(),
                    record.created_by,
                    record.created_at,
                ],
            );
            match inserted {
                Ok(_) => Ok(WriteResult::Written),
                Err(e) if is_unique_violation(&e) => {
                    // Lost a race on the name between the check and the insert.
                    let exists: bool = conn.query_row(
                        "SELECT EXISTS(SELECT 1 FROM channel_versions
                         WHERE org_id = ?1 AND version_id = ?2)",
                        params![record.org_id.as_str(), record.id.as_bytes().as_slice()],
                        |row| row.get(0),
                    )?;
                    if exists {
                        Err(StoreError::InvalidData(format!(
                            "version id {} already in use",
                            record.id
                        )))
                    } else {
                        Ok(WriteResult::NameTaken)
                    }
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get_version(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
        version_id: &VersionId,
    ) -> Result<Option<VersionRecord>> {
        let org_id = org_id.clone();
        let channel_id = *channel_id;
        let version_id = *version_id;
        self.blocking(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM channel_versions
                     WHERE org_id = ?1 AND channel_id = ?2 AND version_id = ?3",
                    VERSION_COLUMNS
                ),
                params![
                    org_id.as_str(),
                    channel_id.as_bytes().as_slice(),
                    version_id.as_bytes().as_slice(),
                ],
                read_version_row,
            )
            .optional()?
            .map(VersionRow::into_record)
            .transpose()
        })
        .await
    }

    async fn list_versions(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
    ) -> Result<Vec<VersionRecord>> {
        let org_id = org_id.clone();
        let channel_id = *channel_id;
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM channel_versions
                 WHERE org_id = ?1 AND channel_id = ?2
                 ORDER BY created_at, rowid",
                VERSION_COLUMNS
            ))?;
            let rows = stmt
                .query_map(
                    params![org_id.as_str(), channel_id.as_bytes().as_slice()],
                    read_version_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(VersionRow::into_record).collect()
        })
        .await
    }

    async fn delete_version(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
        version_id: &VersionId,
    ) -> Result<bool> {
        let org_id = org_id.clone();
        let channel_id = *channel_id;
        let version_id = *version_id;
        self.blocking(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM channel_versions
                 WHERE org_id = ?1 AND channel_id = ?2 AND version_id = ?3",
                params![
                    org_id.as_str(),
                    channel_id.as_bytes().as_slice(),
                    version_id.as_bytes().as_slice(),
                ],
            )?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn delete_versions_for_channel(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
    ) -> Result<usize> {
        let org_id = org_id.clone();
        let channel_id = *channel_id;
        self.blocking(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM channel_versions WHERE org_id = ?1 AND channel_id = ?2",
                params![org_id.as_str(), channel_id.as_bytes().as_slice()],
            )?;
            Ok(deleted)
        })
        .await
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<()> {
        let subscription = subscription.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO subscriptions (subscription_id, org_id, channel_id, version_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    subscription.id.as_bytes().as_slice(),
                    subscription.org_id.as_str(),
                    subscription.channel_id.map(|id| id.0.to_vec()),
                    subscription.version_id.map(|id| id.0.to_vec()),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_subscription(&self, subscription: &Subscription) -> Result<bool> {
        let id = subscription.id;
        self.blocking(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM subscriptions WHERE subscription_id = ?1",
                params![id.as_bytes().as_slice()],
            )?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn count_channel_subscriptions(
        &self,
        org_id: &OrgId,
        channel_id: &ChannelId,
    ) -> Result<usize> {
        let org_id = org_id.clone();
        let channel_id = *channel_id;
        self.blocking(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM subscriptions WHERE org_id = ?1 AND channel_id = ?2",
                params![org_id.as_str(), channel_id.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    async fn count_version_subscriptions(
        &self,
        org_id: &OrgId,
        version_id: &VersionId,
    ) -> Result<usize> {
        let org_id = org_id.clone();
        let version_id = *version_id;
        self.blocking(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM subscriptions WHERE org_id = ?1 AND version_id = ?2",
                params![org_id.as_str(), version_id.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }
}
