//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use chanstore_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Channels with their embedded version index
        CREATE TABLE channels (
            org_id TEXT NOT NULL,
            channel_id BLOB NOT NULL,         -- 16 bytes
            name TEXT NOT NULL,
            tags BLOB NOT NULL,               -- CBOR array of strings
            versions BLOB NOT NULL,           -- CBOR array of version summaries
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,

            PRIMARY KEY (org_id, channel_id),
            UNIQUE(org_id, name)
        );

        -- Authoritative version records, written once
        CREATE TABLE channel_versions (
            org_id TEXT NOT NULL,
            version_id BLOB NOT NULL,         -- 16 bytes
            channel_id BLOB NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            format TEXT NOT NULL,
            location INTEGER NOT NULL,        -- 0=inline, 1=object-store
            content BLOB,                     -- ciphertext when inline
            locator TEXT,                     -- object locator when object-store
            iv BLOB NOT NULL,                 -- 16 bytes
            created_by TEXT NOT NULL,
            created_at INTEGER NOT NULL,

            PRIMARY KEY (org_id, version_id),
            UNIQUE(org_id, channel_id, name)
        );

        -- Remote agent subscriptions
        CREATE TABLE subscriptions (
            subscription_id BLOB PRIMARY KEY,
            org_id TEXT NOT NULL,
            channel_id BLOB,
            version_id BLOB
        );

        CREATE INDEX idx_versions_channel ON channel_versions(org_id, channel_id, created_at);
        CREATE INDEX idx_subscriptions_channel ON subscriptions(org_id, channel_id);
        CREATE INDEX idx_subscriptions_version ON subscriptions(org_id, version_id);
        "#,
    )?;

    Ok(())
}
