//! # Chanstore
//!
//! Encrypted, versioned manifest storage for multi-tenant channels.
//!
//! Each organization owns named channels; each channel holds an ordered set
//! of immutable manifest versions. Content is encrypted with the tenant's
//! current key and persisted either inline in the version record or in an
//! object store, chosen by configuration when the version is written.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chanstore::{ChannelVersionStore, NewVersion, StoreConfig};
//! use chanstore_access::{Actor, GrantTable, OrgKeyring};
//! use chanstore_core::{ChannelRef, OrgId, VersionRef};
//! use chanstore_store::MemoryStore;
//!
//! async fn example() -> chanstore::Result<()> {
//!     let org = OrgId::new("acme");
//!     let ops = Actor::new("ops", org.clone());
//!
//!     let grants = Arc::new(GrantTable::new());
//!     grants.grant_all(&ops);
//!     let keys = Arc::new(OrgKeyring::new());
//!     keys.add_org(org);
//!
//!     let store = ChannelVersionStore::new(MemoryStore::new(), grants, keys, StoreConfig::default());
//!     store.add_channel(&ops, "payments", vec!["prod".into()]).await?;
//!
//!     let channel = ChannelRef::name("payments");
//!     store
//!         .add_version(&ops, &channel, NewVersion::inline("v1", "yaml", &b"replicas: 3\n"[..]))
//!         .await?;
//!
//!     let v1 = store.get_version(&ops, &channel, &VersionRef::name("v1")).await?;
//!     assert_eq!(&v1.content[..], b"replicas: 3\n");
//!     Ok(())
//! }
//! ```
//!
//! ## Consistency
//!
//! A channel's version index and the version records are separate
//! collections with no transaction spanning both. Creates write the record
//! before the index entry; deletes remove the index entry before the record.
//! A failure in between leaves an orphan record, never a dangling index entry.
//! [`ChannelVersionStore::audit_channel`] reports either.

pub mod backend;
pub mod cascade;
pub mod config;
pub mod error;
pub mod service;

pub use backend::{object_key, BackendError, Backends, InlineBackend, ObjectStoreBackend, StorageBackend};
pub use config::{ConfigError, ObjectStoreConfig, StoreConfig};
pub use error::{ChannelStoreError, Missing, Result};
pub use service::{ChannelVersionStore, IndexAudit, NewVersion, Upload};
