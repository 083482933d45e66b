//! # Chanstore Store
//!
//! Persistence for channels, version records and subscriptions. Provides a
//! trait-based interface with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The [`Store`] trait keeps the two owned collections separate: channels
//! (each carrying its version index) and version records. The facade keeps
//! them consistent by ordering its writes; the store only guarantees that
//! each single call is atomic.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all persistence operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests and embedding
//! - [`WriteResult`] - Outcome of a write subject to a uniqueness constraint
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chanstore_core::{Channel, OrgId, now_millis};
//! use chanstore_store::{SqliteStore, Store, WriteResult};
//!
//! async fn example() {
//!     let store = SqliteStore::open("channels.db").unwrap();
//!
//!     let channel = Channel::new(OrgId::new("acme"), "payments", vec![], now_millis());
//!     let result = store.insert_channel(&channel).await.unwrap();
//!     assert_eq!(result, WriteResult::Written);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Uniqueness at the persistence layer**: channel names per tenant and
//!   version names per channel are enforced here, catching races that slip
//!   past the facade's pre-checks.
//! - **Atomic index updates**: appending or removing a version summary is a
//!   read-modify-write performed inside one lock scope or SQL transaction.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{Store, WriteResult};
