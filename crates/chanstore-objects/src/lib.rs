//! # Chanstore Objects
//!
//! A minimal object store client: buckets holding opaque byte objects,
//! addressed by an [`ObjectLocator`] of the form `objects://{bucket}/{key}`.
//!
//! ## Key Types
//!
//! - [`ObjectStore`] - Async client trait (`ensure_bucket`, `put`, `get`, `delete`)
//! - [`MemoryObjectStore`] - In-memory implementation for tests and embedding
//! - [`FsObjectStore`] - Buckets as directories under a root path
//!
//! Deleting an object that does not exist succeeds, so cascades can be
//! re-run after a partial failure.

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::{ObjectStoreError, Result};
pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use traits::{validate_bucket, validate_key, ObjectLocator, ObjectStore, LOCATOR_SCHEME};
