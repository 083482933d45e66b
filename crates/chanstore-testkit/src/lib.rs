//! # Chanstore Testkit
//!
//! Testing utilities for the channel version store.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: an organization with a key, an all-powerful actor and a
//!   shared object store, wired into a ready store
//! - **Instrumented object stores**: record delete concurrency, inject delays
//!   and failures
//! - **Generators**: Proptest strategies for names, tags and manifests
//!
//! ## Test Fixtures
//!
//! ```rust
//! use chanstore::StoreConfig;
//! use chanstore_testkit::fixtures::{manifest, TestFixture};
//!
//! let fixture = TestFixture::new();
//! let store = fixture.memory_store(StoreConfig::default());
//! assert_eq!(manifest(10).len(), 10);
//! # drop(store);
//! ```

pub mod fixtures;
pub mod generators;
pub mod objects;

pub use fixtures::{manifest, TestFixture};
pub use generators::{manifest_documents, tags, version_name};
pub use objects::InstrumentedObjectStore;
