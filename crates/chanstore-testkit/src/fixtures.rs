//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use bytes::Bytes;

use chanstore::{ChannelVersionStore, StoreConfig};
use chanstore_access::{Actor, GrantTable, OrgKeyring};
use chanstore_core::{OrgId, Subscription};
use chanstore_objects::{MemoryObjectStore, ObjectStore};
use chanstore_store::{MemoryStore, SqliteStore, Store};

/// An organization with a current key, an actor granted everything, and a
/// shared in-memory object store.
pub struct TestFixture {
    pub org: OrgId,
    pub admin: Actor,
    pub grants: Arc<GrantTable>,
    pub keys: Arc<OrgKeyring>,
    pub objects: Arc<MemoryObjectStore>,
}

impl TestFixture {
    /// Fixture for organization "acme".
    pub fn new() -> Self {
        Self::for_org("acme")
    }

    pub fn for_org(org: &str) -> Self {
        let org = OrgId::new(org);
        let admin = Actor::new("admin", org.clone());
        let grants = Arc::new(GrantTable::new());
        grants.grant_all(&admin);
        let keys = Arc::new(OrgKeyring::new());
        keys.add_org(org.clone());

        Self {
            org,
            admin,
            grants,
            keys,
            objects: Arc::new(MemoryObjectStore::new()),
        }
    }

    /// Another actor in the same organization, with no grants.
    pub fn actor(&self, id: &str) -> Actor {
        Actor::new(id, self.org.clone())
    }

    /// A store over `store` using the fixture's object store.
    pub fn build<S: Store>(&self, store: S, config: StoreConfig) -> ChannelVersionStore<S> {
        self.build_with_objects(store, config, self.objects.clone())
    }

    /// A store over `store` using a caller-supplied object store.
    pub fn build_with_objects<S: Store>(
        &self,
        store: S,
        config: StoreConfig,
        objects: Arc<dyn ObjectStore>,
    ) -> ChannelVersionStore<S> {
        ChannelVersionStore::new(store, self.grants.clone(), self.keys.clone(), config)
            .with_object_store(objects)
    }

    pub fn memory_store(&self, config: StoreConfig) -> ChannelVersionStore<MemoryStore> {
        self.build(MemoryStore::new(), config)
    }

    pub fn sqlite_store(&self, config: StoreConfig) -> ChannelVersionStore<SqliteStore> {
        let store = SqliteStore::open_memory().expect("open in-memory sqlite");
        self.build(store, config)
    }

    /// A subscription to a channel in the fixture's organization.
    pub fn channel_subscription(&self, channel_id: chanstore_core::ChannelId) -> Subscription {
        Subscription::to_channel(self.org.clone(), channel_id)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A valid single-document JSON manifest of exactly `len` bytes.
///
/// Panics if `len` is below 8, the size of `{"k":""}`.
pub fn manifest(len: usize) -> Bytes {
    assert!(len >= 8, "manifest needs at least 8 bytes");
    let mut doc = String::with_capacity(len);
    doc.push_str("{\"k\":\"");
    doc.extend(std::iter::repeat('x').take(len - 8));
    doc.push_str("\"}");
    Bytes::from(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanstore_core::{ManifestSyntax, YamlDocuments};

    #[test]
    fn test_manifest_exact_length() {
        assert_eq!(&manifest(10)[..], br#"{"k":"xx"}"#);
        for len in [8, 9, 100, 4096] {
            let doc = manifest(len);
            assert_eq!(doc.len(), len);
            assert_eq!(YamlDocuments.parse_all(&doc).unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn test_fixture_store_is_usable() {
        let fixture = TestFixture::new();
        let store = fixture.memory_store(StoreConfig::default());
        store.add_channel(&fixture.admin, "payments", vec![]).await.unwrap();
        assert_eq!(store.list_channels(&fixture.admin).await.unwrap().len(), 1);
    }

    #[test]
    fn test_fixtures_for_different_orgs_are_isolated() {
        let a = TestFixture::for_org("acme");
        let b = TestFixture::for_org("globex");
        assert_ne!(a.admin, b.admin);
        assert!(b.keys.keys(&a.org).is_empty());
    }
}
