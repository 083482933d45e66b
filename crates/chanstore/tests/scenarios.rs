//! End-to-end scenarios for the channel version store.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use proptest::prelude::*;

use chanstore::{ChannelStoreError, ChannelVersionStore, Missing, NewVersion, StoreConfig, Upload};
use chanstore_core::{
    ChannelId, ChannelRef, Location, ManifestFormat, StoredContent, Subscription, ValidationError,
    VersionRef,
};
use chanstore_store::{MemoryStore, SqliteStore, Store};
use chanstore_testkit::{manifest, manifest_documents, InstrumentedObjectStore, TestFixture};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn payments() -> ChannelRef {
    ChannelRef::name("payments")
}

fn v(name: &str) -> VersionRef {
    VersionRef::name(name)
}

async fn add(store: &ChannelVersionStore<impl Store>, fx: &TestFixture, name: &str, content: Bytes) {
    store
        .add_version(&fx.admin, &payments(), NewVersion::inline(name, "json", content))
        .await
        .unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

async fn payments_lifecycle<S: Store>(fx: &TestFixture, store: ChannelVersionStore<S>) {
    let ch_id = store.add_channel(&fx.admin, "payments", vec![]).await.unwrap();

    let id = store
        .add_version(&fx.admin, &payments(), NewVersion::inline("v1", "json", manifest(10)))
        .await
        .unwrap();
    assert_eq!(store.list_versions(&fx.admin, &payments()).await.unwrap().len(), 1);

    let err = store
        .add_version(&fx.admin, &payments(), NewVersion::inline("v1", "json", manifest(10)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ChannelStoreError::Validation(ValidationError::DuplicateVersionName(ref n)) if n == "v1"
    ));

    store.remove_version(&fx.admin, &payments(), &v("v1")).await.unwrap();
    assert!(store.list_versions(&fx.admin, &payments()).await.unwrap().is_empty());
    assert!(store
        .store()
        .get_version(&fx.org, &ch_id, &id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_payments_lifecycle_memory() {
    init_tracing();
    let fx = TestFixture::new();
    payments_lifecycle(&fx, fx.memory_store(StoreConfig::default())).await;
}

#[tokio::test]
async fn test_payments_lifecycle_sqlite() {
    let fx = TestFixture::new();
    payments_lifecycle(&fx, fx.sqlite_store(StoreConfig::default())).await;
}

#[tokio::test]
async fn test_payments_lifecycle_object_store() {
    let fx = TestFixture::new();
    let store = fx.memory_store(StoreConfig::default().with_object_store("manifests"));
    payments_lifecycle(&fx, store).await;
    assert_eq!(fx.objects.object_count().await, 0);
}

#[tokio::test]
async fn test_add_then_remove_keeps_index_in_step() {
    let fx = TestFixture::new();
    let store = fx.memory_store(StoreConfig::default());
    let ch_id = store.add_channel(&fx.admin, "payments", vec![]).await.unwrap();

    for name in ["v1", "v2", "v3", "v4"] {
        add(&store, &fx, name, manifest(12)).await;

        let channel = store.get_channel(&fx.admin, &payments()).await.unwrap();
        let summary = channel.versions.last().unwrap();
        assert_eq!(summary.name, name);
        let record = store
            .store()
            .get_version(&fx.org, &ch_id, &summary.id)
            .await
            .unwrap()
            .unwrap();
        assert!(record.matches_summary(summary));
    }

    store.remove_version(&fx.admin, &payments(), &v("v2")).await.unwrap();

    let names: Vec<String> = store
        .list_versions(&fx.admin, &payments())
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["v1", "v3", "v4"]);
    assert_eq!(store.store().list_versions(&fx.org, &ch_id).await.unwrap().len(), 3);
    assert!(store.audit_channel(&fx.admin, &payments()).await.unwrap().is_consistent());
}

// ─────────────────────────────────────────────────────────────────────────────
// Limits
// ─────────────────────────────────────────────────────────────────────────────

fn small_limits() -> StoreConfig {
    StoreConfig {
        max_versions_per_channel: 3,
        max_content_bytes: 64,
        ..StoreConfig::default()
    }
}

#[tokio::test]
async fn test_content_size_boundary_inline() {
    let fx = TestFixture::new();
    let store = fx.memory_store(small_limits());
    store.add_channel(&fx.admin, "payments", vec![]).await.unwrap();

    add(&store, &fx, "exact", manifest(64)).await;

    let err = store
        .add_version(&fx.admin, &payments(), NewVersion::inline("over", "json", manifest(65)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ChannelStoreError::Validation(ValidationError::ContentTooLarge { limit: 64 })
    ));
}

#[tokio::test]
async fn test_content_size_boundary_streamed() {
    let fx = TestFixture::new();
    let store = fx.memory_store(small_limits());
    store.add_channel(&fx.admin, "payments", vec![]).await.unwrap();

    let exact: Upload = Box::new(std::io::Cursor::new(manifest(64)));
    store
        .add_version(&fx.admin, &payments(), NewVersion::streamed("exact", "json", exact))
        .await
        .unwrap();
    let fetched = store.get_version(&fx.admin, &payments(), &v("exact")).await.unwrap();
    assert_eq!(fetched.content, manifest(64));

    let over: Upload = Box::new(std::io::Cursor::new(manifest(65)));
    let err = store
        .add_version(&fx.admin, &payments(), NewVersion::streamed("over", "json", over))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ChannelStoreError::Validation(ValidationError::ContentTooLarge { .. })
    ));
}

#[tokio::test]
async fn test_endless_upload_is_cut_off() {
    let fx = TestFixture::new();
    let store = fx.memory_store(small_limits());
    store.add_channel(&fx.admin, "payments", vec![]).await.unwrap();

    let endless: Upload = Box::new(tokio::io::repeat(b' '));
    let err = store
        .add_version(&fx.admin, &payments(), NewVersion::streamed("huge", "json", endless))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ChannelStoreError::Validation(ValidationError::ContentTooLarge { limit: 64 })
    ));
}

#[tokio::test]
async fn test_empty_content_rejected() {
    let fx = TestFixture::new();
    let store = fx.memory_store(StoreConfig::default());
    store.add_channel(&fx.admin, "payments", vec![]).await.unwrap();

    let err = store
        .add_version(&fx.admin, &payments(), NewVersion::inline("v1", "json", Bytes::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelStoreError::Validation(ValidationError::EmptyContent)));

    // Reported ahead of the channel lookup.
    let err = store
        .add_version(
            &fx.admin,
            &ChannelRef::name("nope"),
            NewVersion::inline("v1", "json", Bytes::new()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelStoreError::Validation(ValidationError::EmptyContent)));
}

#[tokio::test]
async fn test_version_quota() {
    let fx = TestFixture::new();
    let store = fx.memory_store(small_limits());
    store.add_channel(&fx.admin, "payments", vec![]).await.unwrap();

    add(&store, &fx, "v1", manifest(10)).await;
    add(&store, &fx, "v2", manifest(10)).await;
    // max - 1 versions present: one more fits.
    add(&store, &fx, "v3", manifest(10)).await;

    let err = store
        .add_version(&fx.admin, &payments(), NewVersion::inline("v4", "json", manifest(10)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ChannelStoreError::Validation(ValidationError::QuotaExceeded { limit: 3 })
    ));
    assert_eq!(store.list_versions(&fx.admin, &payments()).await.unwrap().len(), 3);
}

// ─────────────────────────────────────────────────────────────────────────────
// Dependencies and lookups
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_remove_channel_blocked_by_subscription() {
    let fx = TestFixture::new();
    let store = fx.memory_store(StoreConfig::default());
    let ch_id = store.add_channel(&fx.admin, "payments", vec![]).await.unwrap();
    add(&store, &fx, "v1", manifest(10)).await;

    store
        .store()
        .insert_subscription(&fx.channel_subscription(ch_id))
        .await
        .unwrap();

    let err = store.remove_channel(&fx.admin, &payments()).await.unwrap_err();
    assert!(matches!(err, ChannelStoreError::Dependency { count: 1, .. }));

    let channel = store.get_channel(&fx.admin, &payments()).await.unwrap();
    assert_eq!(channel.versions.len(), 1);
    assert_eq!(store.store().list_versions(&fx.org, &ch_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_remove_version_blocked_by_subscription() {
    let fx = TestFixture::new();
    let store = fx.memory_store(StoreConfig::default());
    let ch_id = store.add_channel(&fx.admin, "payments", vec![]).await.unwrap();
    let id = store
        .add_version(&fx.admin, &payments(), NewVersion::inline("v1", "json", manifest(10)))
        .await
        .unwrap();

    let sub = Subscription::to_version(fx.org.clone(), ch_id, id);
    store.store().insert_subscription(&sub).await.unwrap();

    let err = store.remove_version(&fx.admin, &payments(), &v("v1")).await.unwrap_err();
    assert!(matches!(err, ChannelStoreError::Dependency { count: 1, .. }));
    assert_eq!(store.list_versions(&fx.admin, &payments()).await.unwrap().len(), 1);

    store.store().delete_subscription(&sub).await.unwrap();
    store.remove_version(&fx.admin, &payments(), &v("v1")).await.unwrap();
}

#[tokio::test]
async fn test_not_found_names_the_missing_layer() {
    let fx = TestFixture::new();
    let store = fx.memory_store(StoreConfig::default());

    let err = store
        .get_version(&fx.admin, &ChannelRef::Id(ChannelId::generate()), &v("v1"))
        .await
        .unwrap_err();
    assert_eq!(err.missing(), Some(Missing::Channel));

    let ch_id = store.add_channel(&fx.admin, "payments", vec![]).await.unwrap();
    let err = store.get_version(&fx.admin, &payments(), &v("v1")).await.unwrap_err();
    assert_eq!(err.missing(), Some(Missing::VersionSummary));

    let id = store
        .add_version(&fx.admin, &payments(), NewVersion::inline("v1", "json", manifest(10)))
        .await
        .unwrap();
    store.store().delete_version(&fx.org, &ch_id, &id).await.unwrap();

    let err = store.get_version(&fx.admin, &payments(), &id.into()).await.unwrap_err();
    assert_eq!(err.missing(), Some(Missing::VersionRecord));

    let audit = store.audit_channel(&fx.admin, &payments()).await.unwrap();
    assert_eq!(audit.dangling, vec![id]);
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let acme = TestFixture::for_org("acme");
    let store = acme.memory_store(StoreConfig::default());
    store.add_channel(&acme.admin, "payments", vec![]).await.unwrap();

    let ungranted = acme.actor("intern");
    let outsider = chanstore_access::Actor::new("ops", chanstore_core::OrgId::new("globex"));
    acme.grants.grant_all(&outsider);

    // Same name, other tenant: nothing visible.
    let err = store.get_channel(&outsider, &payments()).await.unwrap_err();
    assert_eq!(err.missing(), Some(Missing::Channel));

    // Same tenant but no grants.
    let err = store.get_channel(&ungranted, &payments()).await.unwrap_err();
    assert!(matches!(err, ChannelStoreError::Authorization(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Backends
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_object_store_holds_locator_not_bytes() {
    let fx = TestFixture::new();
    let store = fx.memory_store(StoreConfig::default().with_object_store("manifests"));
    let ch_id = store.add_channel(&fx.admin, "payments", vec![]).await.unwrap();

    let id = store
        .add_version(&fx.admin, &payments(), NewVersion::inline("v1", "json", manifest(10)))
        .await
        .unwrap();
    add(&store, &fx, "v2", manifest(10)).await;
    assert_eq!(fx.objects.bucket_creations(), 1);

    let record = store.store().get_version(&fx.org, &ch_id, &id).await.unwrap().unwrap();
    let locator = match &record.content {
        StoredContent::ObjectStore(locator) => locator.clone(),
        other => panic!("expected a locator, got {:?}", other),
    };
    assert!(locator.starts_with(&format!("objects://manifests/acme/{}/", ch_id.to_hex())));

    let version = store.get_version(&fx.admin, &payments(), &v("v1")).await.unwrap();
    assert_eq!(version.location, Location::ObjectStore);
    assert_eq!(version.content, manifest(10));
}

#[tokio::test]
async fn test_location_survives_configuration_change() {
    let fx = TestFixture::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("channels.db");

    {
        let store = fx.build(SqliteStore::open(&path).unwrap(), StoreConfig::default());
        store.add_channel(&fx.admin, "payments", vec![]).await.unwrap();
        add(&store, &fx, "inline", manifest(20)).await;
    }

    {
        let store = fx.build(
            SqliteStore::open(&path).unwrap(),
            StoreConfig::default().with_object_store("manifests"),
        );
        add(&store, &fx, "remote", manifest(30)).await;

        let inline = store.get_version(&fx.admin, &payments(), &v("inline")).await.unwrap();
        assert_eq!(inline.location, Location::Inline);
        assert_eq!(inline.content, manifest(20));
    }

    let store = fx.build(SqliteStore::open(&path).unwrap(), StoreConfig::default());
    let remote = store.get_version(&fx.admin, &payments(), &v("remote")).await.unwrap();
    assert_eq!(remote.location, Location::ObjectStore);
    assert_eq!(remote.content, manifest(30));

    // Deletes also follow the stored location.
    store.remove_version(&fx.admin, &payments(), &v("remote")).await.unwrap();
    assert_eq!(fx.objects.object_count().await, 0);
}

#[tokio::test]
async fn test_object_names_differing_only_in_case_are_rejected() {
    let fx = TestFixture::new();
    let store = fx.memory_store(StoreConfig::default().with_object_store("manifests"));
    store.add_channel(&fx.admin, "payments", vec![]).await.unwrap();
    add(&store, &fx, "v1", manifest(10)).await;

    let err = store
        .add_version(&fx.admin, &payments(), NewVersion::inline("V1", "json", manifest(20)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ChannelStoreError::Validation(ValidationError::DuplicateVersionName(ref n)) if n == "V1"
    ));
    assert_eq!(fx.objects.object_count().await, 1);
    assert_eq!(store.list_versions(&fx.admin, &payments()).await.unwrap().len(), 1);

    let v1 = store.get_version(&fx.admin, &payments(), &v("v1")).await.unwrap();
    assert_eq!(v1.content, manifest(10));
}

#[tokio::test]
async fn test_inline_names_differing_only_in_case_coexist() {
    let fx = TestFixture::new();
    let store = fx.memory_store(StoreConfig::default());
    store.add_channel(&fx.admin, "payments", vec![]).await.unwrap();
    add(&store, &fx, "v1", manifest(10)).await;
    add(&store, &fx, "V1", manifest(20)).await;

    let lower = store.get_version(&fx.admin, &payments(), &v("v1")).await.unwrap();
    let upper = store.get_version(&fx.admin, &payments(), &v("V1")).await.unwrap();
    assert_eq!(lower.content, manifest(10));
    assert_eq!(upper.content, manifest(20));
}

const DEPLOYMENT: &str = "\
apiVersion: v1
kind: Service
metadata:
  name: payments
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: payments
spec:
  replicas: 3
";

#[tokio::test]
async fn test_yaml_stream_roundtrips() {
    let fx = TestFixture::new();
    let store = fx.memory_store(StoreConfig::default().with_object_store("manifests"));
    store.add_channel(&fx.admin, "payments", vec![]).await.unwrap();

    store
        .add_version(&fx.admin, &payments(), NewVersion::inline("v1", "yaml", DEPLOYMENT))
        .await
        .unwrap();
    let version = store.get_version(&fx.admin, &payments(), &v("v1")).await.unwrap();
    assert_eq!(version.format, ManifestFormat::Yaml);
    assert_eq!(&version.content[..], DEPLOYMENT.as_bytes());

    let err = store
        .add_version(
            &fx.admin,
            &payments(),
            NewVersion::inline("v2", "application/yaml", "kind: [Service\n"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelStoreError::Validation(ValidationError::Manifest(_))));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn content_roundtrips_through_either_backend(
        (bytes, _count) in manifest_documents(),
        use_objects in any::<bool>(),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let fetched = rt.block_on(async {
            let fx = TestFixture::new();
            let config = if use_objects {
                StoreConfig::default().with_object_store("manifests")
            } else {
                StoreConfig::default()
            };
            let store = fx.build(MemoryStore::new(), config);
            store.add_channel(&fx.admin, "payments", vec![]).await.unwrap();
            add(&store, &fx, "v1", Bytes::from(bytes.clone())).await;
            store.get_version(&fx.admin, &payments(), &v("v1")).await.unwrap()
        });
        prop_assert_eq!(&fetched.content[..], &bytes[..]);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cascade
// ─────────────────────────────────────────────────────────────────────────────

async fn object_backed_channel(
    fx: &TestFixture,
    objects: Arc<InstrumentedObjectStore>,
    versions: usize,
) -> ChannelVersionStore<MemoryStore> {
    let config = StoreConfig {
        delete_concurrency: 3,
        ..StoreConfig::default().with_object_store("manifests")
    };
    let store = fx.build_with_objects(MemoryStore::new(), config, objects);
    store.add_channel(&fx.admin, "payments", vec![]).await.unwrap();
    for i in 0..versions {
        add(&store, fx, &format!("v{}", i), manifest(16)).await;
    }
    store
}

#[tokio::test]
async fn test_cascade_respects_concurrency_limit() {
    let fx = TestFixture::new();
    let objects = Arc::new(InstrumentedObjectStore::new().with_delete_delay(Duration::from_millis(20)));
    let store = object_backed_channel(&fx, objects.clone(), 12).await;
    assert_eq!(objects.object_count().await, 12);

    store.remove_channel(&fx.admin, &payments()).await.unwrap();

    assert_eq!(objects.delete_calls(), 12);
    assert_eq!(objects.object_count().await, 0);
    assert!(objects.peak_concurrent_deletes() <= 3);
    assert!(objects.peak_concurrent_deletes() >= 1);

    let err = store.get_channel(&fx.admin, &payments()).await.unwrap_err();
    assert_eq!(err.missing(), Some(Missing::Channel));
}

#[tokio::test]
async fn test_cascade_failure_keeps_records() {
    let fx = TestFixture::new();
    let objects = Arc::new(InstrumentedObjectStore::new().failing_deletes_from(0));
    let store = object_backed_channel(&fx, objects.clone(), 4).await;
    let ch_id = store.get_channel(&fx.admin, &payments()).await.unwrap().id;

    let err = store.remove_channel(&fx.admin, &payments()).await.unwrap_err();
    assert!(err.is_internal());

    let channel = store.get_channel(&fx.admin, &payments()).await.unwrap();
    assert_eq!(channel.versions.len(), 4);
    assert_eq!(store.store().list_versions(&fx.org, &ch_id).await.unwrap().len(), 4);
    assert_eq!(objects.object_count().await, 4);
}

#[tokio::test]
async fn test_remove_inline_channel_needs_no_object_store() {
    let fx = TestFixture::new();
    let store = ChannelVersionStore::new(
        MemoryStore::new(),
        fx.grants.clone(),
        fx.keys.clone(),
        StoreConfig::default(),
    );
    let ch_id = store.add_channel(&fx.admin, "payments", vec![]).await.unwrap();
    add(&store, &fx, "v1", manifest(10)).await;
    add(&store, &fx, "v2", manifest(10)).await;

    store.remove_channel(&fx.admin, &payments()).await.unwrap();
    assert!(store.store().list_versions(&fx.org, &ch_id).await.unwrap().is_empty());
    assert!(store.list_channels(&fx.admin).await.unwrap().is_empty());
}
