//! Object stores instrumented for cascade tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use chanstore_objects::{MemoryObjectStore, ObjectLocator, ObjectStore, ObjectStoreError, Result};

/// Wraps a [`MemoryObjectStore`], recording how many deletes run at once and
/// optionally slowing them down or failing them.
#[derive(Debug, Default)]
pub struct InstrumentedObjectStore {
    inner: MemoryObjectStore,
    delete_delay: Duration,
    /// Deletes with a zero-based call index at or past this fail.
    fail_deletes_from: Option<usize>,
    delete_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl InstrumentedObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every delete for `delay` so concurrent deletes overlap.
    pub fn with_delete_delay(mut self, delay: Duration) -> Self {
        self.delete_delay = delay;
        self
    }

    /// Fail the `n`th delete call (zero-based) and every one after it.
    pub fn failing_deletes_from(mut self, n: usize) -> Self {
        self.fail_deletes_from = Some(n);
        self
    }

    /// Highest number of deletes observed in flight at the same time.
    pub fn peak_concurrent_deletes(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub async fn object_count(&self) -> usize {
        self.inner.object_count().await
    }

    pub fn bucket_creations(&self) -> usize {
        self.inner.bucket_creations()
    }
}

#[async_trait]
impl ObjectStore for InstrumentedObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        self.inner.ensure_bucket(bucket).await
    }

    async fn put(&self, bucket: &str, key: &str, bytes: Bytes) -> Result<ObjectLocator> {
        self.inner.put(bucket, key, bytes).await
    }

    async fn get(&self, locator: &ObjectLocator) -> Result<Bytes> {
        self.inner.get(locator).await
    }

    async fn delete(&self, locator: &ObjectLocator) -> Result<()> {
        let call = self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delete_delay.is_zero() {
            tokio::time::sleep(self.delete_delay).await;
        }

        let result = match self.fail_deletes_from {
            Some(n) if call >= n => Err(ObjectStoreError::Backend(format!(
                "injected failure deleting {}",
                locator
            ))),
            _ => self.inner.delete(locator).await,
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
