//! Bounded fan-out deletion of object payloads.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use chanstore_objects::{ObjectLocator, ObjectStore, ObjectStoreError};

/// Why a cascade stopped.
#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("deleting {locator}: {source}")]
    Delete {
        locator: ObjectLocator,
        #[source]
        source: ObjectStoreError,
    },

    #[error("delete task failed: {0}")]
    Join(#[from] JoinError),

    #[error("delete limiter closed")]
    Closed,
}

/// Delete every object, at most `concurrency` at a time.
///
/// Stops at the first failure: tasks still waiting for a permit are aborted
/// and the error is returned. No retries. Returns how many objects were
/// deleted.
pub async fn delete_objects(
    client: Arc<dyn ObjectStore>,
    locators: Vec<ObjectLocator>,
    concurrency: usize,
) -> Result<usize, CascadeError> {
    let limiter = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for locator in locators {
        let client = client.clone();
        let limiter = limiter.clone();
        tasks.spawn(async move {
            let _permit = limiter
                .acquire_owned()
                .await
                .map_err(|_| CascadeError::Closed)?;
            let result = client.delete(&locator).await;
            result.map_err(|source| CascadeError::Delete { locator, source })
        });
    }

    let mut deleted = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => deleted += 1,
            Ok(Err(e)) => {
                tasks.abort_all();
                return Err(e);
            }
            Err(e) => {
                tasks.abort_all();
                return Err(e.into());
            }
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chanstore_objects::MemoryObjectStore;

    #[tokio::test]
    async fn test_deletes_everything() {
        let store = Arc::new(MemoryObjectStore::new());
        store.ensure_bucket("b").await.unwrap();
        let mut locators = Vec::new();
        for i in 0..12 {
            locators.push(
                store
                    .put("b", &format!("k{}", i), Bytes::from_static(b"x"))
                    .await
                    .unwrap(),
            );
        }

        let deleted = delete_objects(store.clone(), locators, 3).await.unwrap();
        assert_eq!(deleted, 12);
        assert_eq!(store.object_count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_is_noop() {
        let store = Arc::new(MemoryObjectStore::new());
        assert_eq!(delete_objects(store, Vec::new(), 5).await.unwrap(), 0);
    }
}
