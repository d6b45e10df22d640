//! Local cache of the record snapshot and the pending-mutation queue.
//!
//! Both live as JSON under fixed keys. A missing or unreadable value reads
//! as empty; writes replace the whole value for their key.
//!
//! Every read-modify-write of the queue runs under one lock shared by all
//! clones of a [`LocalCacheStore`], so store writes and a sync drain cannot
//! overwrite each other's edits.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use super::storage::DurableStorage;
use crate::errors::{StoreError, StoreResult};
use crate::models::{PendingMutation, TeamRequest};

/// Key of the record snapshot.
pub const RECORDS_KEY: &str = "teamfinder.requests";
/// Key of the pending-mutation queue.
pub const QUEUE_KEY: &str = "teamfinder.pending_mutations";

#[derive(Clone)]
pub struct LocalCacheStore {
    storage: Arc<dyn DurableStorage>,
    queue_lock: Arc<Mutex<()>>,
}

/// Exclusive access to the pending queue until dropped.
pub struct QueueGuard<'a> {
    cache: &'a LocalCacheStore,
    _lock: MutexGuard<'a, ()>,
}

impl QueueGuard<'_> {
    pub async fn read(&self) -> Vec<PendingMutation> {
        self.cache.read_list(QUEUE_KEY).await
    }

    pub async fn write(&self, mutations: &[PendingMutation]) -> StoreResult<()> {
        self.cache.write_list(QUEUE_KEY, mutations).await
    }
}

impl LocalCacheStore {
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self {
            storage,
            queue_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn read_all(&self) -> Vec<TeamRequest> {
        self.read_list(RECORDS_KEY).await
    }

    pub async fn write_all(&self, records: &[TeamRequest]) -> StoreResult<()> {
        self.write_list(RECORDS_KEY, records).await
    }

    /// Hold the queue lock for a multi-step edit.
    pub async fn lock_queue(&self) -> QueueGuard<'_> {
        QueueGuard {
            cache: self,
            _lock: self.queue_lock.lock().await,
        }
    }

    pub async fn read_queue(&self) -> Vec<PendingMutation> {
        self.lock_queue().await.read().await
    }

    pub async fn append_to_queue(&self, mutation: PendingMutation) -> StoreResult<()> {
        let queue = self.lock_queue().await;
        let mut pending = queue.read().await;
        pending.push(mutation);
        queue.write(&pending).await
    }

    pub async fn replace_queue(&self, mutations: &[PendingMutation]) -> StoreResult<()> {
        self.lock_queue().await.write(mutations).await
    }

    async fn read_list<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let raw = match self.storage.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(key, "Cache read failed, treating as empty: {}", e);
                return Vec::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(key, "Corrupt cache entry, treating as empty: {}", e);
            Vec::new()
        })
    }

    async fn write_list<T: Serialize>(&self, key: &str, items: &[T]) -> StoreResult<()> {
        let raw = serde_json::to_string(items).map_err(|e| StoreError::Storage(e.to_string()))?;
        self.storage.set(key, &raw).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::client::storage::MemoryStorage;
    use crate::models::MutationAction;
    use async_trait::async_trait;

    /// Memory storage that yields to the scheduler on every call, so
    /// concurrent read-modify-write cycles interleave.
    #[derive(Default)]
    pub(crate) struct YieldingStorage {
        inner: MemoryStorage,
    }

    #[async_trait]
    impl DurableStorage for YieldingStorage {
        async fn get(&self, key: &str) -> StoreResult<Option<String>> {
            tokio::task::yield_now().await;
            let value = self.inner.get(key).await;
            tokio::task::yield_now().await;
            value
        }

        async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
            tokio::task::yield_now().await;
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> StoreResult<()> {
            tokio::task::yield_now().await;
            self.inner.remove(key).await
        }
    }

    fn cache() -> (LocalCacheStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (LocalCacheStore::new(storage.clone()), storage)
    }

    #[tokio::test]
    async fn test_missing_keys_read_as_empty() {
        let (cache, _) = cache();
        assert!(cache.read_all().await.is_empty());
        assert!(cache.read_queue().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_values_read_as_empty() {
        let (cache, storage) = cache();
        storage.set(RECORDS_KEY, "{not json").await.unwrap();
        storage.set(QUEUE_KEY, r#"{"action":"create"}"#).await.unwrap();

        assert!(cache.read_all().await.is_empty());
        assert!(cache.read_queue().await.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_and_queue_round_trip() {
        let (cache, _) = cache();
        let record = TeamRequest::reference("r1", "fp-a");

        cache.write_all(&[record.clone()]).await.unwrap();
        assert_eq!(cache.read_all().await, vec![record.clone()]);

        let first = PendingMutation::new(MutationAction::Create, record.clone());
        let second = PendingMutation::new(MutationAction::Delete, record);
        cache.append_to_queue(first.clone()).await.unwrap();
        cache.append_to_queue(second.clone()).await.unwrap();
        assert_eq!(cache.read_queue().await, vec![first, second.clone()]);

        cache.replace_queue(&[second.clone()]).await.unwrap();
        assert_eq!(cache.read_queue().await, vec![second]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_all_kept() {
        let cache = LocalCacheStore::new(Arc::new(YieldingStorage::default()));
        let mutations: Vec<PendingMutation> = (0..8)
            .map(|i| {
                PendingMutation::new(
                    MutationAction::Delete,
                    TeamRequest::reference(format!("r{}", i), "fp-a"),
                )
            })
            .collect();

        let clone = cache.clone();
        tokio::join!(
            async {
                for m in &mutations[..4] {
                    cache.append_to_queue(m.clone()).await.unwrap();
                }
            },
            async {
                for m in &mutations[4..] {
                    clone.append_to_queue(m.clone()).await.unwrap();
                }
            }
        );

        let queued = cache.read_queue().await;
        assert_eq!(queued.len(), mutations.len());
        for m in &mutations {
            assert!(queued.iter().any(|q| q.id == m.id));
        }
    }
}
