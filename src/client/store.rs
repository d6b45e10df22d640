//! Offline-first data access layer.
//!
//! Writes always try the backend first. A [`StoreError::RemoteUnavailable`]
//! switches the operation onto the local cache: the snapshot is edited, the
//! change is queued for replay, and the instance's offline flag is raised.
//! From the caller's side the operation still succeeds. Ownership and
//! missing-target failures on the local path are terminal and returned as is.
//!
//! The offline flag gates only `list`; writes ignore it because connectivity
//! may have come back without anyone noticing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;

use super::cache::LocalCacheStore;
use super::notifier::CrossTabNotifier;
use super::remote::RemoteStore;
use crate::errors::{StoreError, StoreResult};
use crate::models::{MutationAction, PendingMutation, TeamRequest};

/// Offline flag owned by one store instance.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityState {
    offline: Arc<AtomicBool>,
}

impl ConnectivityState {
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_offline(&self) {
        if !self.offline.swap(true, Ordering::SeqCst) {
            tracing::info!("Backend unreachable, working from local cache");
        }
    }

    pub(crate) fn mark_online(&self) {
        if self.offline.swap(false, Ordering::SeqCst) {
            tracing::info!("Pending changes synced, back online");
        }
    }
}

pub struct OfflineFirstStore {
    remote: Arc<dyn RemoteStore>,
    cache: LocalCacheStore,
    notifier: CrossTabNotifier,
    connectivity: ConnectivityState,
}

impl OfflineFirstStore {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        cache: LocalCacheStore,
        notifier: CrossTabNotifier,
    ) -> Self {
        Self {
            remote,
            cache,
            notifier,
            connectivity: ConnectivityState::default(),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.connectivity.is_offline()
    }

    /// Number of changes waiting for replay.
    pub async fn pending_count(&self) -> usize {
        self.cache.read_queue().await.len()
    }

    pub(crate) fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    pub(crate) fn cache(&self) -> &LocalCacheStore {
        &self.cache
    }

    pub(crate) fn connectivity(&self) -> &ConnectivityState {
        &self.connectivity
    }

    pub(crate) fn notifier(&self) -> &CrossTabNotifier {
        &self.notifier
    }

    /// Update when the record has an id, create otherwise.
    pub async fn save(&self, record: TeamRequest) -> StoreResult<TeamRequest> {
        if record.identity().is_some() {
            self.update(record).await
        } else {
            self.create(record).await
        }
    }

    pub async fn create(&self, record: TeamRequest) -> StoreResult<TeamRequest> {
        match self.remote.create(&record).await {
            Ok(created) => {
                self.notifier.notify();
                Ok(created)
            }
            Err(err) if err.is_terminal() => Err(err),
            Err(err) => {
                tracing::warn!("Remote create failed, saving locally: {}", err);
                self.create_locally(record).await
            }
        }
    }

    async fn create_locally(&self, mut record: TeamRequest) -> StoreResult<TeamRequest> {
        if record.identity().is_none() {
            record.id = Some(uuid::Uuid::new_v4().to_string());
        }

        let mut snapshot = self.cache.read_all().await;
        match snapshot.iter().position(|r| r.id == record.id) {
            Some(position) => {
                // Re-creating a cached id must not change its owner or creation time
                let stored = &snapshot[position];
                if stored.owner_fingerprint != record.owner_fingerprint {
                    return Err(StoreError::NotAuthorized(
                        stored.identity().unwrap_or_default().to_string(),
                    ));
                }
                record.created_at = stored.created_at.clone();
                snapshot[position] = record.clone();
            }
            None => {
                if record.created_at.is_none() {
                    record.created_at = Some(Utc::now().to_rfc3339());
                }
                snapshot.push(record.clone());
            }
        }
        self.cache.write_all(&snapshot).await?;

        self.enqueue(MutationAction::Create, record.clone()).await?;
        Ok(record)
    }

    /// Update the record named by `record.id`.
    pub async fn update(&self, record: TeamRequest) -> StoreResult<TeamRequest> {
        let id = record
            .identity()
            .ok_or(StoreError::MissingIdentity)?
            .to_string();
        self.update_by_id(&id, record).await
    }

    /// Update the record `id`; an id inside `record` is ignored.
    pub async fn update_by_id(&self, id: &str, record: TeamRequest) -> StoreResult<TeamRequest> {
        if id.is_empty() {
            return Err(StoreError::MissingIdentity);
        }

        match self.remote.update(id, &record).await {
            Ok(updated) => {
                self.notifier.notify();
                Ok(updated)
            }
            Err(err) if err.is_terminal() => Err(err),
            Err(err) => {
                tracing::warn!(%id, "Remote update failed, updating locally: {}", err);
                self.update_locally(id, record).await
            }
        }
    }

    async fn update_locally(&self, id: &str, record: TeamRequest) -> StoreResult<TeamRequest> {
        let mut snapshot = self.cache.read_all().await;
        let position = snapshot
            .iter()
            .position(|r| r.id.as_deref() == Some(id))
            .ok_or_else(|| StoreError::RecordNotFound(id.to_string()))?;

        let stored = &snapshot[position];
        if stored.owner_fingerprint != record.owner_fingerprint {
            return Err(StoreError::NotAuthorized(id.to_string()));
        }

        let mut merged = record.merged_over(stored);
        merged.updated_at = Some(Utc::now().to_rfc3339());
        snapshot[position] = merged.clone();
        self.cache.write_all(&snapshot).await?;

        self.enqueue(MutationAction::Update, merged.clone()).await?;
        Ok(merged)
    }

    pub async fn remove(&self, id: &str, owner_fingerprint: &str) -> StoreResult<()> {
        match self.remote.remove(id, owner_fingerprint).await {
            Ok(()) => {
                self.notifier.notify();
                Ok(())
            }
            Err(err) if err.is_terminal() => Err(err),
            Err(err) => {
                tracing::warn!(%id, "Remote delete failed, deleting locally: {}", err);
                self.remove_locally(id, owner_fingerprint).await
            }
        }
    }

    async fn remove_locally(&self, id: &str, owner_fingerprint: &str) -> StoreResult<()> {
        let mut snapshot = self.cache.read_all().await;
        let stored = snapshot
            .iter()
            .find(|r| r.id.as_deref() == Some(id))
            .ok_or_else(|| StoreError::RecordNotFound(id.to_string()))?;

        if stored.owner_fingerprint != owner_fingerprint {
            return Err(StoreError::NotAuthorized(id.to_string()));
        }

        snapshot.retain(|r| r.id.as_deref() != Some(id));
        self.cache.write_all(&snapshot).await?;

        self.enqueue(
            MutationAction::Delete,
            TeamRequest::reference(id, owner_fingerprint),
        )
        .await
    }

    /// Fresh records from the backend while online, the cached snapshot otherwise.
    pub async fn list(&self) -> Vec<TeamRequest> {
        if self.connectivity.is_offline() {
            return self.cache.read_all().await;
        }

        match self.remote.list().await {
            Ok(records) => {
                if let Err(e) = self.cache.write_all(&records).await {
                    tracing::warn!("Failed to refresh local snapshot: {}", e);
                }
                records
            }
            Err(err) => {
                tracing::warn!("Remote list failed, serving local snapshot: {}", err);
                self.cache.read_all().await
            }
        }
    }

    /// Queue a local change, raise the offline flag, tell other contexts.
    async fn enqueue(&self, action: MutationAction, payload: TeamRequest) -> StoreResult<()> {
        self.cache
            .append_to_queue(PendingMutation::new(action, payload))
            .await?;
        self.connectivity.mark_offline();
        self.notifier.notify();
        Ok(())
    }
}
