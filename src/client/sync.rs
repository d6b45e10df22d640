//! Reconnection synchronizer and connectivity probe.
//!
//! When connectivity comes back, queued mutations are replayed oldest first
//! against the backend. Each replay stands alone: a failure keeps that
//! mutation queued and the drain moves on. The offline flag clears only when
//! the queue ends up empty.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::store::OfflineFirstStore;
use crate::config::ClientConfig;
use crate::errors::{StoreError, StoreResult};
use crate::models::{MutationAction, PendingMutation};

/// Connectivity as reported by the host or by [`HealthProbe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

/// Outcome of one drain of the pending queue.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub replayed: usize,
    pub failed: usize,
    pub evicted: usize,
    /// Queue length after the drain, including mutations added meanwhile.
    pub remaining: usize,
}

pub struct ReconnectionSynchronizer {
    store: Arc<OfflineFirstStore>,
    max_replay_attempts: Option<u32>,
    drain_lock: Mutex<()>,
}

impl ReconnectionSynchronizer {
    pub fn new(store: Arc<OfflineFirstStore>) -> Self {
        Self {
            store,
            max_replay_attempts: None,
            drain_lock: Mutex::new(()),
        }
    }

    /// Drop a mutation once it has failed this many replays. `None` keeps
    /// retrying forever.
    pub fn with_max_replay_attempts(mut self, max: Option<u32>) -> Self {
        self.max_replay_attempts = max.filter(|m| *m > 0);
        self
    }

    /// Whether there is anything to catch up on.
    pub async fn needs_sync(&self) -> bool {
        self.store.is_offline() || self.store.pending_count().await > 0
    }

    /// Replay every queued mutation once, oldest first.
    pub async fn sync_pending(&self) -> SyncReport {
        let _guard = self.drain_lock.lock().await;
        let cache = self.store.cache();

        let mut queue = cache.read_queue().await;
        queue.sort_by_key(|m| m.timestamp);
        let attempted: HashSet<String> = queue.iter().map(|m| m.id.clone()).collect();

        let mut report = SyncReport::default();
        let mut retained = Vec::new();

        for mut mutation in queue {
            match self.replay(&mutation).await {
                Ok(()) => {
                    tracing::debug!(mutation = %mutation.id, action = ?mutation.action, "Replayed pending mutation");
                    report.replayed += 1;
                }
                Err(err) => {
                    mutation.attempts += 1;
                    if self
                        .max_replay_attempts
                        .is_some_and(|max| mutation.attempts >= max)
                    {
                        tracing::warn!(
                            mutation = %mutation.id,
                            action = ?mutation.action,
                            attempts = mutation.attempts,
                            "Dropping pending mutation after repeated failures: {}",
                            err
                        );
                        report.evicted += 1;
                        continue;
                    }
                    tracing::debug!(mutation = %mutation.id, "Replay failed, keeping queued: {}", err);
                    report.failed += 1;
                    retained.push(mutation);
                }
            }
        }

        // Keep writes that fell back while the drain was running. The queue
        // lock stays held through the flag decision.
        {
            let locked = cache.lock_queue().await;
            retained.extend(
                locked
                    .read()
                    .await
                    .into_iter()
                    .filter(|m| !attempted.contains(&m.id)),
            );

            if let Err(e) = locked.write(&retained).await {
                tracing::warn!("Failed to persist pending queue after sync: {}", e);
                report.remaining = locked.read().await.len();
                return report;
            }
            report.remaining = retained.len();

            if retained.is_empty() {
                self.store.connectivity().mark_online();
            }
        }

        if report.replayed > 0 {
            self.store.notifier().notify();
        }

        tracing::info!(
            replayed = report.replayed,
            failed = report.failed,
            evicted = report.evicted,
            remaining = report.remaining,
            "Pending mutation sync finished"
        );
        report
    }

    async fn replay(&self, mutation: &PendingMutation) -> StoreResult<()> {
        let remote = self.store.remote();
        let payload = &mutation.payload;

        match mutation.action {
            MutationAction::Create => remote.create(payload).await.map(drop),
            MutationAction::Update => {
                let id = payload.identity().ok_or(StoreError::MissingIdentity)?;
                remote.update(id, payload).await.map(drop)
            }
            MutationAction::Delete => {
                let id = payload.identity().ok_or(StoreError::MissingIdentity)?;
                remote.remove(id, &payload.owner_fingerprint).await
            }
        }
    }

    /// Follow connectivity transitions until the sender goes away.
    ///
    /// Also drains once at startup when already online with work pending.
    pub async fn run(self: Arc<Self>, mut signals: watch::Receiver<Connectivity>) {
        let mut last = *signals.borrow_and_update();
        if last == Connectivity::Online && self.needs_sync().await {
            self.sync_pending().await;
        }

        while signals.changed().await.is_ok() {
            let current = *signals.borrow_and_update();
            match (last, current) {
                (Connectivity::Offline, Connectivity::Online) => {
                    tracing::info!("Connectivity restored, replaying pending changes");
                    self.sync_pending().await;
                }
                (Connectivity::Online, Connectivity::Offline) => {
                    tracing::info!("Connectivity lost");
                }
                _ => {}
            }
            last = current;
        }
    }

    pub fn spawn(self: Arc<Self>, signals: watch::Receiver<Connectivity>) -> JoinHandle<()> {
        tokio::spawn(self.run(signals))
    }
}

/// Polls the backend health endpoint and publishes [`Connectivity`].
#[derive(Clone)]
pub struct HealthProbe {
    client: Client,
    url: String,
    interval: Duration,
}

impl HealthProbe {
    pub fn new(base_url: &str, interval: Duration, timeout: Duration) -> StoreResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}/health", base_url.trim_end_matches('/')),
            interval,
        })
    }

    pub fn from_config(config: &ClientConfig) -> StoreResult<Self> {
        Self::new(
            &config.api_base_url,
            config.probe_interval,
            config.remote_timeout,
        )
    }

    pub async fn check(&self) -> Connectivity {
        match self.client.get(&self.url).send().await {
            Ok(resp) if resp.status().is_success() => Connectivity::Online,
            Ok(resp) => {
                tracing::debug!(status = %resp.status(), "Health probe failed");
                Connectivity::Offline
            }
            Err(e) => {
                tracing::debug!("Health probe failed: {}", e);
                Connectivity::Offline
            }
        }
    }

    /// Probe on every tick, publishing only changes. Stops when all receivers are gone.
    pub fn spawn(self, sender: watch::Sender<Connectivity>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                if sender.is_closed() {
                    break;
                }
                let state = self.check().await;
                sender.send_if_modified(|current| {
                    if *current == state {
                        false
                    } else {
                        *current = state;
                        true
                    }
                });
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::cache::tests::YieldingStorage;
    use crate::client::notifier::NotificationChannel;
    use crate::client::store::tests::{cached, harness, ScriptedRemote};
    use crate::client::LocalCacheStore;
    use crate::models::TeamRequest;
    use std::sync::atomic::Ordering;

    async fn queue_update_and_delete(h: &crate::client::store::tests::Harness) {
        h.store
            .cache()
            .write_all(&[cached("r1", "A", "T0"), cached("r2", "A", "T0")])
            .await
            .unwrap();

        let mut change = cached("r1", "A", "T0");
        change.name = Some("Renamed".to_string());
        h.store.update(change).await.unwrap();
        h.store.remove("r2", "A").await.unwrap();
        assert_eq!(h.store.pending_count().await, 2);
        assert!(h.store.is_offline());
    }

    #[tokio::test]
    async fn test_drain_empties_queue_and_clears_flag() {
        let h = harness(ScriptedRemote::unreachable());
        queue_update_and_delete(&h).await;

        h.remote.set_offline(false);
        h.remote.calls.lock().clear();
        let sync = ReconnectionSynchronizer::new(h.store.clone());
        let report = sync.sync_pending().await;

        assert_eq!(report.replayed, 2);
        assert_eq!(report.remaining, 0);
        assert_eq!(h.store.pending_count().await, 0);
        assert!(!h.store.is_offline());
        assert_eq!(
            *h.remote.calls.lock(),
            vec!["update:r1".to_string(), "remove:r2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_partial_drain_keeps_failed_mutation_and_flag() {
        let h = harness(ScriptedRemote::unreachable());
        queue_update_and_delete(&h).await;
        let before = h.store.cache().read_queue().await;

        h.remote.set_offline(false);
        h.remote.script.lock().extend([false, true]);
        let report = ReconnectionSynchronizer::new(h.store.clone())
            .sync_pending()
            .await;

        assert_eq!(report.replayed, 1);
        assert_eq!(report.failed, 1);
        let after = h.store.cache().read_queue().await;
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, before[0].id);
        assert_eq!(after[0].action, MutationAction::Update);
        assert_eq!(after[0].attempts, 1);
        assert!(h.store.is_offline());
    }

    #[tokio::test]
    async fn test_replay_follows_timestamp_order() {
        let h = harness(ScriptedRemote::default());
        let mut late = PendingMutation::new(
            MutationAction::Delete,
            TeamRequest::reference("late", "A"),
        );
        let early = PendingMutation::new(
            MutationAction::Delete,
            TeamRequest::reference("early", "A"),
        );
        late.timestamp = early.timestamp + chrono::Duration::seconds(5);
        h.store
            .cache()
            .replace_queue(&[late, early])
            .await
            .unwrap();

        ReconnectionSynchronizer::new(h.store.clone())
            .sync_pending()
            .await;
        assert_eq!(
            *h.remote.calls.lock(),
            vec!["remove:early".to_string(), "remove:late".to_string()]
        );
    }

    #[tokio::test]
    async fn test_retry_cap_evicts_mutation() {
        let h = harness(ScriptedRemote::unreachable());
        queue_update_and_delete(&h).await;

        let sync = ReconnectionSynchronizer::new(h.store.clone()).with_max_replay_attempts(Some(2));
        let first = sync.sync_pending().await;
        assert_eq!(first.failed, 2);
        assert_eq!(first.remaining, 2);

        let second = sync.sync_pending().await;
        assert_eq!(second.evicted, 2);
        assert_eq!(second.remaining, 0);
        assert!(!h.store.is_offline());
    }

    #[tokio::test]
    async fn test_successful_replay_notifies_other_contexts() {
        let h = harness(ScriptedRemote::unreachable());
        queue_update_and_delete(&h).await;
        let before = h.broadcasts.load(Ordering::SeqCst);

        h.remote.set_offline(false);
        ReconnectionSynchronizer::new(h.store.clone())
            .sync_pending()
            .await;
        assert_eq!(h.broadcasts.load(Ordering::SeqCst), before + 1);
    }

    #[tokio::test]
    async fn test_run_drains_on_reconnect() {
        let h = harness(ScriptedRemote::unreachable());
        queue_update_and_delete(&h).await;

        let (tx, rx) = watch::channel(Connectivity::Offline);
        let sync = Arc::new(ReconnectionSynchronizer::new(h.store.clone()));
        let handle = sync.spawn(rx);

        h.remote.set_offline(false);
        tx.send(Connectivity::Online).unwrap();

        for _ in 0..50 {
            if h.store.pending_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(h.store.pending_count().await, 0);
        assert!(!h.store.is_offline());

        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_drains_at_startup_when_online() {
        let h = harness(ScriptedRemote::unreachable());
        queue_update_and_delete(&h).await;
        h.remote.set_offline(false);

        let (tx, rx) = watch::channel(Connectivity::Online);
        let handle = Arc::new(ReconnectionSynchronizer::new(h.store.clone())).spawn(rx);
        drop(tx);
        handle.await.unwrap();

        assert_eq!(h.store.pending_count().await, 0);
        assert!(!h.store.is_offline());
    }

    #[tokio::test]
    async fn test_drain_and_concurrent_write_keep_each_other() {
        for round in 0..50 {
            let channel = NotificationChannel::default();
            let store = Arc::new(OfflineFirstStore::new(
                Arc::new(ScriptedRemote::default()),
                LocalCacheStore::new(Arc::new(YieldingStorage::default())),
                channel.join(),
            ));
            let cache = store.cache().clone();

            let queued = PendingMutation::new(
                MutationAction::Delete,
                TeamRequest::reference("queued", "A"),
            );
            cache.replace_queue(&[queued.clone()]).await.unwrap();
            let late = PendingMutation::new(
                MutationAction::Delete,
                TeamRequest::reference("late", "A"),
            );

            let sync = ReconnectionSynchronizer::new(store.clone());
            let (report, appended) =
                tokio::join!(sync.sync_pending(), cache.append_to_queue(late.clone()));
            appended.unwrap();

            let after = cache.read_queue().await;
            assert!(
                after.iter().all(|m| m.id != queued.id),
                "round {}: replayed mutation came back",
                round
            );
            let kept = after.iter().any(|m| m.id == late.id);
            assert!(
                kept || report.replayed == 2,
                "round {}: concurrent append lost",
                round
            );
        }
    }
}
