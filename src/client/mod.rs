//! Offline-first client data layer.
//!
//! [`ClientRuntime::start`] wires the pieces the way an app context uses
//! them: a SQLite-backed durable store, the HTTP remote, the ownership token,
//! the offline-first store and the reconnection synchronizer driven by the
//! health probe.

pub mod cache;
pub mod filter;
pub mod notifier;
pub mod remote;
pub mod storage;
pub mod store;
pub mod sync;
pub mod token;

pub use cache::LocalCacheStore;
pub use filter::RequestFilter;
pub use notifier::{CrossTabNotifier, NotificationChannel, Subscription};
pub use remote::{HttpRemoteStore, RemoteStore};
pub use storage::{DurableStorage, MemoryStorage, SqliteStorage};
pub use store::{ConnectivityState, OfflineFirstStore};
pub use sync::{Connectivity, HealthProbe, ReconnectionSynchronizer, SyncReport};
pub use token::{OwnershipTokenProvider, TOKEN_KEY};

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::errors::StoreResult;

/// One running app context.
pub struct ClientRuntime {
    pub store: Arc<OfflineFirstStore>,
    pub tokens: OwnershipTokenProvider,
    pub synchronizer: Arc<ReconnectionSynchronizer>,
    connectivity: watch::Receiver<Connectivity>,
    tasks: Vec<JoinHandle<()>>,
}

impl ClientRuntime {
    /// Open the local cache, join `channel` and start background sync.
    pub async fn start(config: &ClientConfig, channel: &NotificationChannel) -> StoreResult<Self> {
        let storage: Arc<dyn DurableStorage> =
            Arc::new(SqliteStorage::open(&config.cache_path).await?);
        let remote: Arc<dyn RemoteStore> = Arc::new(HttpRemoteStore::from_config(config)?);

        let store = Arc::new(OfflineFirstStore::new(
            remote,
            LocalCacheStore::new(storage.clone()),
            channel.join(),
        ));
        let synchronizer = Arc::new(
            ReconnectionSynchronizer::new(store.clone())
                .with_max_replay_attempts(config.max_replay_attempts),
        );

        let probe = HealthProbe::from_config(config)?;
        let initial = probe.check().await;
        let (tx, rx) = watch::channel(initial);

        let tasks = vec![
            probe.spawn(tx),
            synchronizer.clone().spawn(rx.clone()),
        ];

        tracing::info!(
            api = %config.api_base_url,
            cache = %config.cache_path.display(),
            connectivity = ?initial,
            "Client runtime started"
        );

        Ok(Self {
            store,
            tokens: OwnershipTokenProvider::new(storage),
            synchronizer,
            connectivity: rx,
            tasks,
        })
    }

    /// Last connectivity reported by the probe.
    pub fn connectivity(&self) -> Connectivity {
        *self.connectivity.borrow()
    }
}

/// Dropping the runtime stops the probe and synchronizer tasks.
impl Drop for ClientRuntime {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
