//! Cross-context "listings updated" notifications.
//!
//! A [`NotificationChannel`] plays the role of a named broadcast channel
//! shared by every open context (tab, window, process-local view). Each
//! context joins it as a [`CrossTabNotifier`]; a notification reaches every
//! other context's subscribers, never the sender's own. Delivery is
//! synchronous, unpersisted and best-effort: contexts that are not subscribed
//! miss it.
//!
//! The listener list is guarded by a `parking_lot::Mutex` that is never held
//! while callbacks run, so a callback may subscribe or unsubscribe.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::models::ChannelMessage;

/// Name of the channel listing updates travel on.
pub const CHANNEL_NAME: &str = "teamfinder-listings";

type Listener = dyn Fn(ChannelMessage) + Send + Sync;

struct Registration {
    id: u64,
    context: u64,
    callback: Arc<Listener>,
}

struct ChannelInner {
    name: String,
    listeners: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
}

/// Shared broadcast channel. Cloning yields another handle to the same channel.
#[derive(Clone)]
pub struct NotificationChannel {
    inner: Arc<ChannelInner>,
}

impl Default for NotificationChannel {
    fn default() -> Self {
        Self::new(CHANNEL_NAME)
    }
}

impl NotificationChannel {
    pub fn new(name: &str) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                name: name.to_string(),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Open a new context on this channel.
    pub fn join(&self) -> CrossTabNotifier {
        CrossTabNotifier {
            channel: self.clone(),
            context: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn post(&self, sender: u64, message: ChannelMessage) -> usize {
        let targets: Vec<Arc<Listener>> = {
            let listeners = self.inner.listeners.lock();
            listeners
                .iter()
                .filter(|r| r.context != sender)
                .map(|r| Arc::clone(&r.callback))
                .collect()
        };

        for callback in &targets {
            callback(message);
        }
        targets.len()
    }
}

/// One context's handle on a [`NotificationChannel`].
pub struct CrossTabNotifier {
    channel: NotificationChannel,
    context: u64,
}

impl CrossTabNotifier {
    /// Tell every other context that the listings changed.
    pub fn notify(&self) {
        let delivered = self
            .channel
            .post(self.context, ChannelMessage::ListingsUpdated);
        tracing::debug!(
            channel = self.channel.name(),
            delivered,
            "Listings update broadcast"
        );
    }

    /// Call `callback` once per message from another context until the
    /// returned [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe(
        &self,
        callback: impl Fn(ChannelMessage) + Send + Sync + 'static,
    ) -> Subscription {
        let inner = &self.channel.inner;
        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        inner.listeners.lock().push(Registration {
            id,
            context: self.context,
            callback: Arc::new(callback),
        });

        Subscription {
            channel: Arc::downgrade(inner),
            id,
        }
    }

    /// Subscribe and receive messages on an async channel instead of a callback.
    pub fn listen(&self) -> (Subscription, mpsc::UnboundedReceiver<ChannelMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |message| {
            let _ = tx.send(message);
        });
        (subscription, rx)
    }
}

/// Handle that deregisters its listener when unsubscribed or dropped.
pub struct Subscription {
    channel: Weak<ChannelInner>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.channel.upgrade() {
            inner.listeners.lock().retain(|r| r.id != self.id);
        }
    }
}
