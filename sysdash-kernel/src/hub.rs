/**
 * BROADCAST HUB - Subscriber registry and update fan-out
 *
 * ROLE:
 * Keeps the set of live subscribers and pushes every published update to
 * each of them through its own bounded queue.
 *
 * HOW IT WORKS:
 * - subscribe() registers a queue and puts the initial snapshot in it first
 * - publish() try_sends into every queue; it never waits on a subscriber
 * - a full queue means the subscriber stopped draining: it is dropped, its
 *   receiver ends, and a reconnect starts again from a fresh snapshot
 * - a closed queue (receiver gone) is pruned on the next publish
 *
 * Per-subscriber order is the publish order (one mpsc queue each, publishes
 * serialized by the registry lock).
 */

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::models::Update;

#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<Arc<Update>>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

/// A live registration. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<Arc<Update>>,
    hub: BroadcastHub,
}

impl BroadcastHub {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                queue_capacity: queue_capacity.max(1),
            }),
        }
    }

    /// Register a subscriber whose first message is `initial`.
    ///
    /// Callers that need a gap-free start must build `initial` and call this
    /// while holding whatever lock serializes their publishes.
    pub fn subscribe(&self, initial: Update) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.queue_capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        // fresh queue with capacity >= 1 always accepts the first message
        if tx.try_send(Arc::new(initial)).is_err() {
            warn!(subscriber = id, "could not queue initial snapshot");
        }
        self.inner.subscribers.lock().insert(id, tx);
        debug!(subscriber = id, "subscribed");

        Subscription { id, receiver: rx, hub: self.clone() }
    }

    /// Remove a subscriber. Returns whether it was still registered.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let removed = self.inner.subscribers.lock().remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "unsubscribed");
        }
        removed
    }

    /// Deliver `update` to every registered subscriber. Returns how many
    /// queues accepted it.
    pub fn publish(&self, update: Update) -> usize {
        let update = Arc::new(update);
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|id, tx| match tx.try_send(Arc::clone(&update)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(subscriber = *id, "subscriber queue full, dropping subscriber");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = *id, "subscriber gone");
                false
            }
        });
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next update, or `None` once the hub dropped this subscriber.
    pub async fn recv(&mut self) -> Option<Arc<Update>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<Update>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}
