//! Fan-out of one publisher to any number of live subscribers.
//!
//! Each subscriber owns an unbounded FIFO queue. Publishing snapshots the
//! subscriber set under a lock and pushes outside it, so no subscriber can
//! hold up the publisher or anyone else. Late joiners see nothing published
//! before they subscribed.

use futures::stream::{self, Stream};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

type SubscriberSet<T> = Mutex<Vec<(Uuid, mpsc::UnboundedSender<T>)>>;

pub struct BroadcastChannel<T> {
    subscribers: Arc<SubscriberSet<T>>,
}

impl<T> Clone for BroadcastChannel<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: self.subscribers.clone(),
        }
    }
}

impl<T> Default for BroadcastChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BroadcastChannel<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a fresh, empty queue.
    pub fn subscribe(&self) -> Subscription<T> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        lock(&self.subscribers).push((id, sender));
        debug!("Subscriber {} joined", id);

        Subscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    /// Remove a queue from the set. Unknown or already removed handles are
    /// ignored.
    pub fn unsubscribe(&self, subscription: &Subscription<T>) {
        remove(&self.subscribers, subscription.id);
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

impl<T: Clone> BroadcastChannel<T> {
    /// Deliver `payload` to every queue registered right now. Never fails and
    /// never waits on a subscriber.
    pub fn publish(&self, payload: T) {
        let snapshot: Vec<(Uuid, mpsc::UnboundedSender<T>)> = lock(&self.subscribers).clone();

        for (id, sender) in snapshot {
            if sender.send(payload.clone()).is_err() {
                debug!("Subscriber {} went away before delivery", id);
            }
        }
    }
}

fn lock<T>(set: &SubscriberSet<T>) -> MutexGuard<'_, Vec<(Uuid, mpsc::UnboundedSender<T>)>> {
    // A panic while holding this lock cannot leave the Vec half-updated.
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn remove<T>(set: &SubscriberSet<T>, id: Uuid) {
    let mut subscribers = lock(set);
    let before = subscribers.len();
    subscribers.retain(|(sid, _)| *sid != id);
    if subscribers.len() != before {
        debug!("Subscriber {} left", id);
    }
}

/// What a subscriber gets when it waits on its queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery<T> {
    Payload(T),
    /// Nothing arrived within the keep-alive window.
    Heartbeat,
    /// The subscription was removed from its channel.
    Closed,
}

/// A subscriber's own queue. Dropping it unsubscribes.
pub struct Subscription<T> {
    id: Uuid,
    receiver: mpsc::UnboundedReceiver<T>,
    registry: Weak<SubscriberSet<T>>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next payload. `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Wait at most `keep_alive` for a payload.
    pub async fn next_or_heartbeat(&mut self, keep_alive: Duration) -> Delivery<T> {
        match tokio::time::timeout(keep_alive, self.receiver.recv()).await {
            Ok(Some(payload)) => Delivery::Payload(payload),
            Ok(None) => Delivery::Closed,
            Err(_) => Delivery::Heartbeat,
        }
    }

    /// Endless stream of payloads, with `None` standing for a heartbeat.
    /// Ends only if the subscription is closed.
    pub fn into_stream(self, keep_alive: Duration) -> impl Stream<Item = Option<T>> + Send
    where
        T: Send + 'static,
    {
        stream::unfold(self, move |mut subscription| async move {
            match subscription.next_or_heartbeat(keep_alive).await {
                Delivery::Payload(payload) => Some((Some(payload), subscription)),
                Delivery::Heartbeat => Some((None, subscription)),
                Delivery::Closed => None,
            }
        })
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            remove(&registry, self.id);
        }
    }
}
