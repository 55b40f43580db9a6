//! In-process publish/subscribe for monitor events.
//!
//! Each topic carries one fixed payload type and fans out to every
//! subscriber over its own unbounded queue: publishing never blocks and
//! never waits on consumers, slow subscribers only grow their own queue,
//! and a topic with no subscribers drops events silently. Subscribers only
//! receive events published after they attached; there is no replay.

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// A named event channel with a fixed payload type.
///
/// `publish` and `subscribe` are safe from any task. Each subscriber sees
/// payloads strictly in publish order; there is no ordering guarantee
/// across subscribers or across topics.
pub struct Topic<T> {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T: Clone> Topic<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a new independent subscriber.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        Subscription { rx }
    }

    /// Deliver `payload` to every current subscriber, in registration order.
    ///
    /// Subscribers whose receiving half has been dropped are pruned here.
    pub fn publish(&self, payload: T) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(payload.clone()).is_ok());
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<T: Clone> Default for Topic<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of one subscription: a lazy, unbounded, in-order stream of
/// payloads. Dropping it detaches the subscriber.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Wait for the next event. Returns `None` only if the topic itself has
    /// been dropped.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Drain a single already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

/// The topics the monitor publishes.
#[derive(Default)]
pub struct EventBus {
    /// Observed player count changed; payload is the new count. Emitted once
    /// per distinct change, and once per shutdown-sequence start with 0.
    pub player_count_changed: Topic<usize>,
    /// The idle shutdown committed: save and shutdown were issued.
    pub auto_shutdown: Topic<()>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }
}
