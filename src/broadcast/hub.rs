//! Broadcast hub
//!
//! ```text
//! publish(msg)
//!     │  lock: snapshot senders, unlock
//!     ├──► try_send ──► [queue 1] ──► subscriber 1
//!     ├──► try_send ──► [queue 2] ──► subscriber 2
//!     └──► try_send ──► [queue N] ──► subscriber N
//!             │
//!             └── closed or full: removed under the lock, queue closes
//! ```
//!
//! Removing an entry drops the hub's sender, which is what closes the
//! subscriber's queue. A subscriber that failed once is never retried.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use uuid::Uuid;

/// Messages buffered per subscriber by default
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Unique subscriber identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

/// Receiving end of a subscription
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<String>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next message; `None` once the hub has dropped this subscriber
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<String, TryRecvError> {
        self.receiver.try_recv()
    }
}

/// Fan-out of status messages to a dynamic set of subscribers
pub struct BroadcastHub {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<String>>>,
    queue_capacity: usize,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a hub whose subscribers buffer up to `queue_capacity` messages
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriberId::new();
        let (tx, receiver) = mpsc::channel(self.queue_capacity);

        let count = {
            let mut subscribers = self.subscribers.lock();
            subscribers.insert(id, tx);
            subscribers.len()
        };

        tracing::info!("Subscriber {} added ({} connected)", id, count);
        Subscription { id, receiver }
    }

    /// Remove a subscriber; returns false if it was already gone
    pub fn unsubscribe(&self, id: &SubscriberId) -> bool {
        let removed = self.subscribers.lock().remove(id).is_some();
        if removed {
            tracing::info!("Subscriber {} removed", id);
        }
        removed
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Deliver `message` to every subscriber registered at call time
    ///
    /// Subscribers whose queue is closed or full are removed. Returns the
    /// number of subscribers the message was queued for.
    pub fn publish(&self, message: &str) -> usize {
        let snapshot: Vec<(SubscriberId, mpsc::Sender<String>)> = self
            .subscribers
            .lock()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut failed = Vec::new();

        for (id, tx) in snapshot {
            match tx.try_send(message.to_owned()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("Subscriber {} is not keeping up, dropping it", id);
                    failed.push(id);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!("Subscriber {} disconnected", id);
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.subscribers.lock();
            for id in &failed {
                subscribers.remove(id);
            }
        }

        tracing::debug!(
            "Broadcast delivered to {} subscriber(s), {} dropped",
            delivered,
            failed.len()
        );
        delivered
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
