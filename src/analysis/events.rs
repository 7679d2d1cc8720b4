//! Event system for recognition results
//!
//! Subscribers register a callback or take a channel receiver. Every event
//! is delivered to every subscriber; a subscriber that panics is logged and
//! skipped without affecting the others or the pipeline.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, trace};

use crate::shared::RecognitionEvent;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&RecognitionEvent) + Send + Sync>;

enum Subscriber {
    Callback(Callback),
    Channel(Sender<RecognitionEvent>),
}

/// Event emitter for broadcasting recognition events
pub struct EventBus {
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber)>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn add(&self, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, subscriber));
        id
    }

    /// Register a callback invoked for every event
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&RecognitionEvent) + Send + Sync + 'static,
    {
        self.add(Subscriber::Callback(Arc::new(callback)))
    }

    /// Receive events through a channel
    ///
    /// The subscription is removed once the receiver is dropped.
    pub fn subscribe_channel(&self) -> Receiver<RecognitionEvent> {
        let (tx, rx) = unbounded();
        self.add(Subscriber::Channel(tx));
        rx
    }

    /// Remove a subscription; returns false if it did not exist
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: RecognitionEvent) {
        trace!("Emitting {}", event.name());

        // Callbacks run without holding the lock so they may subscribe or unsubscribe
        let mut callbacks: Vec<(SubscriptionId, Callback)> = Vec::new();
        let mut disconnected = Vec::new();
        {
            let subscribers = self.subscribers.read();
            for (id, subscriber) in subscribers.iter() {
                match subscriber {
                    Subscriber::Callback(cb) => callbacks.push((*id, cb.clone())),
                    Subscriber::Channel(tx) => {
                        if tx.send(event.clone()).is_err() {
                            disconnected.push(*id);
                        }
                    }
                }
            }
        }

        for (id, callback) in callbacks {
            let result = catch_unwind(AssertUnwindSafe(|| callback(&event)));
            if result.is_err() {
                error!(
                    "Subscriber {:?} panicked while handling {}; continuing",
                    id,
                    event.name()
                );
            }
        }

        if !disconnected.is_empty() {
            self.subscribers
                .write()
                .retain(|(id, _)| !disconnected.contains(id));
        }
    }

    /// Number of active subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn clear(&self) {
        self.subscribers.write().clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
