//! Topic management
//!
//! A `Topic` holds the live subscribers for one topic name. The set is stored
//! copy-on-write: every add/remove swaps in a fresh `Arc<Vec<_>>`, so
//! `publish` clones one `Arc` and iterates a stable snapshot while
//! subscriptions keep changing.
//!
//! Subscriber identity is the instance, not its id string: adding the same
//! `Arc` twice is a no-op, while two distinct subscribers may share an id.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::join_all;
use tracing::{debug, info};

use crate::broker::message::Message;
use crate::broker::subscriber::Subscriber;
use crate::utils::{BrokerError, Result};

pub type SharedSubscriber<T> = Arc<dyn Subscriber<T>>;

type Snapshot<T> = Arc<Vec<SharedSubscriber<T>>>;

pub struct Topic<T: Send + Sync + 'static> {
    name: String,
    subscribers: RwLock<Snapshot<T>>,
    active: AtomicBool,
}

impl<T: Send + Sync + 'static> Topic<T> {
    /// Create a new, active topic with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: RwLock::new(Arc::new(Vec::new())),
            active: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.snapshot().len()
    }

    pub fn subscriber_ids(&self) -> Vec<String> {
        self.snapshot().iter().map(|s| s.id().to_string()).collect()
    }

    /// Add a subscriber. Returns false if the topic is inactive; adding an
    /// instance that is already present succeeds without duplicating it.
    pub fn add_subscriber(&self, subscriber: SharedSubscriber<T>) -> bool {
        let mut guard = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        // checked under the write lock so deactivate() cannot interleave
        if !self.is_active() {
            return false;
        }
        if guard.iter().any(|s| same_subscriber(s, &subscriber)) {
            return true;
        }

        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        debug!(topic = %self.name, subscriber = %subscriber.id(), "subscriber added");
        next.push(subscriber);
        *guard = Arc::new(next);
        true
    }

    /// Remove a subscriber. The caller decides whether to shut it down.
    pub fn remove_subscriber(&self, subscriber: &SharedSubscriber<T>) -> bool {
        let mut guard = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if !guard.iter().any(|s| same_subscriber(s, subscriber)) {
            return false;
        }

        let next: Vec<_> = guard
            .iter()
            .filter(|s| !same_subscriber(s, subscriber))
            .cloned()
            .collect();
        *guard = Arc::new(next);
        debug!(topic = %self.name, subscriber = %subscriber.id(), "subscriber removed");
        true
    }

    /// Offer `message` to every subscriber present when the call starts.
    ///
    /// Offers run concurrently, so one full buffer costs siblings nothing.
    /// Returns once every subscriber in the snapshot has been offered the
    /// message, not once they have processed it.
    pub async fn publish(&self, message: Arc<Message<T>>) -> Result<()> {
        if !self.is_active() {
            return Err(BrokerError::InactiveTopic(self.name.clone()));
        }

        let snapshot = self.snapshot();
        join_all(snapshot.iter().map(|s| s.on_message(message.clone()))).await;
        Ok(())
    }

    /// Stop accepting publishes, then shut down and forget every subscriber.
    /// A deactivated topic cannot be reactivated.
    pub async fn deactivate(&self) {
        self.active.store(false, Ordering::Release);

        let removed = {
            let mut guard = self
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, Arc::new(Vec::new()))
        };

        join_all(removed.iter().map(|s| s.shutdown())).await;
        info!(topic = %self.name, subscribers = removed.len(), "topic deactivated");
    }

    fn snapshot(&self) -> Snapshot<T> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("active", &self.is_active())
            .field("subscribers", &self.subscriber_ids())
            .finish()
    }
}

fn same_subscriber<T: Send + Sync + 'static>(
    a: &SharedSubscriber<T>,
    b: &SharedSubscriber<T>,
) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
