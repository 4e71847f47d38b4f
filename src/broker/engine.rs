//! Broker engine
//!
//! This module contains the in-memory broker implementation responsible for:
//! - managing the topic registry (atomic get-or-create and remove)
//! - creating subscribers and attaching them to topics
//! - building messages and handing them to topics for fan-out
//! - ordered teardown of topics and their subscriber tasks
//!
//! Concurrency and usage notes:
//! - `Broker` is meant to be shared as `Arc<Broker<T>>`. Every method takes
//!   `&self`; there is no broker-wide lock on the publish path.
//! - The registry is a `DashMap`, so concurrent `create_topic` calls for the
//!   same name all receive the single topic instance that won the insert.
//! - `subscribe` spawns a Tokio task and must run inside a runtime.
//! - `shutdown` is terminal: once it starts, `create_topic` fails with
//!   `BrokerClosed` and the registry is drained until empty.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info, warn};

use crate::broker::message::{Message, Priority};
use crate::broker::subscriber::{AsyncSubscriber, Subscriber, SubscriberConfig};
use crate::broker::topic::{SharedSubscriber, Topic};
use crate::config::BrokerSettings;
use crate::utils::{BrokerError, Result};

pub struct Broker<T: Send + Sync + 'static> {
    topics: DashMap<String, Arc<Topic<T>>>,
    settings: BrokerSettings,
    closed: AtomicBool,
}

impl<T: Send + Sync + 'static> Default for Broker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> Broker<T> {
    pub fn new() -> Self {
        Self::with_settings(BrokerSettings::default())
    }

    pub fn with_settings(settings: BrokerSettings) -> Self {
        Self {
            topics: DashMap::new(),
            settings,
            closed: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    /// True once `shutdown` has started.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Return the topic registered under `name`, creating it if needed.
    /// Repeated calls return the same instance unchanged.
    pub fn create_topic(&self, name: &str) -> Result<Arc<Topic<T>>> {
        let entry = self.topics.entry(name.to_string());

        // checked while the shard lock is held, so shutdown's drain sees any
        // topic inserted by a caller that got past this point
        if self.is_closed() {
            return Err(BrokerError::BrokerClosed);
        }

        let topic = match entry {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                info!(topic = %name, "topic created");
                vacant.insert(Arc::new(Topic::new(name))).clone()
            }
        };
        Ok(topic)
    }

    pub fn get_topic(&self, name: &str) -> Option<Arc<Topic<T>>> {
        self.topics.get(name).map(|entry| entry.value().clone())
    }

    /// Remove the topic and tear it down. No-op if `name` is unknown.
    pub async fn delete_topic(&self, name: &str) {
        if let Some((_, topic)) = self.topics.remove(name) {
            topic.deactivate().await;
            info!(topic = %name, "topic deleted");
        }
    }

    /// Create a subscriber with its own buffer of `capacity` messages and
    /// attach it to `topic`.
    pub async fn subscribe<F, Fut>(
        &self,
        topic: &str,
        subscriber_id: &str,
        capacity: usize,
        handler: F,
    ) -> Result<Arc<AsyncSubscriber<T>>>
    where
        F: Fn(Arc<Message<T>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let target = self
            .get_topic(topic)
            .filter(|t| t.is_active())
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?;

        let subscriber = AsyncSubscriber::spawn(
            subscriber_id,
            capacity,
            SubscriberConfig::from(&self.settings),
            handler,
        )?;

        if !target.add_subscriber(subscriber.clone()) {
            // lost a race with delete_topic/shutdown
            warn!(topic = %topic, subscriber = %subscriber_id, "topic deactivated during subscribe");
            subscriber.shutdown().await;
            return Err(BrokerError::UnknownTopic(topic.to_string()));
        }

        info!(topic = %topic, subscriber = %subscriber_id, capacity, "subscribed");
        Ok(subscriber)
    }

    /// `subscribe` using the configured default buffer capacity.
    pub async fn subscribe_with_default_capacity<F, Fut>(
        &self,
        topic: &str,
        subscriber_id: &str,
        handler: F,
    ) -> Result<Arc<AsyncSubscriber<T>>>
    where
        F: Fn(Arc<Message<T>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.subscribe(topic, subscriber_id, self.settings.default_capacity, handler)
            .await
    }

    /// Detach `subscriber` from `topic` and shut it down.
    pub async fn unsubscribe(&self, topic: &str, subscriber: SharedSubscriber<T>) {
        if let Some(t) = self.get_topic(topic) {
            t.remove_subscriber(&subscriber);
        }
        subscriber.shutdown().await;
        info!(topic = %topic, subscriber = %subscriber.id(), "unsubscribed");
    }

    pub async fn publish(&self, topic: &str, payload: T) -> Result<()> {
        self.publish_with_priority(topic, payload, Priority::Normal)
            .await
    }

    pub async fn publish_with_priority(
        &self,
        topic: &str,
        payload: T,
        priority: Priority,
    ) -> Result<()> {
        // clone the Arc so no map shard lock is held across the await
        let target = self
            .get_topic(topic)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?;

        let message = Arc::new(Message::with_priority(topic, payload, priority));
        debug!(topic = %topic, message_id = %message.id(), ?priority, "publishing");
        target.publish(message).await
    }

    /// Names of the topics registered right now.
    pub fn topic_names(&self) -> Vec<String> {
        self.topics.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.get_topic(topic)
            .map(|t| t.subscriber_count())
            .unwrap_or(0)
    }

    /// Deactivate every topic and empty the registry. Terminal: no topic
    /// can be created afterwards.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        info!(topics = self.topics.len(), "broker shutting down");

        loop {
            let names = self.topic_names();
            if names.is_empty() {
                break;
            }
            for name in names {
                if let Some((_, topic)) = self.topics.remove(&name) {
                    topic.deactivate().await;
                }
            }
        }
        info!("broker shut down");
    }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for Broker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("topics", &self.topic_names())
            .field("settings", &self.settings)
            .finish()
    }
}
