//! Message definitions for the broker
//!
//! `Message` is the immutable value handed to every subscriber of a topic.
//! The broker wraps each message in an `Arc` once at publish time, so all
//! subscribers share the same allocation.
//!
//! Notes on fields:
//! - `id`: UUIDv4 assigned on construction
//! - `topic`: topic name used for routing
//! - `payload`: opaque value supplied by the publisher
//! - `created_at`: milliseconds since UNIX epoch
//! - `priority`: advisory priority; delivery order is FIFO regardless

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message<T> {
    id: String,
    topic: String,
    payload: T,
    created_at: i64,
    priority: Priority,
}

impl<T> Message<T> {
    /// Create a message with `Priority::Normal`.
    pub fn new(topic: impl Into<String>, payload: T) -> Self {
        Self::with_priority(topic, payload, Priority::Normal)
    }

    pub fn with_priority(topic: impl Into<String>, payload: T, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            payload,
            created_at: chrono::Utc::now().timestamp_millis(),
            priority,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }
}
