//! Subscribers
//!
//! `Subscriber` is the capability the topic needs from a consumer: an id,
//! a non-blocking hand-off for new messages and a way to stop it.
//!
//! `AsyncSubscriber` is the concrete implementation. Each instance owns a
//! bounded `mpsc` buffer and one Tokio task that drains it and runs the user
//! handler. A slow or panicking handler therefore only hurts its own
//! subscriber: publishers wait at most `offer_timeout` for buffer space and
//! then drop the message.
//!
//! Handlers are async closures. A handler that blocks its thread
//! synchronously cannot be interrupted by `shutdown`; the task is aborted
//! once `shutdown_timeout` elapses and the abort takes effect when the
//! handler next yields.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::AbortHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::broker::message::Message;
use crate::config::BrokerSettings;
use crate::utils::{BrokerError, Result};

pub type SubscriberId = String;

/// Something a topic can deliver messages to.
#[async_trait]
pub trait Subscriber<T: Send + Sync + 'static>: Send + Sync {
    fn id(&self) -> &str;

    /// Offer a message. Must return within a bounded time and never fail
    /// back to the publisher.
    async fn on_message(&self, message: Arc<Message<T>>);

    /// Stop accepting and processing messages. Idempotent.
    async fn shutdown(&self);
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberState {
    Active = 0,
    Paused = 1,
    Terminated = 2,
}

impl SubscriberState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SubscriberState::Active,
            1 => SubscriberState::Paused,
            _ => SubscriberState::Terminated,
        }
    }
}

/// Lock-free holder for `SubscriberState`. `Terminated` is absorbing.
#[derive(Debug)]
struct AtomicState(AtomicU8);

impl AtomicState {
    fn new(state: SubscriberState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn load(&self) -> SubscriberState {
        SubscriberState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn transition(&self, from: SubscriberState, to: SubscriberState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns true if this call performed the transition.
    fn terminate(&self) -> bool {
        self.0.swap(SubscriberState::Terminated as u8, Ordering::AcqRel)
            != SubscriberState::Terminated as u8
    }
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    dropped: AtomicU64,
    handler_failures: AtomicU64,
}

/// Point-in-time copy of a subscriber's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubscriberStats {
    /// Messages the handler completed without panicking.
    pub delivered: u64,
    /// Messages dropped because the buffer stayed full or the consumer was gone.
    pub dropped: u64,
    pub handler_failures: u64,
}

/// Timing knobs for an `AsyncSubscriber`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberConfig {
    pub offer_timeout: Duration,
    pub poll_interval: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self::from(&BrokerSettings::default())
    }
}

impl From<&BrokerSettings> for SubscriberConfig {
    fn from(settings: &BrokerSettings) -> Self {
        Self {
            offer_timeout: settings.offer_timeout(),
            poll_interval: settings.poll_interval(),
            shutdown_timeout: settings.shutdown_timeout(),
        }
    }
}

pub struct AsyncSubscriber<T> {
    id: SubscriberId,
    capacity: usize,
    sender: mpsc::Sender<Arc<Message<T>>>,
    state: Arc<AtomicState>,
    stop: Arc<Notify>,
    counters: Arc<Counters>,
    worker: AbortHandle,
    /// Flips to true when the consumption task finishes; the sender is
    /// dropped if the task is aborted or panics.
    exited: watch::Receiver<bool>,
    config: SubscriberConfig,
}

impl<T: Send + Sync + 'static> AsyncSubscriber<T> {
    /// Create a subscriber and start its consumption task.
    ///
    /// Must be called from within a Tokio runtime. Fails with
    /// `InvalidCapacity` when `capacity` is zero.
    pub fn spawn<F, Fut>(
        id: impl Into<SubscriberId>,
        capacity: usize,
        config: SubscriberConfig,
        handler: F,
    ) -> Result<Arc<Self>>
    where
        F: Fn(Arc<Message<T>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if capacity == 0 {
            return Err(BrokerError::InvalidCapacity(capacity));
        }

        let id = id.into();
        let (sender, receiver) = mpsc::channel(capacity);
        let state = Arc::new(AtomicState::new(SubscriberState::Active));
        let stop = Arc::new(Notify::new());
        let counters = Arc::new(Counters::default());
        let (exited_tx, exited) = watch::channel(false);

        let consumer = Consumer {
            receiver,
            handler,
            state: state.clone(),
            stop: stop.clone(),
            counters: counters.clone(),
            poll_interval: config.poll_interval,
            exited: exited_tx,
        };
        let worker = tokio::spawn(
            consumer
                .run()
                .instrument(info_span!("subscriber", id = %id)),
        )
        .abort_handle();

        debug!(subscriber = %id, capacity, "subscriber started");

        Ok(Arc::new(Self {
            id,
            capacity,
            sender,
            state,
            stop,
            counters,
            worker,
            exited,
            config,
        }))
    }

    pub fn state(&self) -> SubscriberState {
        self.state.load()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of messages waiting in the buffer.
    pub fn queue_len(&self) -> usize {
        self.capacity.saturating_sub(self.sender.capacity())
    }

    /// True while the consumption task still holds the buffer.
    pub fn is_consumer_running(&self) -> bool {
        !self.sender.is_closed()
    }

    pub fn stats(&self) -> SubscriberStats {
        SubscriberStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            handler_failures: self.counters.handler_failures.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting messages without stopping the task.
    /// Returns false unless the subscriber was `Active`.
    pub fn pause(&self) -> bool {
        let paused = self
            .state
            .transition(SubscriberState::Active, SubscriberState::Paused);
        if paused {
            info!(subscriber = %self.id, "subscriber paused");
        }
        paused
    }

    /// Returns false unless the subscriber was `Paused`.
    pub fn resume(&self) -> bool {
        let resumed = self
            .state
            .transition(SubscriberState::Paused, SubscriberState::Active);
        if resumed {
            info!(subscriber = %self.id, "subscriber resumed");
        }
        resumed
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Subscriber<T> for AsyncSubscriber<T> {
    fn id(&self) -> &str {
        &self.id
    }

    async fn on_message(&self, message: Arc<Message<T>>) {
        if self.state.load() != SubscriberState::Active {
            return;
        }

        match self.sender.send_timeout(message, self.config.offer_timeout).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(message)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    subscriber = %self.id,
                    message_id = %message.id(),
                    capacity = self.capacity,
                    "subscriber queue full, dropping message"
                );
            }
            Err(SendTimeoutError::Closed(message)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    subscriber = %self.id,
                    message_id = %message.id(),
                    "consumer already stopped, dropping message"
                );
            }
        }
    }

    async fn shutdown(&self) {
        if self.state.terminate() {
            self.stop.notify_one();
            info!(subscriber = %self.id, "subscriber shutting down");
        }

        // every caller waits for the task, not only the one that terminated it
        let mut exited = self.exited.clone();
        let waited = tokio::time::timeout(
            self.config.shutdown_timeout,
            exited.wait_for(|done| *done),
        )
        .await
        .map(|finished| finished.is_ok());
        match waited {
            Ok(true) => debug!(subscriber = %self.id, "consumer stopped"),
            // sender dropped: the task was aborted or unwound
            Ok(false) => debug!(subscriber = %self.id, "consumer task gone"),
            Err(_) => {
                warn!(
                    subscriber = %self.id,
                    timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                    "consumer did not stop in time, aborting"
                );
                self.worker.abort();
            }
        }
    }
}

impl<T> std::fmt::Debug for AsyncSubscriber<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncSubscriber")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("state", &self.state.load())
            .finish()
    }
}

/// The consumption side of an `AsyncSubscriber`, moved into its task.
struct Consumer<T, F> {
    receiver: mpsc::Receiver<Arc<Message<T>>>,
    handler: F,
    state: Arc<AtomicState>,
    stop: Arc<Notify>,
    counters: Arc<Counters>,
    poll_interval: Duration,
    exited: watch::Sender<bool>,
}

impl<T, F, Fut> Consumer<T, F>
where
    T: Send + Sync + 'static,
    F: Fn(Arc<Message<T>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn run(mut self) {
        while self.state.load() != SubscriberState::Terminated {
            let polled = tokio::select! {
                biased;
                _ = self.stop.notified() => break,
                polled = tokio::time::timeout(self.poll_interval, self.receiver.recv()) => polled,
            };

            let message = match polled {
                // nothing arrived, re-check state
                Err(_) => continue,
                Ok(None) => break,
                Ok(Some(message)) => message,
            };

            // paused subscribers discard what was already buffered
            if self.state.load() != SubscriberState::Active {
                continue;
            }

            let message_id = message.id().to_string();
            let handler = &self.handler;
            let guarded = AssertUnwindSafe(async move { handler(message).await }).catch_unwind();

            tokio::select! {
                biased;
                _ = self.stop.notified() => break,
                outcome = guarded => match outcome {
                    Ok(()) => {
                        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(panic) => {
                        self.counters.handler_failures.fetch_add(1, Ordering::Relaxed);
                        error!(
                            message_id = %message_id,
                            "handler panicked: {}",
                            panic_message(panic.as_ref())
                        );
                    }
                },
            }
        }

        // Close before draining so late offers fail fast instead of waiting.
        self.receiver.close();
        let discarded = std::iter::from_fn(|| self.receiver.try_recv().ok()).count();
        debug!(discarded, "consumer exited");
        self.exited.send_replace(true);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
