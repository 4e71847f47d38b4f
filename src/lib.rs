//! # subcast
//!
//! `subcast` is an in-process publish/subscribe broker built on Tokio.
//! Every subscriber owns a bounded buffer and a dedicated task, so a slow or
//! faulty consumer only affects itself: publishers wait a short, bounded time
//! for buffer space and otherwise drop the message and log it.
//!
//! ## Core Modules
//!
//! - `broker`: messages, subscribers, topics and the `Broker` registry.
//! - `config`: loading broker and logging settings from file and environment.
//! - `utils`: the error type and logging bootstrap.
//!
//! Delivery is best-effort, at-most-once and FIFO per subscriber.

pub mod broker;
pub mod config;
pub mod utils;

pub use broker::{Broker, Message, Priority};
pub use utils::{BrokerError, Result};

#[cfg(test)]
mod tests;
