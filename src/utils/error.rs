//! The `error` module defines the error types surfaced by the broker.
//!
//! Only lookup and configuration problems are caller-visible. Faults on the
//! delivery path (full buffers, panicking handlers, slow shutdowns) are
//! contained inside the broker and reported through `tracing` instead.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// No active topic is registered under this name.
    #[error("topic '{0}' does not exist or is inactive")]
    UnknownTopic(String),

    /// The topic is being torn down and no longer accepts publishes.
    #[error("cannot publish to inactive topic '{0}'")]
    InactiveTopic(String),

    #[error("subscriber buffer capacity must be at least 1 (got {0})")]
    InvalidCapacity(usize),

    /// The broker has been shut down and accepts no new topics.
    #[error("broker is shut down")]
    BrokerClosed,
}

pub type Result<T> = std::result::Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            BrokerError::UnknownTopic("orders".into()).to_string(),
            "topic 'orders' does not exist or is inactive"
        );
        assert_eq!(
            BrokerError::InactiveTopic("orders".into()).to_string(),
            "cannot publish to inactive topic 'orders'"
        );
        assert_eq!(
            BrokerError::InvalidCapacity(0).to_string(),
            "subscriber buffer capacity must be at least 1 (got 0)"
        );
        assert_eq!(BrokerError::BrokerClosed.to_string(), "broker is shut down");
    }
}
