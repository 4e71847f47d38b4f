use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration settings for the application.
///
/// Includes settings for the message broker and for logging.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub log: LogSettings,
}

/// Configuration settings for the broker.
///
/// Controls subscriber buffering, the backpressure wait on publish and the
/// bounds used when stopping subscriber tasks. All durations are milliseconds.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    pub default_capacity: usize,
    pub offer_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub shutdown_timeout_ms: u64,
}

impl BrokerSettings {
    pub fn offer_timeout(&self) -> Duration {
        Duration::from_millis(self.offer_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Configuration settings for logging.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub log: Option<PartialLogSettings>,
}

/// Partial broker settings.
#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub default_capacity: Option<usize>,
    pub offer_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub shutdown_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            default_capacity: 1000,
            offer_timeout_ms: 100,
            poll_interval_ms: 100,
            shutdown_timeout_ms: 1000,
        }
    }
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings::default(),
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}
