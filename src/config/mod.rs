//! Configuration loading.
//!
//! Settings are layered: built-in defaults, then an optional
//! `config/default.{toml,yaml,json}` file, then environment variables
//! prefixed with `SUBCAST_` using `__` between path segments
//! (`SUBCAST_BROKER__DEFAULT_CAPACITY`, `SUBCAST_LOG__LEVEL`, ...).

mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{BrokerSettings, LogSettings, Settings};

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct containing the broker and logging configurations
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("SUBCAST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(merge_with_defaults(partial))
}

fn merge_with_defaults(partial: PartialSettings) -> Settings {
    let default = Settings::default();
    let broker = partial.broker.as_ref();

    Settings {
        broker: BrokerSettings {
            default_capacity: broker
                .and_then(|b| b.default_capacity)
                .unwrap_or(default.broker.default_capacity),
            offer_timeout_ms: broker
                .and_then(|b| b.offer_timeout_ms)
                .unwrap_or(default.broker.offer_timeout_ms),
            poll_interval_ms: broker
                .and_then(|b| b.poll_interval_ms)
                .unwrap_or(default.broker.poll_interval_ms),
            shutdown_timeout_ms: broker
                .and_then(|b| b.shutdown_timeout_ms)
                .unwrap_or(default.broker.shutdown_timeout_ms),
        },
        log: LogSettings {
            level: partial
                .log
                .and_then(|l| l.level)
                .unwrap_or(default.log.level),
        },
    }
}

#[cfg(test)]
mod tests;
