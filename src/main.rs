//! CLI for subcast
//!
//! Subcommands:
//! - `demo`: run the "orders" walkthrough (slow and fast subscriber side by side)
//! - `config`: print the effective configuration

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use subcast::broker::{Broker, Message, Subscriber};
use subcast::config::{Settings, load_config};
use subcast::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "subcast")]
enum Command {
    /// Publish a burst of orders to one slow and one fast subscriber
    Demo {
        /// Number of messages to publish
        #[arg(long, default_value_t = 5)]
        count: usize,
        /// Buffer capacity of the slow subscriber
        #[arg(long, default_value_t = 2)]
        slow_capacity: usize,
        /// Time the slow subscriber spends on each message, in milliseconds
        #[arg(long, default_value_t = 1000)]
        slow_delay_ms: u64,
    },
    /// Print the effective configuration as JSON
    Config,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration, using defaults: {e}");
            Settings::default()
        }
    };
    logging::init(&settings.log.level);

    let cmd = Command::parse();

    let outcome = match cmd {
        Command::Demo {
            count,
            slow_capacity,
            slow_delay_ms,
        } => run_demo(settings, count, slow_capacity, slow_delay_ms).await,
        Command::Config => print_config(&settings),
    };

    if let Err(e) = outcome {
        error!("subcast failed: {}", e);
    }
}

async fn run_demo(
    settings: Settings,
    count: usize,
    slow_capacity: usize,
    slow_delay_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let broker = Broker::<String>::with_settings(settings.broker);
    broker.create_topic("orders")?;

    let delay = Duration::from_millis(slow_delay_ms);
    let slow = broker
        .subscribe("orders", "slow", slow_capacity, move |msg: Arc<Message<String>>| async move {
            tokio::time::sleep(delay).await;
            info!(subscriber = "slow", payload = %msg.payload(), "handled");
        })
        .await?;

    let fast = broker
        .subscribe("orders", "fast", 10, |msg: Arc<Message<String>>| async move {
            info!(subscriber = "fast", payload = %msg.payload(), "handled");
        })
        .await?;

    for i in 1..=count {
        broker.publish("orders", format!("order-{i}")).await?;
    }

    // give the slow subscriber time to work through its buffer
    tokio::time::sleep(delay * (slow_capacity as u32 + 1)).await;

    for sub in [&slow, &fast] {
        let stats = sub.stats();
        info!(
            subscriber = %sub.id(),
            delivered = stats.delivered,
            dropped = stats.dropped,
            failures = stats.handler_failures,
            "subscriber summary"
        );
    }

    broker.shutdown().await;
    Ok(())
}

fn print_config(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}
