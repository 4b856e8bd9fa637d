//! Command line interface
//!
//! Runs one cache operation against a configured driver:
//! - `get`, `put`, `has`, `remove`, `flush`
//! - `increment`, `decrement`

use std::sync::Arc;

use anyhow::Context;
use chrono::{TimeDelta, Utc};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::debug;

use crate::config::AppConfig;
use crate::domain::cache::{CacheDriver, CacheDriverExt};
use crate::infrastructure::cache::DriverFactory;
use crate::infrastructure::logging;

/// Cache Manager - key/value caching over interchangeable stores
#[derive(Debug, Parser)]
#[command(name = "cache-manager")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Base configuration file (defaults to config/default)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Named driver from `cache.drivers` (defaults to `cache.default`)
    #[arg(long, short, global = true)]
    pub driver: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a cached value as JSON
    Get { key: String },

    /// Cache a value. Input that isn't JSON is stored as a string.
    Put {
        key: String,
        value: String,
        /// Seconds until the entry expires (overrides the driver's TTL)
        #[arg(long)]
        expires_in: Option<i64>,
    },

    /// Print whether a value is cached
    Has { key: String },

    /// Remove a cached value
    Remove { key: String },

    /// Remove every cached value
    Flush,

    /// Add to a cached counter
    Increment {
        key: String,
        #[arg(long, default_value_t = 1)]
        by: i64,
    },

    /// Subtract from a cached counter
    Decrement {
        key: String,
        #[arg(long, default_value_t = 1)]
        by: i64,
    },
}

/// Loads configuration, resolves the driver and runs the command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;

    logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    let registry = DriverFactory::new()
        .create_registry(&config.cache)
        .await
        .context("Failed to build cache drivers")?;

    let driver = registry.resolve(cli.driver.as_deref())?;
    debug!(driver = ?driver, "Resolved cache driver");

    let output = execute(driver, cli.command).await?;
    println!("{}", output);

    Ok(())
}

/// Runs one command and renders its result
pub async fn execute(driver: Arc<dyn CacheDriver>, command: Command) -> anyhow::Result<String> {
    let output = match command {
        Command::Get { key } => {
            let value: Option<Value> = driver.get(&key).await?;
            render(&value.unwrap_or(Value::Null))?
        }
        Command::Put {
            key,
            value,
            expires_in,
        } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            let expires = match expires_in {
                Some(secs) => Some(
                    TimeDelta::try_seconds(secs)
                        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                        .with_context(|| format!("--expires-in {} is out of range", secs))?,
                ),
                None => None,
            };

            render(&driver.put(&key, value, expires).await?)?
        }
        Command::Has { key } => driver.has(&key).await?.to_string(),
        Command::Remove { key } => {
            driver.remove(&key).await?;
            "OK".to_string()
        }
        Command::Flush => {
            driver.flush().await?;
            "OK".to_string()
        }
        Command::Increment { key, by } => driver.increment(&key, by).await?.to_string(),
        Command::Decrement { key, by } => driver.decrement(&key, by).await?.to_string(),
    };

    Ok(output)
}

fn render(value: &Value) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
