//! Driver factory for configuration-driven setup

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::domain::cache::{CacheDriver, Clock, DriverConfig, SystemClock, Ttl};
use crate::domain::DomainError;

use super::file::FileDriver;
use super::map::MapDriver;
use super::redis::RedisDriver;
use super::registry::CacheRegistry;
use super::rest::{RestKvConfig, RestKvDriver};

/// Driver kinds that can be built from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum DriverType {
    /// In-process map
    #[default]
    Map,
    /// JSON file on disk
    File,
    /// Redis over its native protocol
    Redis,
    /// Redis-compatible store over HTTP
    Rest,
}

impl std::fmt::Display for DriverType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverType::Map => write!(f, "map"),
            DriverType::File => write!(f, "file"),
            DriverType::Redis => write!(f, "redis"),
            DriverType::Rest => write!(f, "rest"),
        }
    }
}

impl std::str::FromStr for DriverType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "map" | "memory" | "in_memory" => Ok(DriverType::Map),
            "file" | "json" => Ok(DriverType::File),
            "redis" => Ok(DriverType::Redis),
            "rest" | "upstash" | "kv" => Ok(DriverType::Rest),
            _ => Err(DomainError::configuration(format!(
                "Unknown cache driver type: {}. Valid types: map, file, redis, rest",
                s
            ))),
        }
    }
}

impl TryFrom<String> for DriverType {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Settings for one named driver (`cache.drivers.<name>`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriverSettings {
    #[serde(rename = "type", default)]
    pub driver_type: DriverType,
    /// Key namespace
    #[serde(default)]
    pub prefix: String,
    /// Lifetime applied to writes without an explicit expiration
    pub ttl_secs: Option<u64>,
    /// File path (file driver)
    pub path: Option<PathBuf>,
    /// Connection URL (redis and rest drivers)
    pub url: Option<String>,
    /// Bearer token (rest driver)
    pub token: Option<String>,
}

impl DriverSettings {
    pub fn new(driver_type: DriverType) -> Self {
        Self {
            driver_type,
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = Some(ttl_secs);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// The `cache` configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Name of the driver used when none is requested
    #[serde(default = "default_driver_name")]
    pub default: String,
    #[serde(default)]
    pub drivers: HashMap<String, DriverSettings>,
}

fn default_driver_name() -> String {
    "memory".to_string()
}

impl Default for CacheSettings {
    fn default() -> Self {
        let mut drivers = HashMap::new();
        drivers.insert(default_driver_name(), DriverSettings::default());

        Self {
            default: default_driver_name(),
            drivers,
        }
    }
}

/// Builds drivers and registries from settings
#[derive(Debug, Clone)]
pub struct DriverFactory {
    clock: Arc<dyn Clock>,
}

impl Default for DriverFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverFactory {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
        }
    }

    /// Uses the given clock for every driver built by this factory
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn driver_config(
        &self,
        name: &str,
        settings: &DriverSettings,
    ) -> Result<DriverConfig, DomainError> {
        if let Some(ttl_secs) = settings.ttl_secs {
            let reachable = Ttl::lifetime(ttl_secs)
                .and_then(|lifetime| self.clock.now().checked_add_signed(lifetime))
                .is_some();

            if !reachable {
                return Err(DomainError::configuration(format!(
                    "Cache driver [{}] has an out of range ttl_secs: {}",
                    name, ttl_secs
                )));
            }
        }

        Ok(DriverConfig::default()
            .with_prefix(settings.prefix.clone())
            .with_ttl(Ttl::from(settings.ttl_secs))
            .with_clock(self.clock.clone()))
    }

    /// Creates one driver
    pub async fn create(
        &self,
        name: &str,
        settings: &DriverSettings,
    ) -> Result<Arc<dyn CacheDriver>, DomainError> {
        let config = self.driver_config(name, settings)?;

        match settings.driver_type {
            DriverType::Map => Ok(Arc::new(MapDriver::with_config(config))),
            DriverType::File => {
                let path = settings.path.clone().ok_or_else(|| {
                    DomainError::configuration(format!(
                        "Cache driver [{}] requires a path for the file type",
                        name
                    ))
                })?;

                Ok(Arc::new(FileDriver::new(path, config).await?))
            }
            DriverType::Redis => {
                let url = settings.url.as_deref().ok_or_else(|| {
                    DomainError::configuration(format!(
                        "Cache driver [{}] requires a url for the redis type",
                        name
                    ))
                })?;

                Ok(Arc::new(RedisDriver::connect(url, config).await?))
            }
            DriverType::Rest => {
                let (Some(url), Some(token)) = (&settings.url, &settings.token) else {
                    return Err(DomainError::configuration(format!(
                        "Cache driver [{}] requires a url and token for the rest type",
                        name
                    )));
                };

                let endpoint = RestKvConfig::new(url.clone(), token.clone());
                Ok(Arc::new(RestKvDriver::new(endpoint, config)?))
            }
        }
    }

    /// Creates every configured driver and registers them under their names
    pub async fn create_registry(
        &self,
        settings: &CacheSettings,
    ) -> Result<CacheRegistry, DomainError> {
        let mut builder = CacheRegistry::builder().default_driver(settings.default.clone());

        for (name, driver_settings) in &settings.drivers {
            let driver = self.create(name, driver_settings).await?;
            info!(driver = %name, driver_type = %driver_settings.driver_type, "Cache driver ready");
            builder = builder.driver(name.clone(), driver);
        }

        builder.build()
    }
}
