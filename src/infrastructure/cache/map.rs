//! In-memory map driver using moka

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache as MokaCache;
use serde_json::Value;
use tracing::debug;

use crate::domain::cache::{CacheDriver, Cached, DriverApi, DriverConfig};
use crate::domain::DomainError;

/// In-process cache driver
///
/// The underlying moka cache is unbounded and has no eviction policy of its own;
/// expiration is checked lazily on read.
#[derive(Debug, Clone)]
pub struct MapDriver {
    store: MokaCache<String, Cached>,
    config: DriverConfig,
}

impl MapDriver {
    /// Creates a driver with default configuration
    pub fn new() -> Self {
        Self::with_config(DriverConfig::default())
    }

    pub fn with_config(config: DriverConfig) -> Self {
        Self::with_store(MokaCache::builder().build(), config)
    }

    /// Wraps an existing moka cache
    pub fn with_store(store: MokaCache<String, Cached>, config: DriverConfig) -> Self {
        Self { store, config }
    }

    /// Number of stored entries, expired ones included until they are read
    pub async fn len(&self) -> u64 {
        self.store.run_pending_tasks().await;
        self.store.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MapDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverApi for MapDriver {
    type Store = MokaCache<String, Cached>;

    fn api(&self) -> &Self::Store {
        &self.store
    }
}

#[async_trait]
impl CacheDriver for MapDriver {
    fn config(&self) -> &DriverConfig {
        &self.config
    }

    async fn get_value(&self, key: &str) -> Result<Option<Value>, DomainError> {
        let key = self.key(key);

        match self.store.get(&key).await {
            Some(cached) if self.config.is_expired(cached.expires) => {
                debug!(key = %key, "Removing expired entry");
                self.store.invalidate(&key).await;
                Ok(None)
            }
            Some(cached) => Ok(Some(cached.value)),
            None => Ok(None),
        }
    }

    async fn put_value(
        &self,
        key: &str,
        value: Value,
        expires: Option<DateTime<Utc>>,
    ) -> Result<Value, DomainError> {
        let cached = Cached::new(key, value.clone(), self.expires(expires));

        self.store.insert(self.key(key), cached).await;
        Ok(value)
    }

    async fn remove(&self, key: &str) -> Result<(), DomainError> {
        self.store.invalidate(&self.key(key)).await;
        Ok(())
    }

    async fn flush(&self) -> Result<(), DomainError> {
        self.store.invalidate_all();
        self.store.run_pending_tasks().await;
        Ok(())
    }
}
