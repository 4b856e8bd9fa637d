//! Web-Storage style driver (string items, one JSON entry per key)

use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use super::map::MapDriver;
use crate::domain::cache::{CacheDriver, Cached, DriverApi, DriverConfig};
use crate::domain::DomainError;

/// String key-value storage with the shape of the Web Storage API
#[cfg_attr(test, automock)]
pub trait WebStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;

    /// Fails when the storage refuses the write (e.g. quota exceeded)
    fn set_item(&self, key: &str, value: &str) -> Result<(), DomainError>;

    fn remove_item(&self, key: &str);

    fn clear(&self);

    /// Every item key currently stored
    fn keys(&self) -> Vec<String>;
}

/// In-process `WebStorage`, items kept in key order
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WebStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), DomainError> {
        self.items
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        self.items
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    fn clear(&self) {
        self.items.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn keys(&self) -> Vec<String> {
        self.items
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

/// Driver over a `WebStorage`, optionally fronted by an in-memory layer
pub struct StorageDriver<S: WebStorage = MemoryStorage> {
    store: S,
    config: DriverConfig,
    memory: Option<MapDriver>,
}

impl<S: WebStorage> fmt::Debug for StorageDriver<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageDriver")
            .field("config", &self.config)
            .field("store", &"<WebStorage>")
            .field("memory", &self.memory.is_some())
            .finish()
    }
}

impl<S: WebStorage> StorageDriver<S> {
    pub fn new(store: S, config: DriverConfig) -> Self {
        Self {
            store,
            config,
            memory: None,
        }
    }

    /// Keeps decoded values in an in-memory layer sharing this driver's config
    pub fn with_memory(mut self) -> Self {
        self.memory = Some(MapDriver::with_config(self.config.clone()));
        self
    }

    /// Removes every expired item under this driver's prefix, returning the count.
    ///
    /// Items that are not cache entries are left untouched.
    pub async fn prune(&self) -> Result<usize, DomainError> {
        let namespace = self.key("");
        let mut pruned = 0;

        for item_key in self.store.keys() {
            if !item_key.starts_with(&namespace) {
                continue;
            }

            if self.remove_if_expired(&item_key).await? {
                pruned += 1;
            }
        }

        Ok(pruned)
    }

    /// Looks at up to `count` expiring items whose raw key starts with `prefix`
    /// and removes the ones that have expired, returning how many were removed.
    pub async fn pop_by_prefix(&self, prefix: &str, count: usize) -> Result<usize, DomainError> {
        let candidates: Vec<String> = self
            .store
            .keys()
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| {
                self.decode(key)
                    .is_some_and(|cached| cached.expires.is_some())
            })
            .take(count)
            .collect();

        let mut popped = 0;

        for item_key in candidates {
            if self.remove_if_expired(&item_key).await? {
                popped += 1;
            }
        }

        Ok(popped)
    }

    fn decode(&self, item_key: &str) -> Option<Cached> {
        let raw = self.store.get_item(item_key)?;

        match serde_json::from_str(&raw) {
            Ok(cached) => Some(cached),
            Err(e) => {
                debug!(key = %item_key, error = %e, "Unreadable storage item");
                None
            }
        }
    }

    async fn remove_if_expired(&self, item_key: &str) -> Result<bool, DomainError> {
        match self.decode(item_key) {
            Some(cached) if self.config.is_expired(cached.expires) => {
                self.store.remove_item(item_key);

                if let Some(memory) = &self.memory {
                    memory.remove(&cached.key).await?;
                }

                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Reads the live entry for an unprefixed key, removing it if expired
    async fn read(&self, key: &str) -> Result<Option<Cached>, DomainError> {
        let item_key = self.key(key);

        match self.decode(&item_key) {
            Some(cached) if self.config.is_expired(cached.expires) => {
                debug!(key = %item_key, "Removing expired item");
                self.remove(key).await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }
}

impl<S: WebStorage> DriverApi for StorageDriver<S> {
    type Store = S;

    fn api(&self) -> &Self::Store {
        &self.store
    }
}

#[async_trait]
impl<S: WebStorage> CacheDriver for StorageDriver<S> {
    fn config(&self) -> &DriverConfig {
        &self.config
    }

    async fn get_value(&self, key: &str) -> Result<Option<Value>, DomainError> {
        if let Some(memory) = &self.memory {
            if let Some(value) = memory.get_value(key).await? {
                return Ok(Some(value));
            }
        }

        let Some(cached) = self.read(key).await? else {
            return Ok(None);
        };

        if let Some(memory) = &self.memory {
            memory
                .put_value(key, cached.value.clone(), cached.expires_at())
                .await?;
        }

        Ok(Some(cached.value))
    }

    async fn put_value(
        &self,
        key: &str,
        value: Value,
        expires: Option<DateTime<Utc>>,
    ) -> Result<Value, DomainError> {
        let cached = Cached::new(key, value.clone(), self.expires(expires));
        let data = serde_json::to_string(&cached)?;

        self.store.set_item(&self.key(key), &data)?;

        if let Some(memory) = &self.memory {
            memory
                .put_value(key, value.clone(), cached.expires_at())
                .await?;
        }

        Ok(value)
    }

    async fn remove(&self, key: &str) -> Result<(), DomainError> {
        self.store.remove_item(&self.key(key));

        if let Some(memory) = &self.memory {
            memory.remove(key).await?;
        }

        Ok(())
    }

    async fn flush(&self) -> Result<(), DomainError> {
        self.store.clear();

        if let Some(memory) = &self.memory {
            memory.flush().await?;
        }

        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, DomainError> {
        if let Some(memory) = &self.memory {
            if memory.has(key).await? {
                return Ok(true);
            }
        }

        Ok(self
            .read(key)
            .await?
            .is_some_and(|cached| !cached.value.is_null()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::{CacheDriverExt, Clock, ManualClock};
    use chrono::Duration;
    use serde_json::json;
    use std::sync::Arc;

    fn driver_with_clock(prefix: &str) -> (StorageDriver, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch());
        let config = DriverConfig::default()
            .with_prefix(prefix)
            .with_clock(clock.clone());

        (StorageDriver::new(MemoryStorage::new(), config), clock)
    }

    #[tokio::test]
    async fn test_put_serializes_entry() {
        let (driver, _) = driver_with_clock("app_");

        driver.put("foo", json!({"fizz": true}), None).await.unwrap();

        let raw = driver.api().get_item("app_foo").unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&raw).unwrap(),
            json!({"key": "foo", "value": {"fizz": true}, "expires": null})
        );

        let value: Option<Value> = driver.get("foo").await.unwrap();
        assert_eq!(value, Some(json!({"fizz": true})));
    }

    #[tokio::test]
    async fn test_expired_item_is_removed() {
        let (driver, clock) = driver_with_clock("");

        driver
            .put("foo", "bar", Some(clock.now() + Duration::seconds(30)))
            .await
            .unwrap();
        assert!(driver.has("foo").await.unwrap());

        clock.advance(Duration::seconds(30));

        assert!(!driver.has("foo").await.unwrap());
        assert!(driver.api().get_item("foo").is_none());
    }

    #[tokio::test]
    async fn test_malformed_item_is_miss() {
        let (driver, _) = driver_with_clock("");
        driver.api().set_item("foo", "{broken").unwrap();

        let value = driver.get_or("foo", "fallback".to_string()).await.unwrap();
        assert_eq!(value, "fallback");
        assert!(!driver.has("foo").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_layer_serves_reads() {
        let (driver, _) = driver_with_clock("");
        let driver = driver.with_memory();

        driver.put("foo", "bar", None).await.unwrap();

        // Dropped from storage behind the driver's back, still served from memory
        driver.api().remove_item("foo");

        let value: Option<String> = driver.get("foo").await.unwrap();
        assert_eq!(value, Some("bar".to_string()));
        assert!(driver.has("foo").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_layer_has_respects_expiry() {
        let (driver, clock) = driver_with_clock("");
        let driver = driver.with_memory();

        driver
            .put("foo", "bar", Some(clock.now() + Duration::seconds(5)))
            .await
            .unwrap();
        driver.api().remove_item("foo");
        assert!(driver.has("foo").await.unwrap());

        clock.advance(Duration::seconds(5));
        assert!(!driver.has("foo").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_layer_populated_from_storage() {
        let (driver, _) = driver_with_clock("");
        let driver = driver.with_memory();

        driver
            .api()
            .set_item("foo", r#"{"key":"foo","value":3,"expires":null}"#)
            .unwrap();

        assert_eq!(driver.get_or("foo", 0).await.unwrap(), 3);

        driver.api().clear();
        assert_eq!(driver.get_or("foo", 0).await.unwrap(), 3);

        driver.remove("foo").await.unwrap();
        assert_eq!(driver.get_or("foo", 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_flush_clears_storage_and_memory() {
        let (driver, _) = driver_with_clock("");
        let driver = driver.with_memory();

        driver.put("a", 1, None).await.unwrap();
        driver.flush().await.unwrap();

        assert!(driver.api().is_empty());
        assert!(!driver.has("a").await.unwrap());
        let value: Option<i64> = driver.get("a").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_prune() {
        let (driver, clock) = driver_with_clock("app");

        driver
            .put("old", 1, Some(clock.now() + Duration::seconds(1)))
            .await
            .unwrap();
        driver.put("forever", 2, None).await.unwrap();
        driver.api().set_item("unrelated", "not json").unwrap();

        clock.advance(Duration::seconds(1));

        assert_eq!(driver.prune().await.unwrap(), 1);
        assert_eq!(
            driver.api().keys(),
            vec!["app.forever".to_string(), "unrelated".to_string()]
        );
    }

    #[tokio::test]
    async fn test_pop_by_prefix() {
        let (driver, clock) = driver_with_clock("");
        let soon = clock.now() + Duration::seconds(1);

        driver.put("session.a", 1, Some(soon)).await.unwrap();
        driver.put("session.b", 2, Some(soon)).await.unwrap();
        driver.put("session.c", 3, None).await.unwrap();
        driver.put("other", 4, Some(soon)).await.unwrap();

        clock.advance(Duration::seconds(1));

        assert_eq!(driver.pop_by_prefix("session.", 1).await.unwrap(), 1);
        assert_eq!(driver.pop_by_prefix("session.", 10).await.unwrap(), 1);
        assert_eq!(
            driver.api().keys(),
            vec!["other".to_string(), "session.c".to_string()]
        );
    }

    #[tokio::test]
    async fn test_set_item_failure_propagates() {
        let mut storage = MockWebStorage::new();
        storage
            .expect_set_item()
            .returning(|_, _| Err(DomainError::storage("Quota exceeded")));

        let driver = StorageDriver::new(storage, DriverConfig::default());

        let result = driver.put("foo", "bar", None).await;
        assert!(matches!(result, Err(DomainError::Storage { .. })));
    }

    #[tokio::test]
    async fn test_get_reads_prefixed_item() {
        let mut storage = MockWebStorage::new();
        storage
            .expect_get_item()
            .withf(|key| key == "app:foo")
            .returning(|_| Some(r#"{"key":"foo","value":"bar","expires":null}"#.to_string()));

        let driver = StorageDriver::new(storage, DriverConfig::default().with_prefix("app:"));

        let value: Option<String> = driver.get("foo").await.unwrap();
        assert_eq!(value, Some("bar".to_string()));
    }
}
