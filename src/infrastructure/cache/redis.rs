//! Redis driver

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde_json::Value;

use super::codec;
use crate::domain::cache::{CacheDriver, DriverApi, DriverConfig};
use crate::domain::DomainError;

/// Redis driver over the native wire protocol
///
/// Features:
/// - Expiration via EXPIREAT, applied atomically with the write
/// - Atomic INCRBY/DECRBY counters
/// - Prefix-scoped flush (SCAN + DEL) when a prefix is configured
/// - Connection pooling via ConnectionManager
#[derive(Clone)]
pub struct RedisDriver {
    connection: ConnectionManager,
    config: DriverConfig,
}

impl fmt::Debug for RedisDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisDriver")
            .field("config", &self.config)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisDriver {
    /// Connects to Redis at the given URL (e.g. "redis://127.0.0.1:6379")
    pub async fn connect(url: &str, config: DriverConfig) -> Result<Self, DomainError> {
        let client = Client::open(url)
            .map_err(|e| DomainError::cache(format!("Failed to create Redis client: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| DomainError::cache(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self::with_connection(connection, config))
    }

    /// Wraps an existing connection
    pub fn with_connection(connection: ConnectionManager, config: DriverConfig) -> Self {
        Self { connection, config }
    }

    async fn delete_namespace(&self) -> Result<usize, DomainError> {
        let pattern = format!("{}*", self.key(""));
        let mut conn = self.connection.clone();

        // SCAN rather than KEYS to avoid blocking the server
        let mut cursor = 0u64;
        let mut total_deleted = 0usize;

        loop {
            let (new_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| {
                    DomainError::cache(format!(
                        "Failed to scan keys with pattern '{}': {}",
                        pattern, e
                    ))
                })?;

            if !keys.is_empty() {
                let deleted: usize = conn.del(&keys).await.map_err(|e| {
                    DomainError::cache(format!("Failed to delete keys: {}", e))
                })?;
                total_deleted += deleted;
            }

            cursor = new_cursor;

            if cursor == 0 {
                break;
            }
        }

        Ok(total_deleted)
    }
}

impl DriverApi for RedisDriver {
    type Store = ConnectionManager;

    fn api(&self) -> &Self::Store {
        &self.connection
    }
}

#[async_trait]
impl CacheDriver for RedisDriver {
    fn config(&self) -> &DriverConfig {
        &self.config
    }

    async fn get_value(&self, key: &str) -> Result<Option<Value>, DomainError> {
        let prefixed_key = self.key(key);
        let mut conn = self.connection.clone();

        let raw: Option<String> = conn.get(&prefixed_key).await.map_err(|e| {
            DomainError::cache(format!("Failed to get key '{}': {}", key, e))
        })?;

        Ok(codec::decode(&prefixed_key, raw))
    }

    async fn put_value(
        &self,
        key: &str,
        value: Value,
        expires: Option<DateTime<Utc>>,
    ) -> Result<Value, DomainError> {
        let prefixed_key = self.key(key);
        let data = codec::encode(&value)?;
        let mut conn = self.connection.clone();

        let mut pipe = redis::pipe();
        pipe.atomic().set(&prefixed_key, data).ignore();

        if let Some(at) = self.expires(expires) {
            pipe.cmd("EXPIREAT")
                .arg(&prefixed_key)
                .arg(at.timestamp())
                .ignore();
        }

        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::cache(format!("Failed to set key '{}': {}", key, e)))?;

        Ok(value)
    }

    async fn remove(&self, key: &str) -> Result<(), DomainError> {
        let mut conn = self.connection.clone();

        let _: i64 = conn.del(self.key(key)).await.map_err(|e| {
            DomainError::cache(format!("Failed to delete key '{}': {}", key, e))
        })?;

        Ok(())
    }

    async fn flush(&self) -> Result<(), DomainError> {
        // Without a prefix the whole database belongs to this driver
        if self.config.prefix.is_empty() {
            let mut conn = self.connection.clone();
            redis::cmd("FLUSHDB")
                .query_async::<()>(&mut conn)
                .await
                .map_err(|e| DomainError::cache(format!("Failed to flush database: {}", e)))?;
        } else {
            self.delete_namespace().await?;
        }

        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, DomainError> {
        let mut conn = self.connection.clone();

        let exists: bool = conn.exists(self.key(key)).await.map_err(|e| {
            DomainError::cache(format!("Failed to check existence of key '{}': {}", key, e))
        })?;

        Ok(exists)
    }

    async fn get_many_values(&self, keys: &[&str]) -> Result<Vec<Option<Value>>, DomainError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let prefixed: Vec<String> = keys.iter().map(|key| self.key(key)).collect();
        let mut conn = self.connection.clone();

        let raw: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&prefixed)
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::cache(format!("Failed to get keys: {}", e)))?;

        Ok(prefixed
            .iter()
            .zip(raw)
            .map(|(key, raw)| codec::decode(key, raw).filter(|v| !v.is_null()))
            .collect())
    }

    async fn increment(&self, key: &str, count: i64) -> Result<i64, DomainError> {
        let mut conn = self.connection.clone();

        conn.incr(self.key(key), count).await.map_err(|e| {
            DomainError::cache(format!("Failed to increment key '{}': {}", key, e))
        })
    }

    async fn decrement(&self, key: &str, count: i64) -> Result<i64, DomainError> {
        let mut conn = self.connection.clone();

        conn.decr(self.key(key), count).await.map_err(|e| {
            DomainError::cache(format!("Failed to decrement key '{}': {}", key, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::{CacheDriverExt, Ttl};
    use serde_json::json;

    // Note: These tests require a running Redis instance
    // Run with: cargo test -- --ignored

    async fn driver(prefix: &str) -> RedisDriver {
        RedisDriver::connect(
            "redis://127.0.0.1:6379",
            DriverConfig::default().with_prefix(prefix),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    #[ignore = "Requires running Redis instance"]
    async fn test_redis_put_and_get() {
        let driver = driver("test:put").await;

        driver.put("foo", json!({"fizz": true}), None).await.unwrap();

        let result: Option<Value> = driver.get("foo").await.unwrap();
        assert_eq!(result, Some(json!({"fizz": true})));

        driver.flush().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "Requires running Redis instance"]
    async fn test_redis_has_and_remove() {
        let driver = driver("test:has").await;

        assert!(!driver.has("foo").await.unwrap());
        driver.put("foo", "bar", None).await.unwrap();
        assert!(driver.has("foo").await.unwrap());

        driver.remove("foo").await.unwrap();
        assert!(!driver.has("foo").await.unwrap());
    }

    #[tokio::test]
    #[ignore = "Requires running Redis instance"]
    async fn test_redis_counters() {
        let driver = driver("test:counter").await;
        driver.flush().await.unwrap();

        assert_eq!(driver.increment("hits", 5).await.unwrap(), 5);
        assert_eq!(driver.increment("hits", 3).await.unwrap(), 8);
        assert_eq!(driver.decrement("misses", 1).await.unwrap(), -1);

        let hits: Option<i64> = driver.get("hits").await.unwrap();
        assert_eq!(hits, Some(8));

        driver.flush().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "Requires running Redis instance"]
    async fn test_redis_ttl_applied() {
        let config = DriverConfig::default()
            .with_prefix("test:ttl")
            .with_ttl(Ttl::seconds(60));
        let driver = RedisDriver::connect("redis://127.0.0.1:6379", config)
            .await
            .unwrap();

        driver.put("foo", "bar", None).await.unwrap();

        let mut conn = driver.api().clone();
        let ttl: i64 = conn.ttl("test:ttl.foo").await.unwrap();
        assert!(ttl > 50 && ttl <= 60);

        driver.flush().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "Requires running Redis instance"]
    async fn test_redis_get_many() {
        let driver = driver("test:many").await;

        driver.put("a", 1, None).await.unwrap();
        driver.put("b", 2, None).await.unwrap();

        let values: Vec<Option<i64>> = driver.get_many(&["a", "b", "c"]).await.unwrap();
        assert_eq!(values, vec![Some(1), Some(2), None]);

        driver.flush().await.unwrap();
    }
}
