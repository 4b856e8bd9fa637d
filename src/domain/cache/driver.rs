//! Cache driver contract
//!
//! Adapters supply four primitives (`get_value`, `put_value`, `remove`, `flush`);
//! everything else is derived here and shared by every store.

use std::fmt::Debug;
use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use super::config::DriverConfig;
use crate::domain::DomainError;

/// Contract every cache store adapter implements
///
/// Values cross this trait as `serde_json::Value` so that it stays dyn-compatible.
/// Use [`CacheDriverExt`] for typed access.
#[async_trait]
pub trait CacheDriver: Send + Sync + Debug {
    /// Configuration the driver was constructed with
    fn config(&self) -> &DriverConfig;

    /// Reads a value. Expired or unreadable entries are a miss.
    async fn get_value(&self, key: &str) -> Result<Option<Value>, DomainError>;

    /// Writes a value, returning it.
    ///
    /// When `expires` is `None` the configured TTL decides the expiration.
    async fn put_value(
        &self,
        key: &str,
        value: Value,
        expires: Option<DateTime<Utc>>,
    ) -> Result<Value, DomainError>;

    /// Removes a value
    async fn remove(&self, key: &str) -> Result<(), DomainError>;

    /// Removes every value from the store
    async fn flush(&self) -> Result<(), DomainError>;

    /// Namespaces a key with the configured prefix
    fn key(&self, key: &str) -> String {
        self.config().key(key)
    }

    /// Resolves the effective expiration for a write
    fn expires(&self, at: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        self.config().expires(at)
    }

    /// Checks whether a non-null value is cached under the key
    async fn has(&self, key: &str) -> Result<bool, DomainError> {
        Ok(present(self.get_value(key).await?).is_some())
    }

    /// Reads several values at once
    async fn get_many_values(&self, keys: &[&str]) -> Result<Vec<Option<Value>>, DomainError> {
        let mut values = Vec::with_capacity(keys.len());

        for key in keys {
            values.push(present(self.get_value(key).await?));
        }

        Ok(values)
    }

    /// Adds `count` to the cached number, starting from 0 when nothing is cached.
    ///
    /// Read-then-write: not atomic unless the adapter overrides it.
    async fn increment(&self, key: &str, count: i64) -> Result<i64, DomainError> {
        let current = numeric(key, self.get_value(key).await?)?;
        let value = current.checked_add(count).ok_or_else(|| {
            DomainError::validation(format!("Incrementing '{}' by {} overflows", key, count))
        })?;

        self.put_value(key, Value::from(value), None).await?;
        Ok(value)
    }

    /// Subtracts `count` from the cached number, starting from 0 when nothing is cached.
    async fn decrement(&self, key: &str, count: i64) -> Result<i64, DomainError> {
        let current = numeric(key, self.get_value(key).await?)?;
        let value = current.checked_sub(count).ok_or_else(|| {
            DomainError::validation(format!("Decrementing '{}' by {} overflows", key, count))
        })?;

        self.put_value(key, Value::from(value), None).await?;
        Ok(value)
    }
}

/// Access to the raw store handle behind a driver
pub trait DriverApi {
    type Store: ?Sized;

    /// Returns the underlying store for operations outside the driver contract
    fn api(&self) -> &Self::Store;
}

fn present(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !v.is_null())
}

fn numeric(key: &str, value: Option<Value>) -> Result<i64, DomainError> {
    match present(value) {
        None => Ok(0),
        Some(value) => value
            .as_i64()
            .or_else(|| value.as_f64().filter(|f| is_integral(*f)).map(|f| f as i64))
            .ok_or_else(|| {
                DomainError::validation(format!("Cached value for '{}' is not an integer", key))
            }),
    }
}

/// Whole numbers inside the `i64` range; `i64::MAX as f64` rounds up to 2^63
fn is_integral(f: f64) -> bool {
    f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}

/// Extension trait providing typed operations over any driver
pub trait CacheDriverExt: CacheDriver {
    /// Gets a typed value. A value that does not deserialize into `V` is a miss.
    fn get<'a, V>(
        &'a self,
        key: &'a str,
    ) -> impl Future<Output = Result<Option<V>, DomainError>> + Send
    where
        V: DeserializeOwned + Send,
    {
        async move {
            match present(self.get_value(key).await?) {
                Some(value) => match serde_json::from_value(value) {
                    Ok(value) => Ok(Some(value)),
                    Err(e) => {
                        debug!(key, error = %e, "Cached value has an unexpected shape");
                        Ok(None)
                    }
                },
                None => Ok(None),
            }
        }
    }

    /// Gets a typed value or the given fallback
    fn get_or<'a, V>(
        &'a self,
        key: &'a str,
        fallback: V,
    ) -> impl Future<Output = Result<V, DomainError>> + Send
    where
        V: DeserializeOwned + Send,
    {
        async move { Ok(self.get(key).await?.unwrap_or(fallback)) }
    }

    /// Gets a typed value or computes a fallback lazily
    fn get_or_else<'a, V, F>(
        &'a self,
        key: &'a str,
        fallback: F,
    ) -> impl Future<Output = Result<V, DomainError>> + Send
    where
        V: DeserializeOwned + Send,
        F: FnOnce() -> V + Send,
    {
        async move { Ok(self.get(key).await?.unwrap_or_else(fallback)) }
    }

    /// Puts a typed value, returning it
    fn put<'a, V>(
        &'a self,
        key: &'a str,
        value: V,
        expires: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<V, DomainError>> + Send
    where
        V: Serialize + Send + Sync,
    {
        async move {
            let data = serde_json::to_value(&value).map_err(|e| {
                DomainError::serialization(format!("Failed to serialize cache value: {}", e))
            })?;

            self.put_value(key, data, expires).await?;
            Ok(value)
        }
    }

    /// Returns the cached value, or computes, caches and returns it.
    ///
    /// A failing compute or one producing `None` yields `fallback` and caches nothing.
    fn remember<'a, V, F, Fut, E>(
        &'a self,
        key: &'a str,
        compute: F,
        expires: Option<DateTime<Utc>>,
        fallback: Option<V>,
    ) -> impl Future<Output = Result<Option<V>, DomainError>> + Send
    where
        V: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Option<V>, E>> + Send,
        E: Send,
    {
        async move {
            if let Some(cached) = self.get(key).await? {
                return Ok(Some(cached));
            }

            let value = match compute().await {
                Ok(Some(value)) => value,
                Ok(None) | Err(_) => return Ok(fallback),
            };

            let data = serde_json::to_value(&value).map_err(|e| {
                DomainError::serialization(format!("Failed to serialize cache value: {}", e))
            })?;

            // A result that serializes to null is a miss, same as `None`
            if data.is_null() {
                return Ok(fallback);
            }

            self.put_value(key, data, expires).await?;
            Ok(Some(value))
        }
    }

    /// Gets several typed values at once
    fn get_many<'a, V>(
        &'a self,
        keys: &'a [&'a str],
    ) -> impl Future<Output = Result<Vec<Option<V>>, DomainError>> + Send
    where
        V: DeserializeOwned + Send,
    {
        async move {
            let values = self.get_many_values(keys).await?;

            Ok(values
                .into_iter()
                .map(|value| value.and_then(|v| serde_json::from_value(v).ok()))
                .collect())
        }
    }
}

// Blanket implementation for all types implementing CacheDriver
impl<T: CacheDriver + ?Sized> CacheDriverExt for T {}


#[cfg(test)]
mod tests {
    use super::mock::RecordingDriver;
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_decrement_empty_key() {
        let driver = RecordingDriver::new();

        let value = driver.decrement("foo", 1).await.unwrap();

        assert_eq!(value, -1);
        assert_eq!(driver.gets(), vec!["foo".to_string()]);
        assert_eq!(driver.puts(), vec![("foo".to_string(), json!(-1), None)]);

        let stored: Option<i64> = driver.get("foo").await.unwrap();
        assert_eq!(stored, Some(-1));
    }

    #[tokio::test]
    async fn test_decrement_with_count() {
        for (initial, count, expected) in [(0, 1, -1), (7, 1, 6), (2, 3, -1)] {
            let driver = RecordingDriver::new().with_entry("foo", json!(initial));

            assert_eq!(driver.decrement("foo", count).await.unwrap(), expected);
            assert_eq!(driver.puts()[0].1, json!(expected));
        }
    }

    #[tokio::test]
    async fn test_increment_with_count() {
        for (initial, count, expected) in [(0, 1, 1), (7, 1, 8), (2, 3, 5)] {
            let driver = RecordingDriver::new().with_entry("foo", json!(initial));

            assert_eq!(driver.increment("foo", count).await.unwrap(), expected);
            assert_eq!(driver.puts()[0].1, json!(expected));
        }
    }

    #[tokio::test]
    async fn test_increment_bootstraps_from_zero() {
        let driver = RecordingDriver::new();

        assert_eq!(driver.increment("counter", 4).await.unwrap(), 4);
        assert_eq!(driver.increment("counter", 4).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_increment_accepts_integral_float() {
        let driver = RecordingDriver::new().with_entry("foo", json!(7.0));

        assert_eq!(driver.increment("foo", 1).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_increment_rejects_non_numeric() {
        let driver = RecordingDriver::new().with_entry("foo", json!("bar"));

        let result = driver.increment("foo", 1).await;
        assert!(matches!(result, Err(DomainError::Validation { .. })));
        assert!(driver.puts().is_empty());
    }

    #[tokio::test]
    async fn test_counter_overflow_rejected() {
        let driver = RecordingDriver::new().with_entry("max", json!(i64::MAX));

        let result = driver.increment("max", 1).await;
        assert!(matches!(result, Err(DomainError::Validation { .. })));

        let driver = RecordingDriver::new().with_entry("min", json!(i64::MIN));

        let result = driver.decrement("min", 1).await;
        assert!(matches!(result, Err(DomainError::Validation { .. })));
        assert!(driver.puts().is_empty());
    }

    #[tokio::test]
    async fn test_increment_rejects_out_of_range_float() {
        for value in [json!(1e30), json!(-1e30), json!(9.3e18)] {
            let driver = RecordingDriver::new().with_entry("foo", value.clone());

            let result = driver.increment("foo", 1).await;
            assert!(
                matches!(result, Err(DomainError::Validation { .. })),
                "value {}",
                value
            );
        }
    }

    #[tokio::test]
    async fn test_has() {
        let cases = [
            (false, json!(null)),
            (true, json!(false)),
            (true, json!(0)),
            (true, json!("foo")),
        ];

        for (expected, value) in cases {
            let driver = RecordingDriver::new().with_entry("key", value.clone());
            assert_eq!(driver.has("key").await.unwrap(), expected, "value {}", value);
        }

        let driver = RecordingDriver::new();
        assert!(!driver.has("key").await.unwrap());
    }

    #[tokio::test]
    async fn test_remember_caches_on_miss() {
        let driver = RecordingDriver::new();
        let calls = AtomicUsize::new(0);

        let value = driver
            .remember(
                "foo",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, DomainError>(Some("bar".to_string()))
                },
                None,
                None,
            )
            .await
            .unwrap();

        assert_eq!(value, Some("bar".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(driver.gets(), vec!["foo".to_string()]);
        assert_eq!(driver.puts(), vec![("foo".to_string(), json!("bar"), None)]);
    }

    #[tokio::test]
    async fn test_remember_hit_skips_compute() {
        let driver = RecordingDriver::new().with_entry("foo", json!("cached"));
        let calls = AtomicUsize::new(0);

        let value = driver
            .remember(
                "foo",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, DomainError>(Some("fresh".to_string()))
                },
                None,
                None,
            )
            .await
            .unwrap();

        assert_eq!(value, Some("cached".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(driver.puts().is_empty());
    }

    #[tokio::test]
    async fn test_remember_none_returns_fallback() {
        let driver = RecordingDriver::new();

        let value = driver
            .remember(
                "foo",
                || async { Ok::<Option<String>, DomainError>(None) },
                None,
                Some("fizz".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(value, Some("fizz".to_string()));
        assert!(driver.puts().is_empty());
        assert!(!driver.has("foo").await.unwrap());
    }

    #[tokio::test]
    async fn test_remember_null_result_returns_fallback() {
        let driver = RecordingDriver::new();

        let value = driver
            .remember(
                "foo",
                || async { Ok::<_, DomainError>(Some(Value::Null)) },
                None,
                Some(json!("fb")),
            )
            .await
            .unwrap();

        assert_eq!(value, Some(json!("fb")));
        assert!(driver.puts().is_empty());

        let value: Option<Option<i64>> = driver
            .remember(
                "bar",
                || async { Ok::<_, DomainError>(Some(None)) },
                None,
                None,
            )
            .await
            .unwrap();

        assert!(value.is_none());
        assert!(driver.puts().is_empty());
    }

    #[tokio::test]
    async fn test_remember_failure_returns_fallback() {
        let driver = RecordingDriver::new();

        let value = driver
            .remember(
                "foo",
                || async { Err::<Option<i64>, _>(DomainError::cache("boom")) },
                None,
                Some(7),
            )
            .await
            .unwrap();

        assert_eq!(value, Some(7));
        assert!(driver.puts().is_empty());

        let value: Option<i64> = driver
            .remember(
                "foo",
                || async { Err::<Option<i64>, _>("boom") },
                None,
                None,
            )
            .await
            .unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_remember_passes_expiration() {
        let driver = RecordingDriver::new();
        let at = DateTime::from_timestamp_millis(120_000).unwrap();

        driver
            .remember("foo", || async { Ok::<_, DomainError>(Some(1)) }, Some(at), None)
            .await
            .unwrap();

        assert_eq!(driver.puts(), vec![("foo".to_string(), json!(1), Some(at))]);
    }

    #[tokio::test]
    async fn test_get_wrong_shape_is_miss() {
        let driver = RecordingDriver::new().with_entry("foo", json!("not a number"));

        let value: Option<i64> = driver.get("foo").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_get_or_fallbacks() {
        let driver = RecordingDriver::new();

        assert_eq!(driver.get_or("missing", 3).await.unwrap(), 3);
        assert_eq!(
            driver.get_or_else("missing", || "lazy".to_string()).await.unwrap(),
            "lazy"
        );
    }

    #[tokio::test]
    async fn test_put_returns_value_and_round_trips() {
        let driver = RecordingDriver::new();

        let stored = driver.put("foo", json!({"fizz": true}), None).await.unwrap();
        assert_eq!(stored, json!({"fizz": true}));

        let value: Option<Value> = driver.get("foo").await.unwrap();
        assert_eq!(value, Some(json!({"fizz": true})));
    }

    #[tokio::test]
    async fn test_get_many() {
        let driver = RecordingDriver::new()
            .with_entry("a", json!(1))
            .with_entry("b", json!(2));

        let values: Vec<Option<i64>> = driver.get_many(&["a", "b", "c"]).await.unwrap();
        assert_eq!(values, vec![Some(1), Some(2), None]);
    }

    #[tokio::test]
    async fn test_typed_operations_through_trait_object() {
        let driver: Arc<dyn CacheDriver> = Arc::new(RecordingDriver::new());

        driver.put("foo", vec![1, 2, 3], None).await.unwrap();

        let value: Option<Vec<i32>> = driver.get("foo").await.unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_key_uses_config_prefix() {
        let driver = RecordingDriver::with_config(DriverConfig::default().with_prefix("app:"));
        assert_eq!(driver.key("foo"), "app:foo");
    }
}
