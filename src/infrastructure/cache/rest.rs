//! REST KV driver (Upstash / Vercel KV style HTTP API)

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::codec;
use crate::domain::cache::{CacheDriver, DriverApi, DriverConfig};
use crate::domain::DomainError;

/// Connection settings for a REST KV endpoint
#[derive(Clone)]
pub struct RestKvConfig {
    /// Endpoint accepting `["COMMAND", args...]` JSON bodies
    pub url: String,
    /// Bearer token
    pub token: String,
    pub timeout: Duration,
}

impl RestKvConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Sets the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for RestKvConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestKvConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Reply envelope: `{"result": ...}` or `{"error": "..."}`
#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    result: Value,
    error: Option<String>,
}

/// Driver for Redis-compatible stores exposed over HTTP
#[derive(Debug, Clone)]
pub struct RestKvDriver {
    client: reqwest::Client,
    endpoint: RestKvConfig,
    config: DriverConfig,
}

impl RestKvDriver {
    pub fn new(endpoint: RestKvConfig, config: DriverConfig) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .map_err(|e| DomainError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, endpoint, config))
    }

    pub fn with_client(client: reqwest::Client, endpoint: RestKvConfig, config: DriverConfig) -> Self {
        Self {
            client,
            endpoint,
            config,
        }
    }

    /// Sends one command and decodes its result
    pub async fn command<T: DeserializeOwned>(&self, args: Vec<Value>) -> Result<T, DomainError> {
        let name = args
            .first()
            .and_then(Value::as_str)
            .unwrap_or("?")
            .to_string();

        let response = self
            .client
            .post(&self.endpoint.url)
            .bearer_auth(&self.endpoint.token)
            .json(&args)
            .send()
            .await
            .map_err(|e| DomainError::cache(format!("{} request failed: {}", name, e)))?;

        let status = response.status();
        let reply: Reply = response.json().await.map_err(|e| {
            DomainError::cache(format!("{} returned an unreadable reply ({}): {}", name, status, e))
        })?;

        if let Some(error) = reply.error {
            return Err(DomainError::cache(format!("{} failed: {}", name, error)));
        }

        if !status.is_success() {
            return Err(DomainError::cache(format!("{} failed with status {}", name, status)));
        }

        serde_json::from_value(reply.result).map_err(|e| {
            DomainError::cache(format!("{} returned an unexpected result: {}", name, e))
        })
    }

    async fn delete_namespace(&self) -> Result<usize, DomainError> {
        let pattern = format!("{}*", self.key(""));
        let mut cursor = "0".to_string();
        let mut total_deleted = 0usize;

        loop {
            let (next, keys): (Value, Vec<String>) = self
                .command(vec![
                    json!("SCAN"),
                    json!(cursor),
                    json!("MATCH"),
                    json!(pattern),
                    json!("COUNT"),
                    json!(100),
                ])
                .await?;

            if !keys.is_empty() {
                let mut args = vec![json!("DEL")];
                args.extend(keys.into_iter().map(Value::from));

                let deleted: usize = self.command(args).await?;
                total_deleted += deleted;
            }

            cursor = match next {
                Value::String(s) => s,
                other => other.to_string(),
            };

            if cursor == "0" {
                break;
            }
        }

        Ok(total_deleted)
    }
}

impl DriverApi for RestKvDriver {
    type Store = reqwest::Client;

    fn api(&self) -> &Self::Store {
        &self.client
    }
}

#[async_trait]
impl CacheDriver for RestKvDriver {
    fn config(&self) -> &DriverConfig {
        &self.config
    }

    async fn get_value(&self, key: &str) -> Result<Option<Value>, DomainError> {
        let prefixed_key = self.key(key);

        let raw: Option<String> = self
            .command(vec![json!("GET"), json!(prefixed_key)])
            .await?;

        Ok(codec::decode(&prefixed_key, raw))
    }

    async fn put_value(
        &self,
        key: &str,
        value: Value,
        expires: Option<DateTime<Utc>>,
    ) -> Result<Value, DomainError> {
        let mut args = vec![json!("SET"), json!(self.key(key)), json!(codec::encode(&value)?)];

        if let Some(at) = self.expires(expires) {
            args.push(json!("EXAT"));
            args.push(json!(at.timestamp()));
        }

        let _: Value = self.command(args).await?;
        Ok(value)
    }

    async fn remove(&self, key: &str) -> Result<(), DomainError> {
        let _: Value = self.command(vec![json!("DEL"), json!(self.key(key))]).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), DomainError> {
        if self.config.prefix.is_empty() {
            let _: Value = self.command(vec![json!("FLUSHDB")]).await?;
        } else {
            self.delete_namespace().await?;
        }

        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, DomainError> {
        let count: i64 = self
            .command(vec![json!("EXISTS"), json!(self.key(key))])
            .await?;

        Ok(count > 0)
    }

    async fn get_many_values(&self, keys: &[&str]) -> Result<Vec<Option<Value>>, DomainError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let prefixed: Vec<String> = keys.iter().map(|key| self.key(key)).collect();

        let mut args = vec![json!("MGET")];
        args.extend(prefixed.iter().map(|key| json!(key)));

        let raw: Vec<Option<String>> = self.command(args).await?;

        Ok(prefixed
            .iter()
            .zip(raw)
            .map(|(key, raw)| codec::decode(key, raw).filter(|v| !v.is_null()))
            .collect())
    }

    async fn increment(&self, key: &str, count: i64) -> Result<i64, DomainError> {
        self.command(vec![json!("INCRBY"), json!(self.key(key)), json!(count)])
            .await
    }

    async fn decrement(&self, key: &str, count: i64) -> Result<i64, DomainError> {
        self.command(vec![json!("DECRBY"), json!(self.key(key)), json!(count)])
            .await
    }
}
