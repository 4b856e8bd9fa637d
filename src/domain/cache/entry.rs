//! Persisted cache entry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A cached value as persisted by text-based stores
///
/// `expires` is epoch milliseconds; `None` means the entry never expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cached {
    /// Unprefixed key the entry was written under
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub expires: Option<i64>,
}

impl Cached {
    pub fn new(key: impl Into<String>, value: Value, expires: Option<DateTime<Utc>>) -> Self {
        Self {
            key: key.into(),
            value,
            expires: expires.map(|at| at.timestamp_millis()),
        }
    }

    /// Expiration as a timestamp
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires.and_then(DateTime::from_timestamp_millis)
    }
}
