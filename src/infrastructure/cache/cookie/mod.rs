//! Cookie driver - one cookie per cached key

mod cipher;
mod jar;

pub use cipher::{CookieCipher, HmacCookieSigner};
pub use jar::{CookieOptions, CookieStore, MemoryCookieJar, SameSite};

#[cfg(test)]
pub use jar::MockCookieStore;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::domain::cache::{CacheDriver, Cached, DriverApi, DriverConfig};
use crate::domain::DomainError;

/// Prefix used when the driver config doesn't set one
pub const DEFAULT_COOKIE_PREFIX: &str = "cache_";

/// Driver storing each entry as a cookie holding the JSON entry envelope
pub struct CookieDriver<C: CookieStore = MemoryCookieJar> {
    store: C,
    config: DriverConfig,
    options: CookieOptions,
    cipher: Option<Arc<dyn CookieCipher>>,
}

impl<C: CookieStore> fmt::Debug for CookieDriver<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieDriver")
            .field("config", &self.config)
            .field("options", &self.options)
            .field("store", &"<CookieStore>")
            .field("encrypted", &self.cipher.is_some())
            .finish()
    }
}

impl<C: CookieStore> CookieDriver<C> {
    /// Creates a cookie driver. An empty prefix falls back to `DEFAULT_COOKIE_PREFIX`
    /// so cached cookies can be told apart from the application's own.
    pub fn new(store: C, config: DriverConfig) -> Self {
        let config = if config.prefix.is_empty() {
            config.with_prefix(DEFAULT_COOKIE_PREFIX)
        } else {
            config
        };

        Self {
            store,
            config,
            options: CookieOptions::default(),
            cipher: None,
        }
    }

    /// Sets the attributes applied to written cookies
    pub fn with_options(mut self, options: CookieOptions) -> Self {
        self.options = options;
        self
    }

    /// Encrypts cookie payloads with the given cipher
    pub fn with_cipher(mut self, cipher: Arc<dyn CookieCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Every live cached value, keyed by unprefixed key
    pub fn all(&self) -> BTreeMap<String, Value> {
        let namespace = self.key("");

        self.store
            .cookies()
            .into_iter()
            .filter(|(name, _)| name.starts_with(&namespace))
            .filter_map(|(name, raw)| self.decode(&name, &raw))
            .filter(|cached| !self.config.is_expired(cached.expires))
            .map(|cached| (cached.key, cached.value))
            .collect()
    }

    fn encode(&self, cached: &Cached) -> Result<String, DomainError> {
        let data = serde_json::to_string(cached)?;

        match &self.cipher {
            Some(cipher) => cipher.encrypt(&data),
            None => Ok(data),
        }
    }

    fn decode(&self, name: &str, raw: &str) -> Option<Cached> {
        let data = match &self.cipher {
            Some(cipher) => match cipher.decrypt(raw) {
                Ok(data) => data,
                Err(e) => {
                    debug!(cookie = %name, error = %e, "Failed to decrypt cookie");
                    return None;
                }
            },
            None => raw.to_string(),
        };

        match serde_json::from_str(&data) {
            Ok(cached) => Some(cached),
            Err(e) => {
                debug!(cookie = %name, error = %e, "Unreadable cookie");
                None
            }
        }
    }
}

impl<C: CookieStore> DriverApi for CookieDriver<C> {
    type Store = C;

    fn api(&self) -> &Self::Store {
        &self.store
    }
}

#[async_trait]
impl<C: CookieStore> CacheDriver for CookieDriver<C> {
    fn config(&self) -> &DriverConfig {
        &self.config
    }

    async fn get_value(&self, key: &str) -> Result<Option<Value>, DomainError> {
        let name = self.key(key);

        let Some(cached) = self
            .store
            .get_cookie(&name)
            .and_then(|raw| self.decode(&name, &raw))
        else {
            return Ok(None);
        };

        if self.config.is_expired(cached.expires) {
            debug!(cookie = %name, "Removing expired cookie");
            self.store.delete_cookie(&name);
            return Ok(None);
        }

        Ok(Some(cached.value))
    }

    async fn put_value(
        &self,
        key: &str,
        value: Value,
        expires: Option<DateTime<Utc>>,
    ) -> Result<Value, DomainError> {
        let expires = self.expires(expires);
        let cached = Cached::new(key, value.clone(), expires);

        let mut options = self.options.clone();
        if expires.is_some() {
            options.expires = expires;
        }

        self.store
            .set_cookie(&self.key(key), &self.encode(&cached)?, &options);

        Ok(value)
    }

    async fn remove(&self, key: &str) -> Result<(), DomainError> {
        self.store.delete_cookie(&self.key(key));
        Ok(())
    }

    async fn flush(&self) -> Result<(), DomainError> {
        let namespace = self.key("");

        for (name, _) in self.store.cookies() {
            if name.starts_with(&namespace) {
                self.store.delete_cookie(&name);
            }
        }

        Ok(())
    }
}
