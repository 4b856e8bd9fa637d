//! Flat JSON file driver

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::cache::{CacheDriver, Cached, DriverApi, DriverConfig};
use crate::domain::DomainError;

/// Prefixed key to serialized entry, as persisted in the file
type Entries = BTreeMap<String, Value>;

/// Driver persisting every entry into a single JSON object on disk
///
/// Reads are self-healing: an expired entry is removed from the file when found.
#[derive(Debug)]
pub struct FileDriver {
    path: PathBuf,
    config: DriverConfig,
    lock: Mutex<()>,
}

impl FileDriver {
    /// Opens the cache file, creating it with an empty object when missing
    pub async fn new(path: impl Into<PathBuf>, config: DriverConfig) -> Result<Self, DomainError> {
        let path = path.into();

        let exists = fs::try_exists(&path).await.map_err(|e| {
            DomainError::storage(format!("Failed to access '{}': {}", path.display(), e))
        })?;

        if !exists {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).await.map_err(|e| {
                    DomainError::storage(format!(
                        "Failed to create directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;
            }

            fs::write(&path, "{}").await.map_err(|e| {
                DomainError::storage(format!("Failed to create '{}': {}", path.display(), e))
            })?;
        }

        Ok(Self {
            path,
            config,
            lock: Mutex::new(()),
        })
    }

    /// Removes every expired entry, returning how many were removed
    pub async fn prune(&self) -> Result<usize, DomainError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read().await?;
        let before = entries.len();

        entries.retain(|_, entry| match serde_json::from_value::<Cached>(entry.clone()) {
            Ok(cached) => !self.config.is_expired(cached.expires),
            Err(_) => true,
        });

        let pruned = before - entries.len();

        if pruned > 0 {
            self.write(&entries).await?;
        }

        Ok(pruned)
    }

    async fn read(&self) -> Result<Entries, DomainError> {
        let data = match fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => {
                return Err(DomainError::storage(format!(
                    "Failed to read '{}': {}",
                    self.path.display(),
                    e
                )));
            }
        };

        if data.trim().is_empty() {
            return Ok(Entries::new());
        }

        match serde_json::from_str(&data) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cache file is corrupt, treating as empty");
                Ok(Entries::new())
            }
        }
    }

    async fn write(&self, entries: &Entries) -> Result<(), DomainError> {
        let data = serde_json::to_string(entries)?;

        fs::write(&self.path, data).await.map_err(|e| {
            DomainError::storage(format!("Failed to write '{}': {}", self.path.display(), e))
        })
    }
}

impl DriverApi for FileDriver {
    type Store = Path;

    fn api(&self) -> &Self::Store {
        &self.path
    }
}

#[async_trait]
impl CacheDriver for FileDriver {
    fn config(&self) -> &DriverConfig {
        &self.config
    }

    async fn get_value(&self, key: &str) -> Result<Option<Value>, DomainError> {
        let key = self.key(key);
        let _guard = self.lock.lock().await;
        let mut entries = self.read().await?;

        let Some(entry) = entries.get(&key) else {
            return Ok(None);
        };

        let cached: Cached = match serde_json::from_value(entry.clone()) {
            Ok(cached) => cached,
            Err(e) => {
                debug!(key = %key, error = %e, "Unreadable cache entry");
                return Ok(None);
            }
        };

        if self.config.is_expired(cached.expires) {
            debug!(key = %key, "Removing expired entry");
            entries.remove(&key);
            self.write(&entries).await?;
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
        let cached = Cached::new(key, value.clone(), self.expires(expires));
        let entry = serde_json::to_value(&cached)?;

        let _guard = self.lock.lock().await;
        let mut entries = self.read().await?;
        entries.insert(self.key(key), entry);
        self.write(&entries).await?;

        Ok(value)
    }

    async fn remove(&self, key: &str) -> Result<(), DomainError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read().await?;

        if entries.remove(&self.key(key)).is_some() {
            self.write(&entries).await?;
        }

        Ok(())
    }

    async fn flush(&self) -> Result<(), DomainError> {
        let _guard = self.lock.lock().await;
        self.write(&Entries::new()).await
    }
}
