//! Named driver registry

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::cache::CacheDriver;
use crate::domain::DomainError;

/// Immutable set of named drivers with one default
#[derive(Debug, Clone)]
pub struct CacheRegistry {
    drivers: HashMap<String, Arc<dyn CacheDriver>>,
    default: String,
}

impl CacheRegistry {
    /// Creates a registry. Fails when `default` isn't one of the registered names.
    pub fn new(
        drivers: HashMap<String, Arc<dyn CacheDriver>>,
        default: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let default = default.into();

        if !drivers.contains_key(&default) {
            return Err(DomainError::configuration(format!(
                "Default cache driver [{}] is not registered",
                default
            )));
        }

        Ok(Self { drivers, default })
    }

    pub fn builder() -> CacheRegistryBuilder {
        CacheRegistryBuilder::default()
    }

    /// Returns the named driver, or the default one when no name is given
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<dyn CacheDriver>, DomainError> {
        let name = name.unwrap_or(&self.default);

        self.drivers
            .get(name)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("Cache driver for [{}] not found", name)))
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Builder for [`CacheRegistry`]
#[derive(Debug, Default)]
pub struct CacheRegistryBuilder {
    drivers: HashMap<String, Arc<dyn CacheDriver>>,
    default: Option<String>,
}

impl CacheRegistryBuilder {
    /// Registers a driver, replacing any previous one with the same name
    pub fn driver(mut self, name: impl Into<String>, driver: Arc<dyn CacheDriver>) -> Self {
        self.drivers.insert(name.into(), driver);
        self
    }

    pub fn default_driver(mut self, name: impl Into<String>) -> Self {
        self.default = Some(name.into());
        self
    }

    /// Builds the registry. Without an explicit default, a lone driver becomes the default.
    pub fn build(self) -> Result<CacheRegistry, DomainError> {
        let default = match self.default {
            Some(name) => name,
            None if self.drivers.len() == 1 => self
                .drivers
                .keys()
                .next()
                .cloned()
                .unwrap_or_default(),
            None => {
                return Err(DomainError::configuration(
                    "A default cache driver must be named",
                ));
            }
        };

        CacheRegistry::new(self.drivers, default)
    }
}
