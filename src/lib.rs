//! Cache Manager
//!
//! Key/value caching behind one driver contract with support for:
//! - In-process, file, web storage and cookie stores
//! - Redis and HTTP REST KV backends
//! - Prefix namespacing and TTL policies
//! - Named driver registries built from configuration

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::{
    CacheDriver, CacheDriverExt, Cached, Clock, DomainError, DriverApi, DriverConfig,
    SystemClock, Ttl,
};
pub use infrastructure::cache::{CacheRegistry, DriverFactory};
