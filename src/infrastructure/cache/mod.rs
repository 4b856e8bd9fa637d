//! Cache infrastructure - Store adapters, registry and factory

mod codec;
mod factory;
mod file;
mod map;
mod redis;
mod registry;
mod rest;
mod storage;

pub mod cookie;

pub use cookie::{
    CookieCipher, CookieDriver, CookieOptions, CookieStore, HmacCookieSigner, MemoryCookieJar,
    SameSite, DEFAULT_COOKIE_PREFIX,
};
pub use factory::{CacheSettings, DriverFactory, DriverSettings, DriverType};
pub use file::FileDriver;
pub use map::MapDriver;
pub use redis::RedisDriver;
pub use registry::{CacheRegistry, CacheRegistryBuilder};
pub use rest::{RestKvConfig, RestKvDriver};
pub use storage::{MemoryStorage, StorageDriver, WebStorage};
