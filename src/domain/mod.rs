//! Domain layer - Driver contract, expiration policy and errors

pub mod cache;
pub mod error;

pub use cache::{
    CacheDriver, CacheDriverExt, Cached, Clock, DriverApi, DriverConfig, ManualClock,
    SystemClock, Ttl,
};
pub use error::DomainError;
