//! Cache domain - Driver contract shared by every store adapter

mod clock;
mod config;
mod driver;
mod entry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DriverConfig, Ttl};
pub use driver::{CacheDriver, CacheDriverExt, DriverApi};
pub use entry::Cached;

#[cfg(test)]
pub use driver::mock::RecordingDriver;
