//! Driver configuration: key prefixing and default expiration policy

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use super::clock::{Clock, SystemClock};

/// Default expiration policy applied when `put`/`remember` get no explicit expiration
#[derive(Clone, Default)]
pub enum Ttl {
    /// Entries never expire
    #[default]
    Never,
    /// Entries expire this many seconds after they are written. Zero means never.
    Seconds(u64),
    /// Entries expire at the timestamp produced by the function
    At(Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>),
}

impl Ttl {
    pub fn seconds(seconds: u64) -> Self {
        Self::Seconds(seconds)
    }

    /// Lifetime of `seconds` as a duration, `None` when chrono can't represent it
    pub fn lifetime(seconds: u64) -> Option<TimeDelta> {
        i64::try_from(seconds).ok().and_then(TimeDelta::try_seconds)
    }

    pub fn at<F>(f: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        Self::At(Arc::new(f))
    }
}

impl From<Option<u64>> for Ttl {
    fn from(seconds: Option<u64>) -> Self {
        seconds.map(Ttl::Seconds).unwrap_or_default()
    }
}

impl fmt::Debug for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ttl::Never => write!(f, "Never"),
            Ttl::Seconds(s) => f.debug_tuple("Seconds").field(s).finish(),
            Ttl::At(_) => write!(f, "At(<fn>)"),
        }
    }
}

/// Configuration shared by every driver
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Namespace prepended to every key
    pub prefix: String,
    /// Default expiration policy
    pub ttl: Ttl,
    /// Time source for expiration decisions
    pub clock: Arc<dyn Clock>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            ttl: Ttl::Never,
            clock: Arc::new(SystemClock),
        }
    }
}

impl DriverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the default TTL
    pub fn with_ttl(mut self, ttl: Ttl) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Namespaces a key with the configured prefix.
    ///
    /// A prefix ending in an alphanumeric character is joined with `.`; any other
    /// trailing character is treated as the caller's own separator.
    pub fn key(&self, key: impl fmt::Display) -> String {
        let key = key.to_string();

        match self.prefix.chars().last() {
            None => key,
            Some(last) if last.is_ascii_alphanumeric() => format!("{}.{}", self.prefix, key),
            Some(_) => format!("{}{}", self.prefix, key),
        }
    }

    /// Resolves the effective expiration: explicit, then configured TTL, then never.
    ///
    /// A TTL too large to land on a representable timestamp never expires.
    pub fn expires(&self, at: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        if at.is_some() {
            return at;
        }

        match &self.ttl {
            Ttl::Never | Ttl::Seconds(0) => None,
            Ttl::At(f) => Some(f()),
            Ttl::Seconds(seconds) => Ttl::lifetime(*seconds)
                .and_then(|lifetime| self.clock.now().checked_add_signed(lifetime)),
        }
    }

    /// Whether an entry with the given epoch-millisecond expiration has expired
    pub fn is_expired(&self, expires: Option<i64>) -> bool {
        match expires {
            Some(expires) => self.clock.now_millis() >= expires,
            None => false,
        }
    }
}
