//! Cookie store abstraction and an in-process jar

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

/// SameSite cookie attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// Attributes applied to every cookie a driver writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieOptions {
    pub path: Option<String>,
    pub domain: Option<String>,
    /// Lifetime in seconds
    pub max_age: Option<i64>,
    pub expires: Option<DateTime<Utc>>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<SameSite>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: Some("/".to_string()),
            domain: None,
            max_age: None,
            expires: None,
            http_only: true,
            secure: false,
            same_site: Some(SameSite::Lax),
        }
    }
}

impl CookieOptions {
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }
}

/// Request/response cookie access, e.g. a framework's cookie helpers
#[cfg_attr(test, automock)]
pub trait CookieStore: Send + Sync {
    fn get_cookie(&self, name: &str) -> Option<String>;

    fn set_cookie(&self, name: &str, value: &str, options: &CookieOptions);

    fn delete_cookie(&self, name: &str);

    /// Every cookie as `(name, value)`
    fn cookies(&self) -> Vec<(String, String)>;
}

/// In-process cookie jar
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: RwLock<BTreeMap<String, (String, CookieOptions)>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attributes the named cookie was last written with
    pub fn options(&self, name: &str) -> Option<CookieOptions> {
        self.cookies
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|(_, options)| options.clone())
    }

    pub fn len(&self) -> usize {
        self.cookies.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CookieStore for MemoryCookieJar {
    fn get_cookie(&self, name: &str) -> Option<String> {
        self.cookies
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|(value, _)| value.clone())
    }

    fn set_cookie(&self, name: &str, value: &str, options: &CookieOptions) {
        self.cookies
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), (value.to_string(), options.clone()));
    }

    fn delete_cookie(&self, name: &str) {
        self.cookies
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
    }

    fn cookies(&self) -> Vec<(String, String)> {
        self.cookies
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, (value, _))| (name.clone(), value.clone()))
            .collect()
    }
}
