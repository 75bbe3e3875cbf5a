//! Cache keys and freshness-bearing cache values.

use std::borrow::Borrow;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Capability required of anything the policy engine caches.
///
/// Values are cloned once on write-back (one copy goes to the store, one to
/// the caller) and may cross task boundaries.
pub trait Cacheable: Clone + Send + Sync + 'static {}

impl<T> Cacheable for T where T: Clone + Send + Sync + 'static {}

/// Opaque cache key. Equal keys denote the same cached entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&CacheKey> for CacheKey {
    fn from(key: &CacheKey) -> Self {
        key.clone()
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Validity criterion stamped on a cached value when it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FreshnessWindow {
    /// Fresh for this long after `stored_at`.
    Ttl(Duration),
    /// Fresh until this instant.
    ExpiresAt(DateTime<Utc>),
    /// No criterion. Never fresh.
    #[default]
    Unspecified,
}

impl FreshnessWindow {
    /// The instant this window closes for a value stored at `stored_at`.
    ///
    /// `None` when the window is unspecified or the TTL overflows the
    /// calendar; both are treated as "not fresh" by the evaluator.
    pub fn expires_at(&self, stored_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Ttl(ttl) => chrono::Duration::from_std(*ttl)
                .ok()
                .and_then(|ttl| stored_at.checked_add_signed(ttl)),
            Self::ExpiresAt(at) => Some(*at),
            Self::Unspecified => None,
        }
    }
}

/// Freshness metadata of a cached value, without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMetadata {
    pub stored_at: DateTime<Utc>,
    pub window: FreshnessWindow,
}

impl EntryMetadata {
    /// Age of the entry at `now`, clamped at zero for entries from the future.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.stored_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.window.expires_at(self.stored_at)
    }
}

/// A cached result plus the metadata needed to judge its freshness.
///
/// Immutable once built: refreshing a key means storing a new `CacheValue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheValue<T> {
    value: T,
    stored_at: DateTime<Utc>,
    window: FreshnessWindow,
}

impl<T> CacheValue<T> {
    pub fn new(value: T, stored_at: DateTime<Utc>, window: FreshnessWindow) -> Self {
        Self {
            value,
            stored_at,
            window,
        }
    }

    /// Value that stays fresh for `ttl` after `stored_at`.
    pub fn with_ttl(value: T, stored_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self::new(value, stored_at, FreshnessWindow::Ttl(ttl))
    }

    /// Value that stays fresh until `expires_at`.
    pub fn expiring_at(value: T, stored_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self::new(value, stored_at, FreshnessWindow::ExpiresAt(expires_at))
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn stored_at(&self) -> DateTime<Utc> {
        self.stored_at
    }

    pub fn window(&self) -> FreshnessWindow {
        self.window
    }

    pub fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            stored_at: self.stored_at,
            window: self.window,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        self.metadata().age(now)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.metadata().expires_at()
    }

    /// Build a new value with the same metadata and a transformed payload.
    pub fn map<U, F>(self, f: F) -> CacheValue<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheValue {
            value: f(self.value),
            stored_at: self.stored_at,
            window: self.window,
        }
    }
}

impl<T> AsRef<T> for CacheValue<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
