//! Freshness evaluation for cached values.
//!
//! The policy engine asks exactly one question of a cached value: may it be
//! served without a backend call? [`FreshnessPolicy`] answers it. Evaluation
//! is pure and total; anything that cannot be judged is reported as stale so
//! the engine refetches rather than silently serving old data.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::value::{CacheValue, EntryMetadata};

type FreshnessPredicate = dyn Fn(&EntryMetadata, DateTime<Utc>) -> bool + Send + Sync;

/// Rule used to decide whether a cached value is fresh.
#[derive(Clone, Default)]
pub enum FreshnessPolicy {
    /// Honor the window stamped on each entry when it was written.
    #[default]
    EntryWindow,

    /// Ignore the stamped window; an entry is fresh for `ttl` after it was
    /// stored.
    FixedTtl(Duration),

    /// Entries stored before the cutoff are stale. Entries stored at or after
    /// it are judged by their own window.
    ///
    /// Useful after a known upstream change that invalidates everything
    /// cached earlier.
    NotBefore(DateTime<Utc>),

    /// Caller-supplied predicate.
    Custom(Arc<FreshnessPredicate>),
}

impl FreshnessPolicy {
    /// Create a FixedTtl policy.
    pub fn fixed_ttl(ttl: Duration) -> Self {
        Self::FixedTtl(ttl)
    }

    /// Create a NotBefore policy.
    pub fn not_before(cutoff: DateTime<Utc>) -> Self {
        Self::NotBefore(cutoff)
    }

    /// Create a policy from a predicate over entry metadata and the current time.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&EntryMetadata, DateTime<Utc>) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// Whether `value` may be served at `now` without consulting the backend.
    pub fn is_fresh<T>(&self, value: &CacheValue<T>, now: DateTime<Utc>) -> bool {
        self.evaluate(&value.metadata(), now)
    }

    /// Evaluate the rule against bare metadata.
    pub fn evaluate(&self, entry: &EntryMetadata, now: DateTime<Utc>) -> bool {
        match self {
            Self::EntryWindow => within_window(entry, now),
            Self::FixedTtl(ttl) => {
                if ttl.is_zero() {
                    return false;
                }
                chrono::Duration::from_std(*ttl)
                    .ok()
                    .and_then(|ttl| entry.stored_at.checked_add_signed(ttl))
                    .map(|expires_at| now < expires_at)
                    .unwrap_or(false)
            }
            Self::NotBefore(cutoff) => entry.stored_at >= *cutoff && within_window(entry, now),
            Self::Custom(predicate) => predicate(entry, now),
        }
    }
}

fn within_window(entry: &EntryMetadata, now: DateTime<Utc>) -> bool {
    entry
        .expires_at()
        .map(|expires_at| now < expires_at)
        .unwrap_or(false)
}

impl fmt::Debug for FreshnessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EntryWindow => f.write_str("EntryWindow"),
            Self::FixedTtl(ttl) => f.debug_tuple("FixedTtl").field(ttl).finish(),
            Self::NotBefore(cutoff) => f.debug_tuple("NotBefore").field(cutoff).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FreshnessWindow;
    use proptest::prelude::*;

    fn seconds(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    #[test]
    fn test_entry_window_ttl() {
        let now = Utc::now();
        let policy = FreshnessPolicy::default();

        let fresh = CacheValue::with_ttl("a", now - seconds(10), Duration::from_secs(60));
        let stale = CacheValue::with_ttl("a", now - seconds(120), Duration::from_secs(60));

        assert!(policy.is_fresh(&fresh, now));
        assert!(!policy.is_fresh(&stale, now));
    }

    #[test]
    fn test_entry_window_absolute_expiry() {
        let now = Utc::now();
        let policy = FreshnessPolicy::EntryWindow;

        let fresh = CacheValue::expiring_at("a", now - seconds(10), now + seconds(1));
        let stale = CacheValue::expiring_at("a", now - seconds(10), now - seconds(1));

        assert!(policy.is_fresh(&fresh, now));
        assert!(!policy.is_fresh(&stale, now));
    }

    #[test]
    fn test_expiry_instant_itself_is_stale() {
        let now = Utc::now();
        let value = CacheValue::expiring_at("a", now - seconds(10), now);
        assert!(!FreshnessPolicy::EntryWindow.is_fresh(&value, now));
    }

    #[test]
    fn test_unspecified_window_is_never_fresh() {
        let now = Utc::now();
        let value = CacheValue::new("a", now, FreshnessWindow::Unspecified);
        assert!(!FreshnessPolicy::EntryWindow.is_fresh(&value, now));
    }

    #[test]
    fn test_fixed_ttl_ignores_entry_window() {
        let now = Utc::now();
        let policy = FreshnessPolicy::fixed_ttl(Duration::from_secs(30));

        // Entry thinks it is fresh for an hour; the policy says 30s.
        let value = CacheValue::with_ttl("a", now - seconds(45), Duration::from_secs(3600));
        assert!(!policy.is_fresh(&value, now));

        // Entry has no window at all; the policy still judges it.
        let value = CacheValue::new("a", now - seconds(5), FreshnessWindow::Unspecified);
        assert!(policy.is_fresh(&value, now));
    }

    #[test]
    fn test_fixed_ttl_zero_is_never_fresh() {
        let now = Utc::now();
        let policy = FreshnessPolicy::fixed_ttl(Duration::ZERO);
        let value = CacheValue::with_ttl("a", now, Duration::from_secs(60));
        assert!(!policy.is_fresh(&value, now));
    }

    #[test]
    fn test_not_before_cutoff() {
        let now = Utc::now();
        let cutoff = now - seconds(60);
        let policy = FreshnessPolicy::not_before(cutoff);

        let before = CacheValue::with_ttl("a", cutoff - seconds(1), Duration::from_secs(3600));
        let after = CacheValue::with_ttl("a", cutoff + seconds(1), Duration::from_secs(3600));

        assert!(!policy.is_fresh(&before, now));
        assert!(policy.is_fresh(&after, now));
    }

    #[test]
    fn test_custom_predicate() {
        let now = Utc::now();
        let policy = FreshnessPolicy::custom(|entry, now| entry.age(now) < Duration::from_secs(5));

        let young = CacheValue::new("a", now - seconds(1), FreshnessWindow::Unspecified);
        let old = CacheValue::new("a", now - seconds(10), FreshnessWindow::Unspecified);

        assert!(policy.is_fresh(&young, now));
        assert!(!policy.is_fresh(&old, now));
        assert_eq!(format!("{:?}", policy), "Custom(..)");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Property: with a TTL window, freshness is exactly `age < ttl`.
        #[test]
        fn prop_ttl_window_matches_age(age_secs in 0i64..10_000, ttl_secs in 0u64..10_000) {
            let now = Utc::now();
            let value = CacheValue::with_ttl((), now - seconds(age_secs), Duration::from_secs(ttl_secs));
            let fresh = FreshnessPolicy::EntryWindow.is_fresh(&value, now);
            prop_assert_eq!(fresh, (age_secs as u64) < ttl_secs);
        }

        /// Property: evaluation is pure; asking twice gives the same answer.
        #[test]
        fn prop_evaluation_is_deterministic(age_secs in 0i64..10_000, ttl_secs in 0u64..10_000) {
            let now = Utc::now();
            let value = CacheValue::with_ttl((), now - seconds(age_secs), Duration::from_secs(ttl_secs));
            let policy = FreshnessPolicy::fixed_ttl(Duration::from_secs(ttl_secs));
            prop_assert_eq!(policy.is_fresh(&value, now), policy.is_fresh(&value, now));
        }
    }
}
