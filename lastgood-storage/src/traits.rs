//! Cache store trait and statistics.

use async_trait::async_trait;
use lastgood_core::{CacheError, CacheKey, CacheValue, Cacheable};

/// Cache store trait for pluggable storage backends.
///
/// This trait abstracts over different stores (in-memory, LMDB, a remote
/// key-value service). Implementations must be safe for concurrent use by
/// many policy executions at once.
///
/// # Contract
///
/// - `get` returns `Ok(None)` for an absent key. `Err` is reserved for
///   infrastructure failures (timeouts, connection loss, corrupt data).
/// - `set` replaces whatever was stored under the key. Repeating an
///   identical `set` is harmless.
/// - Eviction is the store's own business; the policy engine never deletes.
///
/// # Serialization
///
/// Implementations that leave the process are responsible for serializing
/// the whole [`CacheValue`], freshness metadata included.
#[async_trait]
pub trait CacheStore<T: Cacheable>: Send + Sync {
    /// Get the value stored under `key`, or `None` if there is none.
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheValue<T>>, CacheError>;

    /// Store `value` under `key`, superseding any previous value.
    async fn set(&self, key: &CacheKey, value: CacheValue<T>) -> Result<(), CacheError>;
}

/// Statistics about store usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of gets that found an entry.
    pub hits: u64,
    /// Number of gets that found nothing.
    pub misses: u64,
    /// Number of successful sets.
    pub writes: u64,
    /// Number of entries currently stored.
    pub entry_count: u64,
    /// Number of entries evicted due to capacity.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }
}
