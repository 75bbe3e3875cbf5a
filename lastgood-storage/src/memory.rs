//! In-memory cache store.
//!
//! Uses `tokio::sync::RwLock` for safe async access. Optionally bounded: when
//! a new key would exceed the capacity, the entry with the oldest
//! `stored_at` is evicted first.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use lastgood_core::{CacheError, CacheKey, CacheValue, Cacheable};
use tokio::sync::RwLock;

use crate::traits::{CacheStats, CacheStore};

/// In-memory cache store keyed by [`CacheKey`].
#[derive(Debug)]
pub struct InMemoryCacheStore<T> {
    entries: RwLock<HashMap<CacheKey, CacheValue<T>>>,
    capacity: Option<NonZeroUsize>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
}

impl<T> Default for InMemoryCacheStore<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }
}

impl<T: Cacheable> InMemoryCacheStore<T> {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding at most `capacity` entries.
    ///
    /// Each eviction scans every entry under the write lock, so inserts into
    /// a full store cost O(n). Meant for tests and small working sets.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            ..Self::default()
        }
    }

    /// Seed an entry directly, bypassing statistics.
    pub async fn insert(&self, key: impl Into<CacheKey>, value: CacheValue<T>) {
        let mut entries = self.entries.write().await;
        self.insert_locked(&mut entries, key.into(), value);
    }

    /// Read an entry without touching statistics.
    pub async fn peek(&self, key: &CacheKey) -> Option<CacheValue<T>> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Snapshot of the store statistics.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            entry_count: self.entries.read().await.len() as u64,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn insert_locked(
        &self,
        entries: &mut HashMap<CacheKey, CacheValue<T>>,
        key: CacheKey,
        value: CacheValue<T>,
    ) {
        if let Some(capacity) = self.capacity {
            while !entries.contains_key(&key) && entries.len() >= capacity.get() {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, v)| v.stored_at())
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(oldest) => {
                        entries.remove(&oldest);
                        tracing::debug!(key = %oldest, "Evicted oldest cache entry");
                        self.evictions.fetch_add(1, Ordering::Relaxed);
                    }
                    None => break,
                }
            }
        }
        entries.insert(key, value);
    }
}

#[async_trait]
impl<T: Cacheable> CacheStore<T> for InMemoryCacheStore<T> {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheValue<T>>, CacheError> {
        let found = self.entries.read().await.get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        Ok(found)
    }

    async fn set(&self, key: &CacheKey, value: CacheValue<T>) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        self.insert_locked(&mut entries, key.clone(), value);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn value_at(payload: &str, seconds_ago: i64) -> CacheValue<String> {
        CacheValue::with_ttl(
            payload.to_string(),
            Utc::now() - chrono::Duration::seconds(seconds_ago),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = InMemoryCacheStore::<String>::new();
        let found = store
            .get(&CacheKey::from("user:42"))
            .await
            .expect("get should succeed");
        assert!(found.is_none());
        assert_eq!(store.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = InMemoryCacheStore::new();
        let key = CacheKey::from("user:42");
        let value = value_at("Alice", 0);

        store.set(&key, value.clone()).await.expect("set should succeed");
        let found = store.get(&key).await.expect("get should succeed");

        assert_eq!(found, Some(value));
        let stats = store.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_set_supersedes_previous_value() {
        let store = InMemoryCacheStore::new();
        let key = CacheKey::from("user:42");

        store.set(&key, value_at("Alice-old", 30)).await.expect("set should succeed");
        store.set(&key, value_at("Alice", 0)).await.expect("set should succeed");

        let found = store.peek(&key).await.expect("entry should exist");
        assert_eq!(found.value(), "Alice");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let store = InMemoryCacheStore::with_capacity(2);

        store.insert("a", value_at("a", 30)).await;
        store.insert("b", value_at("b", 10)).await;
        store
            .set(&CacheKey::from("c"), value_at("c", 0))
            .await
            .expect("set should succeed");

        assert_eq!(store.len().await, 2);
        assert!(store.peek(&CacheKey::from("a")).await.is_none());
        assert!(store.peek(&CacheKey::from("b")).await.is_some());
        assert!(store.peek(&CacheKey::from("c")).await.is_some());
        assert_eq!(store.stats().await.evictions, 1);
    }

    #[tokio::test]
    async fn test_overwrite_at_capacity_does_not_evict() {
        let store = InMemoryCacheStore::with_capacity(1);
        store.insert("a", value_at("a", 10)).await;
        store.insert("a", value_at("a2", 0)).await;

        assert_eq!(store.len().await, 1);
        assert_eq!(store.stats().await.evictions, 0);
    }
}
