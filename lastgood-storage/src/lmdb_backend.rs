//! LMDB-backed cache store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store for cached values that must outlive the process.
//!
//! # Layout
//!
//! One unnamed database. Keys are the UTF-8 bytes of the [`CacheKey`];
//! values are the JSON encoding of the whole [`CacheValue`], so the
//! freshness metadata survives a restart together with the payload.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The store uses:
//! - Read transactions for `get`
//! - Write transactions for `set`
//! - Statistics are tracked with atomic counters

use std::marker::PhantomData;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use lastgood_core::{CacheError, CacheKey, CacheValue, Cacheable};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::traits::{CacheStats, CacheStore};

/// Error type for opening an LMDB store.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbCacheError to CacheError.
impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        CacheError::Unavailable {
            reason: e.to_string(),
        }
    }
}

fn transaction_error(e: heed::Error) -> CacheError {
    CacheError::from(LmdbCacheError::Transaction(e.to_string()))
}

/// LMDB-backed cache store for values of type `T`.
///
/// # Example
///
/// ```ignore
/// use lastgood_storage::LmdbCacheStore;
///
/// let store = LmdbCacheStore::<UserProfile>::open("/var/cache/profiles", 100)?;
/// let policy = CachePolicy::with_store(Arc::new(store), PolicyConfig::default());
/// ```
pub struct LmdbCacheStore<T> {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> LmdbCacheStore<T> {
    /// Open (or create) an LMDB store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        let map_size = max_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| LmdbCacheError::EnvOpen(format!("map size of {max_size_mb} MB overflows")))?;
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per store and never opened
        // twice in the same process for the same path by this type.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            _marker: PhantomData,
        })
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> Result<u64, CacheError> {
        let rtxn = self.env.read_txn().map_err(transaction_error)?;
        self.db.len(&rtxn).map_err(transaction_error)
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    /// Snapshot of the store statistics.
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            entry_count: self.len()?,
            evictions: 0, // LMDB doesn't evict
        })
    }
}

#[async_trait]
impl<T> CacheStore<T> for LmdbCacheStore<T>
where
    T: Cacheable + Serialize + DeserializeOwned,
{
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheValue<T>>, CacheError> {
        let rtxn = self.env.read_txn().map_err(transaction_error)?;

        let bytes = match self.db.get(&rtxn, key.as_str().as_bytes()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
            Err(e) => return Err(transaction_error(e)),
        };

        let value: CacheValue<T> =
            serde_json::from_slice(bytes).map_err(|e| CacheError::Serialization {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(value))
    }

    async fn set(&self, key: &CacheKey, value: CacheValue<T>) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(&value).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let mut wtxn = self.env.write_txn().map_err(transaction_error)?;
        self.db
            .put(&mut wtxn, key.as_str().as_bytes(), &bytes)
            .map_err(transaction_error)?;
        wtxn.commit().map_err(transaction_error)?;

        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
