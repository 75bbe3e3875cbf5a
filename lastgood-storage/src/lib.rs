//! lastgood Storage - Cache Store Trait and Implementations
//!
//! Defines the [`CacheStore`] boundary the policy engine consumes and ships
//! two stores behind it: an in-memory map for single-process use and tests,
//! and an LMDB-backed store for values that must survive restarts.
//!
//! Stores report only infrastructure failures as errors. A missing key is
//! `Ok(None)`, never an error.

pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use lmdb_backend::{LmdbCacheError, LmdbCacheStore};
pub use memory::InMemoryCacheStore;
pub use traits::{CacheStats, CacheStore};
