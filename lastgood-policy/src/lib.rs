//! lastgood Policy - Read-Through Cache with Stale Fallback
//!
//! [`CachePolicy`] wraps a backend fetch so that fresh cached values are
//! served without calling the backend, misses and stale entries are
//! refreshed from it, and backend failures fall back to whatever the cache
//! still holds. Each step is reported through an [`InstrumentationSink`].
//!
//! # Example
//!
//! ```ignore
//! use lastgood_policy::{CachePolicy, DelegateOutcome, PolicyConfig};
//! use lastgood_storage::InMemoryCacheStore;
//!
//! let policy = CachePolicy::with_store(
//!     Arc::new(InMemoryCacheStore::<String>::new()),
//!     PolicyConfig::from_env(),
//! );
//!
//! match policy.execute("user:42", |_| async { backend.name(42).await.into() }).await {
//!     Ok(name) => println!("{name}"),
//!     Err(e) => eprintln!("no data for {}: {}", e.key(), e),
//! }
//! ```

pub mod engine;
pub mod sink;

pub use engine::CachePolicy;
pub use sink::{
    BackendGetEvent, CacheGetEvent, CacheSetEvent, FanoutSink, InstrumentationSink, NoopSink,
};

// Re-exported so callers need a single import for the common path.
pub use lastgood_core::{
    BackendError, CacheKey, CacheValue, DelegateOutcome, ExecutionContext, FreshnessPolicy,
    PolicyConfig, PolicyError, PolicyResult,
};
