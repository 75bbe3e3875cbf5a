//! lastgood Core - Data Types
//!
//! Cache keys, freshness-bearing cache values, the freshness evaluator,
//! backend outcomes, the execution context and the error taxonomy. All other
//! lastgood crates depend on this one; it carries no storage and no policy
//! logic.

pub mod config;
pub mod context;
pub mod error;
pub mod freshness;
pub mod outcome;
pub mod value;

pub use config::PolicyConfig;
pub use context::{cancellation_pair, CancellationHandle, CancellationSignal, ExecutionContext};
pub use error::{BackendError, CacheError, ConfigError, PolicyError, PolicyResult, ProtocolStage};
pub use freshness::FreshnessPolicy;
pub use outcome::DelegateOutcome;
pub use value::{CacheKey, CacheValue, Cacheable, EntryMetadata, FreshnessWindow};
