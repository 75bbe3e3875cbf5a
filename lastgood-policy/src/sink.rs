//! Instrumentation boundary.
//!
//! The engine reports every completed sub-operation (cache get, cache set,
//! backend get) to an [`InstrumentationSink`]. Events borrow from the
//! execution that produced them; sinks that need to keep data must copy it.
//!
//! Sinks are fire-and-forget. A panicking sink is caught by the engine and
//! logged through `tracing`; it never changes the result of an execution.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use lastgood_core::{CacheError, CacheKey, Cacheable, DelegateOutcome, ExecutionContext};

fn duration_ms(latency: Duration) -> u64 {
    u64::try_from(latency.as_millis()).unwrap_or(u64::MAX)
}

/// Reported after every cache lookup.
#[derive(Debug)]
pub struct CacheGetEvent<'a> {
    pub key: &'a CacheKey,
    /// False only when the store itself failed.
    pub is_success: bool,
    /// True iff an entry was found.
    pub is_cache_hit: bool,
    /// Only meaningful when `is_cache_hit` is true.
    pub is_cache_fresh: bool,
    pub latency: Duration,
    pub failure: Option<&'a CacheError>,
    pub context: &'a ExecutionContext,
}

impl CacheGetEvent<'_> {
    pub fn latency_ms(&self) -> u64 {
        duration_ms(self.latency)
    }
}

/// Reported after a write-back (or warm-up) completes, retries included.
#[derive(Debug)]
pub struct CacheSetEvent<'a> {
    pub key: &'a CacheKey,
    pub is_success: bool,
    /// Summed over all attempts.
    pub latency: Duration,
    pub failure: Option<&'a CacheError>,
    pub context: &'a ExecutionContext,
}

impl CacheSetEvent<'_> {
    pub fn latency_ms(&self) -> u64 {
        duration_ms(self.latency)
    }
}

/// Reported after every backend invocation.
#[derive(Debug)]
pub struct BackendGetEvent<'a, T> {
    pub key: &'a CacheKey,
    pub is_success: bool,
    /// True when a stale cached value is returned in place of the failure.
    pub is_fallback_to_cache: bool,
    pub latency: Duration,
    pub outcome: &'a DelegateOutcome<T>,
    pub context: &'a ExecutionContext,
}

impl<T> BackendGetEvent<'_, T> {
    pub fn latency_ms(&self) -> u64 {
        duration_ms(self.latency)
    }
}

/// Consumer of policy instrumentation events.
///
/// All methods default to doing nothing, so a sink only overrides the events
/// it cares about.
pub trait InstrumentationSink<T>: Send + Sync {
    fn on_cache_get(&self, _event: &CacheGetEvent<'_>) {}

    fn on_cache_set(&self, _event: &CacheSetEvent<'_>) {}

    fn on_backend_get(&self, _event: &BackendGetEvent<'_, T>) {}
}

/// Sink that ignores every event. The engine's default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl<T> InstrumentationSink<T> for NoopSink {}

/// Forwards every event to several sinks, in registration order.
///
/// A panic in one sink does not keep the others from seeing the event.
pub struct FanoutSink<T> {
    sinks: Vec<Arc<dyn InstrumentationSink<T>>>,
}

impl<T: Cacheable> FanoutSink<T> {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with_sink(mut self, sink: Arc<dyn InstrumentationSink<T>>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn push(&mut self, sink: Arc<dyn InstrumentationSink<T>>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl<T: Cacheable> Default for FanoutSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for FanoutSink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl<T: Cacheable> InstrumentationSink<T> for FanoutSink<T> {
    fn on_cache_get(&self, event: &CacheGetEvent<'_>) {
        for sink in &self.sinks {
            shielded("on_cache_get", event.key, || sink.on_cache_get(event));
        }
    }

    fn on_cache_set(&self, event: &CacheSetEvent<'_>) {
        for sink in &self.sinks {
            shielded("on_cache_set", event.key, || sink.on_cache_set(event));
        }
    }

    fn on_backend_get(&self, event: &BackendGetEvent<'_, T>) {
        for sink in &self.sinks {
            shielded("on_backend_get", event.key, || sink.on_backend_get(event));
        }
    }
}

/// Run a sink callback, swallowing any panic into the error log.
pub(crate) fn shielded<F: FnOnce()>(hook: &'static str, key: &CacheKey, f: F) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        tracing::error!(
            hook,
            key = %key,
            panic = %message,
            "Instrumentation sink panicked, event dropped"
        );
    }
}
