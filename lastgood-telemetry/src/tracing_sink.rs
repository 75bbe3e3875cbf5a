//! Structured logging sink.
//!
//! Failures and fallbacks are logged at `warn`, everything else at `debug`.

use lastgood_policy::{BackendGetEvent, CacheGetEvent, CacheSetEvent, InstrumentationSink};

/// Instrumentation sink that turns every event into a `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        Self
    }
}

impl<T> InstrumentationSink<T> for TracingSink {
    fn on_cache_get(&self, event: &CacheGetEvent<'_>) {
        let ctx = event.context;
        match event.failure {
            Some(error) => tracing::warn!(
                key = %event.key,
                success = false,
                latency_ms = event.latency_ms(),
                error = %error,
                correlation_id = ctx.correlation_id(),
                operation = ctx.operation_key(),
                "Cache get failed"
            ),
            None => tracing::debug!(
                key = %event.key,
                success = true,
                cache_hit = event.is_cache_hit,
                cache_fresh = event.is_cache_fresh,
                latency_ms = event.latency_ms(),
                correlation_id = ctx.correlation_id(),
                operation = ctx.operation_key(),
                "Cache get"
            ),
        }
    }

    fn on_cache_set(&self, event: &CacheSetEvent<'_>) {
        let ctx = event.context;
        match event.failure {
            Some(error) => tracing::warn!(
                key = %event.key,
                success = false,
                latency_ms = event.latency_ms(),
                error = %error,
                correlation_id = ctx.correlation_id(),
                operation = ctx.operation_key(),
                "Cache set failed"
            ),
            None => tracing::debug!(
                key = %event.key,
                success = true,
                latency_ms = event.latency_ms(),
                correlation_id = ctx.correlation_id(),
                operation = ctx.operation_key(),
                "Cache set"
            ),
        }
    }

    fn on_backend_get(&self, event: &BackendGetEvent<'_, T>) {
        let ctx = event.context;
        match event.outcome.error() {
            Some(error) if event.is_fallback_to_cache => tracing::warn!(
                key = %event.key,
                success = false,
                fallback = true,
                latency_ms = event.latency_ms(),
                error = %error,
                correlation_id = ctx.correlation_id(),
                operation = ctx.operation_key(),
                "Backend get failed, falling back to cached value"
            ),
            Some(error) => tracing::warn!(
                key = %event.key,
                success = false,
                fallback = false,
                latency_ms = event.latency_ms(),
                error = %error,
                correlation_id = ctx.correlation_id(),
                operation = ctx.operation_key(),
                "Backend get failed"
            ),
            None => tracing::debug!(
                key = %event.key,
                success = true,
                fallback = false,
                latency_ms = event.latency_ms(),
                correlation_id = ctx.correlation_id(),
                operation = ctx.operation_key(),
                "Backend get"
            ),
        }
    }
}
