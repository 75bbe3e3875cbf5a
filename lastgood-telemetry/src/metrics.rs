//! Prometheus Metrics Definitions
//!
//! Defines the cache policy metrics with their labels and types. Metrics are
//! registered on a caller-supplied [`Registry`], so several policies (or
//! several tests) never collide on the process-wide default registry.

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

use lastgood_policy::{BackendGetEvent, CacheGetEvent, CacheSetEvent, InstrumentationSink};

use crate::error::{TelemetryError, TelemetryResult};

/// Sub-operation latency buckets (seconds)
/// Covers: 0.5ms, 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s
const OPERATION_LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0,
];

/// Container for all cache policy metrics.
#[derive(Clone)]
pub struct PolicyMetrics {
    registry: Registry,

    /// Cache lookups - labels: outcome (fresh_hit/stale_hit/miss/error)
    pub cache_get_total: CounterVec,

    /// Cache write-backs - labels: status (success/error)
    pub cache_set_total: CounterVec,

    /// Backend invocations - labels: status (success/fallback/error)
    pub backend_get_total: CounterVec,

    /// Sub-operation duration histogram - labels: operation
    pub operation_duration_seconds: HistogramVec,
}

impl PolicyMetrics {
    /// Create all metrics and register them with `registry`.
    pub fn new(registry: &Registry) -> TelemetryResult<Self> {
        let cache_get_total = CounterVec::new(
            Opts::new("lastgood_cache_get_total", "Total number of cache lookups"),
            &["outcome"],
        )?;
        let cache_set_total = CounterVec::new(
            Opts::new("lastgood_cache_set_total", "Total number of cache write-backs"),
            &["status"],
        )?;
        let backend_get_total = CounterVec::new(
            Opts::new("lastgood_backend_get_total", "Total number of backend invocations"),
            &["status"],
        )?;
        let operation_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "lastgood_operation_duration_seconds",
                "Cache policy sub-operation duration in seconds",
            )
            .buckets(OPERATION_LATENCY_BUCKETS.to_vec()),
            &["operation"],
        )?;

        registry.register(Box::new(cache_get_total.clone()))?;
        registry.register(Box::new(cache_set_total.clone()))?;
        registry.register(Box::new(backend_get_total.clone()))?;
        registry.register(Box::new(operation_duration_seconds.clone()))?;

        Ok(Self {
            registry: registry.clone(),
            cache_get_total,
            cache_set_total,
            backend_get_total,
            operation_duration_seconds,
        })
    }

    /// Record a cache lookup.
    pub fn record_cache_get(&self, outcome: &str, duration_secs: f64) {
        self.cache_get_total.with_label_values(&[outcome]).inc();
        self.operation_duration_seconds
            .with_label_values(&["cache_get"])
            .observe(duration_secs);
    }

    /// Record a cache write-back.
    pub fn record_cache_set(&self, success: bool, duration_secs: f64) {
        let status = if success { "success" } else { "error" };
        self.cache_set_total.with_label_values(&[status]).inc();
        self.operation_duration_seconds
            .with_label_values(&["cache_set"])
            .observe(duration_secs);
    }

    /// Record a backend invocation.
    pub fn record_backend_get(&self, status: &str, duration_secs: f64) {
        self.backend_get_total.with_label_values(&[status]).inc();
        self.operation_duration_seconds
            .with_label_values(&["backend_get"])
            .observe(duration_secs);
    }

    /// Render the registry in Prometheus text format.
    pub fn encode(&self) -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| TelemetryError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Encoding(e.to_string()))
    }
}

impl std::fmt::Debug for PolicyMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyMetrics").finish_non_exhaustive()
    }
}

fn cache_get_outcome(event: &CacheGetEvent<'_>) -> &'static str {
    match (event.is_success, event.is_cache_hit, event.is_cache_fresh) {
        (false, _, _) => "error",
        (true, true, true) => "fresh_hit",
        (true, true, false) => "stale_hit",
        (true, false, _) => "miss",
    }
}

/// Instrumentation sink that feeds [`PolicyMetrics`].
#[derive(Debug, Clone)]
pub struct PrometheusSink {
    metrics: PolicyMetrics,
}

impl PrometheusSink {
    pub fn new(metrics: PolicyMetrics) -> Self {
        Self { metrics }
    }

    /// Create metrics on `registry` and wrap them.
    pub fn register(registry: &Registry) -> TelemetryResult<Self> {
        Ok(Self::new(PolicyMetrics::new(registry)?))
    }

    pub fn metrics(&self) -> &PolicyMetrics {
        &self.metrics
    }
}

impl<T> InstrumentationSink<T> for PrometheusSink {
    fn on_cache_get(&self, event: &CacheGetEvent<'_>) {
        self.metrics
            .record_cache_get(cache_get_outcome(event), event.latency.as_secs_f64());
    }

    fn on_cache_set(&self, event: &CacheSetEvent<'_>) {
        self.metrics
            .record_cache_set(event.is_success, event.latency.as_secs_f64());
    }

    fn on_backend_get(&self, event: &BackendGetEvent<'_, T>) {
        let status = match (event.is_success, event.is_fallback_to_cache) {
            (true, _) => "success",
            (false, true) => "fallback",
            (false, false) => "error",
        };
        self.metrics
            .record_backend_get(status, event.latency.as_secs_f64());
    }
}
