//! lastgood Telemetry - Observability Sinks
//!
//! Structured logging and Prometheus metrics for cache policy executions,
//! both delivered as [`InstrumentationSink`](lastgood_policy::InstrumentationSink)
//! implementations. Combine them with
//! [`FanoutSink`](lastgood_policy::FanoutSink) to get both.

pub mod error;
pub mod metrics;
pub mod tracer;
pub mod tracing_sink;

pub use error::TelemetryError;
pub use metrics::{PolicyMetrics, PrometheusSink};
pub use tracer::{init_tracing, TelemetryConfig};
pub use tracing_sink::TracingSink;
