//! Telemetry error types.

use thiserror::Error;

/// Errors raised while setting up logging or metrics.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to register metric: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Failed to encode metrics: {0}")]
    Encoding(String),

    #[error("Failed to init subscriber: {0}")]
    SubscriberInit(String),
}

/// Result type alias for telemetry setup.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
