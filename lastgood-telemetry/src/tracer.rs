//! Tracing Subscriber Initialization
//!
//! Installs a global `tracing` subscriber with an env-driven filter and
//! either human-readable or JSON output.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{TelemetryError, TelemetryResult};

pub const ENV_SERVICE_NAME: &str = "LASTGOOD_SERVICE_NAME";
pub const ENV_SERVICE_VERSION: &str = "LASTGOOD_SERVICE_VERSION";
pub const ENV_ENVIRONMENT: &str = "LASTGOOD_ENVIRONMENT";
pub const ENV_LOG_JSON: &str = "LASTGOOD_LOG_JSON";

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "lastgood=debug,info";

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Environment (production, staging, development)
    pub environment: String,
    /// Emit JSON lines instead of human-readable output
    pub log_json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "lastgood".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            log_json: false,
        }
    }
}

impl TelemetryConfig {
    /// Read the configuration from the process environment.
    ///
    /// Environment variables:
    /// - `LASTGOOD_SERVICE_NAME` (default: "lastgood")
    /// - `LASTGOOD_SERVICE_VERSION` (default: crate version)
    /// - `LASTGOOD_ENVIRONMENT` (default: "development")
    /// - `LASTGOOD_LOG_JSON`: "true" or "1" for JSON output (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            service_name: lookup(ENV_SERVICE_NAME).unwrap_or(defaults.service_name),
            service_version: lookup(ENV_SERVICE_VERSION).unwrap_or(defaults.service_version),
            environment: lookup(ENV_ENVIRONMENT).unwrap_or(defaults.environment),
            log_json: lookup(ENV_LOG_JSON)
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.log_json),
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// This function should be called once at application startup before any
/// tracing occurs. A second call fails with
/// [`TelemetryError::SubscriberInit`].
pub fn init_tracing(config: &TelemetryConfig) -> TelemetryResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if config.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    tracing::info!(
        service_name = config.service_name,
        service_version = config.service_version,
        environment = config.environment,
        log_json = config.log_json,
        "Telemetry initialized"
    );

    Ok(())
}
