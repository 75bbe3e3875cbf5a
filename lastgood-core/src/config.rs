//! Policy configuration.
//!
//! Configuration is loaded from environment variables with defaults that
//! match a fire-and-forget write-back and fallback enabled.

use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_ENTRY_TTL_SECS: &str = "LASTGOOD_ENTRY_TTL_SECS";
pub const ENV_WRITE_BACK_RETRIES: &str = "LASTGOOD_WRITE_BACK_RETRIES";
pub const ENV_FALLBACK_ENABLED: &str = "LASTGOOD_FALLBACK_ENABLED";

/// Configuration for a cache policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Freshness window stamped on values written back after a backend fetch.
    pub entry_ttl: Duration,

    /// Extra write-back attempts after a failed cache set.
    ///
    /// Zero means a single attempt. However many attempts run, the set is
    /// reported to instrumentation once, with the final outcome.
    pub write_back_retries: u32,

    /// Serve a stale cached value when the backend fails.
    pub fallback_enabled: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(300), // 5 minutes
            write_back_retries: 0,
            fallback_enabled: true,
        }
    }
}

impl PolicyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the write-back TTL.
    pub fn with_entry_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Set the number of write-back retries.
    pub fn with_write_back_retries(mut self, retries: u32) -> Self {
        self.write_back_retries = retries;
        self
    }

    /// Enable or disable stale fallback.
    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    /// Create PolicyConfig from environment variables, falling back to
    /// defaults for anything missing or malformed.
    ///
    /// Environment variables:
    /// - `LASTGOOD_ENTRY_TTL_SECS`: write-back TTL in seconds (default: 300)
    /// - `LASTGOOD_WRITE_BACK_RETRIES`: extra write-back attempts (default: 0)
    /// - `LASTGOOD_FALLBACK_ENABLED`: "true" or "false" (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let lookup = |name: &str| std::env::var(name).ok();

        Self {
            entry_ttl: parse_u64(&lookup, ENV_ENTRY_TTL_SECS)
                .ok()
                .flatten()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.entry_ttl),
            write_back_retries: parse_u64(&lookup, ENV_WRITE_BACK_RETRIES)
                .ok()
                .flatten()
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.write_back_retries),
            fallback_enabled: parse_bool(&lookup, ENV_FALLBACK_ENABLED)
                .ok()
                .flatten()
                .unwrap_or(defaults.fallback_enabled),
        }
    }

    /// Strict variant of [`PolicyConfig::from_env`]: malformed values are errors.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let entry_ttl = parse_u64(&lookup, ENV_ENTRY_TTL_SECS)?
            .map(Duration::from_secs)
            .unwrap_or(defaults.entry_ttl);

        let write_back_retries = match parse_u64(&lookup, ENV_WRITE_BACK_RETRIES)? {
            Some(n) => u32::try_from(n).map_err(|_| ConfigError::InvalidValue {
                field: ENV_WRITE_BACK_RETRIES.to_string(),
                value: n.to_string(),
                reason: "must fit in u32".to_string(),
            })?,
            None => defaults.write_back_retries,
        };

        let fallback_enabled =
            parse_bool(&lookup, ENV_FALLBACK_ENABLED)?.unwrap_or(defaults.fallback_enabled);

        let config = Self {
            entry_ttl,
            write_back_retries,
            fallback_enabled,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entry_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "entry_ttl".to_string(),
                value: "0".to_string(),
                reason: "written-back values would never be fresh".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_u64<F>(lookup: &F, name: &str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                field: name.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

fn parse_bool<F>(lookup: &F, name: &str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue {
                field: name.to_string(),
                value: raw,
                reason: "expected true or false".to_string(),
            }),
        },
    }
}
