//! Error types for lastgood operations

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::value::CacheKey;

/// Cache store errors.
///
/// Every variant carries the `CacheUnavailable` meaning: the policy engine
/// absorbs them (miss on the read path, log-and-continue on the write path)
/// and never hands them to its caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Serialization failed for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

impl CacheError {
    /// Shorthand for [`CacheError::Unavailable`].
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Failure reported by a backend fetch.
///
/// Wraps the caller's own error type behind an `Arc` so the same failure can
/// be handed to instrumentation and then surfaced inside [`PolicyError`]
/// without losing the original cause. Use [`BackendError::downcast_ref`] to
/// get the concrete error back.
#[derive(Clone)]
pub struct BackendError {
    inner: Arc<dyn StdError + Send + Sync + 'static>,
}

#[derive(Debug, Error)]
#[error("{0}")]
struct MessageError(String);

impl BackendError {
    /// Wrap an arbitrary error.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(error),
        }
    }

    /// Build a backend error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(MessageError(message.into()))
    }

    /// Attempt to view the wrapped error as a concrete type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.inner.downcast_ref::<E>()
    }

    /// Whether the wrapped error is of type `E`.
    pub fn is<E>(&self) -> bool
    where
        E: StdError + 'static,
    {
        self.inner.is::<E>()
    }

    /// Borrow the wrapped error.
    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.inner.as_ref()
    }
}

impl fmt::Debug for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BackendError").field(&self.inner).finish()
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for BackendError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

/// Step of the read-through protocol, used to report where a cancellation hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolStage {
    CacheLookup,
    BackendInvoke,
    WriteBack,
}

impl ProtocolStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CacheLookup => "cache_lookup",
            Self::BackendInvoke => "backend_invoke",
            Self::WriteBack => "write_back",
        }
    }
}

impl fmt::Display for ProtocolStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The only error a policy execution returns to its caller.
#[derive(Debug, Clone, Error)]
pub enum PolicyError {
    /// The backend failed and no cached value was available to fall back to.
    #[error("No cached fallback for key {key}, backend failed: {cause}")]
    NoFallback {
        key: CacheKey,
        #[source]
        cause: BackendError,
    },

    /// The caller cancelled the execution through its context.
    #[error("Execution for key {key} cancelled during {stage}")]
    Cancelled { key: CacheKey, stage: ProtocolStage },
}

impl PolicyError {
    /// The original backend error, if this failure wraps one.
    pub fn cause(&self) -> Option<&BackendError> {
        match self {
            Self::NoFallback { cause, .. } => Some(cause),
            Self::Cancelled { .. } => None,
        }
    }

    /// Key of the execution that failed.
    pub fn key(&self) -> &CacheKey {
        match self {
            Self::NoFallback { key, .. } | Self::Cancelled { key, .. } => key,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result type alias for policy executions.
pub type PolicyResult<T> = Result<T, PolicyError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error, PartialEq)]
    #[error("upstream timed out after {0}ms")]
    struct UpstreamTimeout(u64);

    #[test]
    fn test_cache_error_display_unavailable() {
        let err = CacheError::unavailable("connection refused");
        let msg = format!("{}", err);
        assert!(msg.contains("Cache unavailable"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "LASTGOOD_ENTRY_TTL_SECS".to_string(),
            value: "soon".to_string(),
            reason: "must be an integer".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("LASTGOOD_ENTRY_TTL_SECS"));
        assert!(msg.contains("soon"));
        assert!(msg.contains("must be an integer"));
    }

    #[test]
    fn test_backend_error_downcast_recovers_original() {
        let err = BackendError::new(UpstreamTimeout(250));
        assert!(err.is::<UpstreamTimeout>());
        assert_eq!(err.downcast_ref::<UpstreamTimeout>(), Some(&UpstreamTimeout(250)));
        assert_eq!(err.to_string(), "upstream timed out after 250ms");
    }

    #[test]
    fn test_backend_error_msg() {
        let err = BackendError::msg("503 from upstream");
        assert_eq!(err.to_string(), "503 from upstream");
        assert!(!err.is::<UpstreamTimeout>());
    }

    #[test]
    fn test_policy_error_no_fallback_exposes_cause() {
        let err = PolicyError::NoFallback {
            key: CacheKey::from("user:42"),
            cause: BackendError::new(UpstreamTimeout(100)),
        };
        let cause = err.cause().expect("no-fallback carries a cause");
        assert!(cause.is::<UpstreamTimeout>());
        assert_eq!(err.key().as_str(), "user:42");
        assert!(!err.is_cancelled());

        let source = StdError::source(&err).expect("cause is the error source");
        assert_eq!(source.to_string(), "upstream timed out after 100ms");
    }

    #[test]
    fn test_policy_error_cancelled_display() {
        let err = PolicyError::Cancelled {
            key: CacheKey::from("user:42"),
            stage: ProtocolStage::BackendInvoke,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("user:42"));
        assert!(msg.contains("backend_invoke"));
        assert!(err.is_cancelled());
        assert!(err.cause().is_none());
    }
}
