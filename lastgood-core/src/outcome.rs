//! Result of a backend fetch.

use std::error::Error as StdError;

use crate::error::BackendError;

/// Outcome of invoking the backend fetch. Exactly one variant holds.
///
/// Backend failures travel as values rather than through `?`, so the engine's
/// fallback decision is a plain match on this type.
#[derive(Debug, Clone)]
pub enum DelegateOutcome<T> {
    Success(T),
    Failure(BackendError),
}

impl<T> DelegateOutcome<T> {
    /// Build a failure outcome from any error type.
    pub fn failure<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Failure(BackendError::new(error))
    }

    /// Convert a `Result` with an arbitrary error into an outcome.
    pub fn from_result<E>(result: Result<T, E>) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        match result {
            Ok(value) => Self::Success(value),
            Err(e) => Self::failure(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&BackendError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(e) => Some(e),
        }
    }

    pub fn into_result(self) -> Result<T, BackendError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(e) => Err(e),
        }
    }

    pub fn map<U, F>(self, f: F) -> DelegateOutcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Success(value) => DelegateOutcome::Success(f(value)),
            Self::Failure(e) => DelegateOutcome::Failure(e),
        }
    }
}

impl<T> From<Result<T, BackendError>> for DelegateOutcome<T> {
    fn from(result: Result<T, BackendError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(e) => Self::Failure(e),
        }
    }
}
