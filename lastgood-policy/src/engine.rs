//! Read-through cache policy with stale fallback.
//!
//! One execution runs, strictly in order:
//!
//! 1. **Cache lookup** - `store.get(key)`, timed. A store failure counts as a
//!    miss for every decision that follows.
//! 2. **Fresh hit** - the cached value is returned; the backend is never
//!    invoked.
//! 3. **Backend invoke** - on a miss or a stale hit, the caller's fetch runs.
//!    - success: the value is written back (best effort) and returned
//!    - failure with a stale hit: the stale value is returned
//!    - failure with nothing cached: [`PolicyError::NoFallback`]
//!
//! Every completed step is reported to the [`InstrumentationSink`] exactly
//! once. A step interrupted by cancellation, or never reached, is not
//! reported.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use lastgood_core::{
    CacheError, CacheKey, CacheValue, Cacheable, DelegateOutcome, ExecutionContext,
    FreshnessPolicy, PolicyConfig, PolicyError, PolicyResult, ProtocolStage,
};
use lastgood_storage::CacheStore;

use crate::sink::{
    shielded, BackendGetEvent, CacheGetEvent, CacheSetEvent, InstrumentationSink, NoopSink,
};

/// Result of the cache lookup step.
enum Lookup<T> {
    NotFound,
    Stale(CacheValue<T>),
    Fresh(CacheValue<T>),
}

impl<T> Lookup<T> {
    fn is_hit(&self) -> bool {
        !matches!(self, Lookup::NotFound)
    }

    fn is_fresh(&self) -> bool {
        matches!(self, Lookup::Fresh(_))
    }
}

/// Read-through cache policy.
///
/// The policy is stateless between executions and safe to share: clone it or
/// put it behind an `Arc`, and call [`CachePolicy::execute_with_context`]
/// from as many tasks as needed. Concurrent executions for the same key are
/// not de-duplicated.
///
/// # Type Parameters
///
/// - `T`: the cached result type
/// - `S`: the cache store
/// - `I`: the instrumentation sink, [`NoopSink`] unless one is supplied
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(InMemoryCacheStore::<String>::new());
/// let policy = CachePolicy::with_store(store, PolicyConfig::default())
///     .with_sink(Arc::new(TracingSink::new()));
///
/// let name = policy
///     .execute("user:42", |ctx| async move { fetch_user_name(ctx).await.into() })
///     .await?;
/// ```
pub struct CachePolicy<T, S: ?Sized, I: ?Sized = NoopSink> {
    store: Arc<S>,
    sink: Arc<I>,
    freshness: FreshnessPolicy,
    config: PolicyConfig,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S> CachePolicy<T, S, NoopSink>
where
    T: Cacheable,
    S: CacheStore<T> + ?Sized,
{
    /// Create a policy that reports to nobody.
    pub fn with_store(store: Arc<S>, config: PolicyConfig) -> Self {
        Self::new(store, Arc::new(NoopSink), config)
    }
}

impl<T, S, I> CachePolicy<T, S, I>
where
    T: Cacheable,
    S: CacheStore<T> + ?Sized,
    I: InstrumentationSink<T> + ?Sized,
{
    /// Create a new cache policy.
    pub fn new(store: Arc<S>, sink: Arc<I>, config: PolicyConfig) -> Self {
        Self {
            store,
            sink,
            freshness: FreshnessPolicy::default(),
            config,
            _marker: PhantomData,
        }
    }

    /// Replace the freshness rule (default: honor each entry's own window).
    pub fn with_freshness(mut self, freshness: FreshnessPolicy) -> Self {
        self.freshness = freshness;
        self
    }

    /// Replace the instrumentation sink.
    pub fn with_sink<J>(self, sink: Arc<J>) -> CachePolicy<T, S, J>
    where
        J: InstrumentationSink<T> + ?Sized,
    {
        CachePolicy {
            store: self.store,
            sink,
            freshness: self.freshness,
            config: self.config,
            _marker: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sink(&self) -> &I {
        &self.sink
    }

    pub fn freshness(&self) -> &FreshnessPolicy {
        &self.freshness
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Execute with an empty context.
    pub async fn execute<F, Fut>(&self, key: impl Into<CacheKey>, fetch: F) -> PolicyResult<T>
    where
        F: FnOnce(ExecutionContext) -> Fut,
        Fut: Future<Output = DelegateOutcome<T>>,
    {
        self.execute_with_context(key, &ExecutionContext::default(), fetch)
            .await
    }

    /// Serve `key` from cache, or from `fetch` when the cache has nothing
    /// fresh.
    ///
    /// `fetch` is called at most once and receives a clone of `context`.
    ///
    /// # Errors
    ///
    /// - [`PolicyError::NoFallback`] when the backend failed and no cached
    ///   value could stand in for it
    /// - [`PolicyError::Cancelled`] when the context's cancellation signal
    ///   fired before the execution finished
    pub async fn execute_with_context<F, Fut>(
        &self,
        key: impl Into<CacheKey>,
        context: &ExecutionContext,
        fetch: F,
    ) -> PolicyResult<T>
    where
        F: FnOnce(ExecutionContext) -> Fut,
        Fut: Future<Output = DelegateOutcome<T>>,
    {
        let key = key.into();

        let stale = match self.lookup(&key, context).await? {
            Lookup::Fresh(cached) => {
                tracing::debug!(key = %key, "Serving fresh cached value");
                return Ok(cached.into_value());
            }
            Lookup::Stale(cached) => Some(cached),
            Lookup::NotFound => None,
        };

        // `fetch` runs only once the guard polls it, so a context cancelled
        // after the lookup never reaches the backend.
        let backend_ctx = context.clone();
        let started = Instant::now();
        let outcome = guard(
            &key,
            ProtocolStage::BackendInvoke,
            context,
            async move { fetch(backend_ctx).await },
        )
        .await?;
        let latency = started.elapsed();

        let fallback = match (&outcome, self.config.fallback_enabled) {
            (DelegateOutcome::Failure(_), true) => stale,
            _ => None,
        };

        self.emit("on_backend_get", &key, |sink| {
            sink.on_backend_get(&BackendGetEvent {
                key: &key,
                is_success: outcome.is_success(),
                is_fallback_to_cache: fallback.is_some(),
                latency,
                outcome: &outcome,
                context,
            })
        });

        match outcome {
            DelegateOutcome::Success(value) => {
                let entry = CacheValue::with_ttl(value.clone(), Utc::now(), self.config.entry_ttl);
                self.store_entry(&key, entry, context).await?;
                Ok(value)
            }
            DelegateOutcome::Failure(cause) => match fallback {
                Some(cached) => {
                    tracing::debug!(
                        key = %key,
                        error = %cause,
                        "Backend failed, serving stale cached value"
                    );
                    Ok(cached.into_value())
                }
                None => Err(PolicyError::NoFallback { key, cause }),
            },
        }
    }

    /// Write a value straight to the store, outside of any backend fetch.
    ///
    /// Reported as a cache set like any write-back. Returns whether the store
    /// accepted the value; store failures are not errors here either.
    pub async fn warm(
        &self,
        key: impl Into<CacheKey>,
        value: CacheValue<T>,
        context: &ExecutionContext,
    ) -> PolicyResult<bool> {
        let key = key.into();
        self.store_entry(&key, value, context).await
    }

    async fn lookup(&self, key: &CacheKey, context: &ExecutionContext) -> PolicyResult<Lookup<T>> {
        let started = Instant::now();
        let result = guard(key, ProtocolStage::CacheLookup, context, self.store.get(key)).await?;
        let latency = started.elapsed();

        let (lookup, failure) = match result {
            Ok(Some(cached)) if self.freshness.is_fresh(&cached, Utc::now()) => {
                (Lookup::Fresh(cached), None)
            }
            Ok(Some(cached)) => (Lookup::Stale(cached), None),
            Ok(None) => (Lookup::NotFound, None),
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Cache lookup failed, treating as miss");
                (Lookup::NotFound, Some(e))
            }
        };

        self.emit("on_cache_get", key, |sink| {
            sink.on_cache_get(&CacheGetEvent {
                key,
                is_success: failure.is_none(),
                is_cache_hit: lookup.is_hit(),
                is_cache_fresh: lookup.is_fresh(),
                latency,
                failure: failure.as_ref(),
                context,
            })
        });

        Ok(lookup)
    }

    /// Set `entry` under `key`, retrying as configured, then report once.
    async fn store_entry(
        &self,
        key: &CacheKey,
        entry: CacheValue<T>,
        context: &ExecutionContext,
    ) -> PolicyResult<bool> {
        let attempts = self.config.write_back_retries.saturating_add(1);
        let mut latency = Duration::ZERO;
        let mut failure: Option<CacheError> = None;

        for attempt in 1..=attempts {
            let started = Instant::now();
            let result = guard(
                key,
                ProtocolStage::WriteBack,
                context,
                self.store.set(key, entry.clone()),
            )
            .await?;
            latency += started.elapsed();

            match result {
                Ok(()) => {
                    failure = None;
                    break;
                }
                Err(e) => {
                    tracing::debug!(
                        key = %key,
                        attempt,
                        attempts,
                        error = %e,
                        "Cache write-back failed"
                    );
                    failure = Some(e);
                }
            }
        }

        self.emit("on_cache_set", key, |sink| {
            sink.on_cache_set(&CacheSetEvent {
                key,
                is_success: failure.is_none(),
                latency,
                failure: failure.as_ref(),
                context,
            })
        });

        Ok(failure.is_none())
    }

    fn emit<F>(&self, hook: &'static str, key: &CacheKey, f: F)
    where
        F: FnOnce(&I),
    {
        shielded(hook, key, || f(&*self.sink));
    }
}

/// Await `fut` unless the context's cancellation signal fires first.
///
/// The cancellation branch is polled first, so an already-cancelled context
/// never starts the step.
async fn guard<F: Future>(
    key: &CacheKey,
    stage: ProtocolStage,
    context: &ExecutionContext,
    fut: F,
) -> PolicyResult<F::Output> {
    let Some(signal) = context.cancellation() else {
        return Ok(fut.await);
    };

    tokio::select! {
        biased;
        _ = signal.cancelled() => {
            tracing::debug!(key = %key, stage = %stage, "Execution cancelled");
            Err(PolicyError::Cancelled {
                key: key.clone(),
                stage,
            })
        }
        output = fut => Ok(output),
    }
}

impl<T, S: ?Sized, I: ?Sized> Clone for CachePolicy<T, S, I> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            sink: Arc::clone(&self.sink),
            freshness: self.freshness.clone(),
            config: self.config.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, S: ?Sized, I: ?Sized> std::fmt::Debug for CachePolicy<T, S, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePolicy")
            .field("freshness", &self.freshness)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
