//! lastgood Test Utilities
//!
//! Shared test infrastructure for the lastgood workspace:
//! - A recording sink that keeps every instrumentation event in order
//! - A scriptable cache store and a counting backend
//! - Proptest generators for keys and payloads
//! - Fixtures and assertions for common scenarios

pub use lastgood_core::{
    BackendError, CacheError, CacheKey, CacheValue, Cacheable, DelegateOutcome,
    ExecutionContext, FreshnessWindow, PolicyConfig, PolicyError, PolicyResult, ProtocolStage,
};
pub use lastgood_policy::{
    BackendGetEvent, CacheGetEvent, CachePolicy, CacheSetEvent, InstrumentationSink,
};
pub use lastgood_storage::{CacheStore, InMemoryCacheStore};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// RECORDING SINK
// ============================================================================

/// Which instrumentation hook produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CacheGet,
    CacheSet,
    BackendGet,
}

/// Owned copy of an instrumentation event.
#[derive(Debug, Clone)]
pub enum RecordedEvent<T> {
    CacheGet {
        key: CacheKey,
        is_success: bool,
        is_cache_hit: bool,
        is_cache_fresh: bool,
        latency: Duration,
        failure: Option<CacheError>,
        correlation_id: Option<String>,
    },
    CacheSet {
        key: CacheKey,
        is_success: bool,
        latency: Duration,
        failure: Option<CacheError>,
        correlation_id: Option<String>,
    },
    BackendGet {
        key: CacheKey,
        is_success: bool,
        is_fallback_to_cache: bool,
        latency: Duration,
        outcome: DelegateOutcome<T>,
        correlation_id: Option<String>,
    },
}

impl<T> RecordedEvent<T> {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::CacheGet { .. } => EventKind::CacheGet,
            Self::CacheSet { .. } => EventKind::CacheSet,
            Self::BackendGet { .. } => EventKind::BackendGet,
        }
    }

    pub fn key(&self) -> &CacheKey {
        match self {
            Self::CacheGet { key, .. } | Self::CacheSet { key, .. } | Self::BackendGet { key, .. } => {
                key
            }
        }
    }

    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::CacheGet { correlation_id, .. }
            | Self::CacheSet { correlation_id, .. }
            | Self::BackendGet { correlation_id, .. } => correlation_id.as_deref(),
        }
    }
}

/// Sink that records every event, in the order the engine emitted them.
#[derive(Debug)]
pub struct RecordingSink<T> {
    events: Mutex<Vec<RecordedEvent<T>>>,
}

impl<T: Cacheable> RecordingSink<T> {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<RecordedEvent<T>> {
        lock(&self.events).clone()
    }

    /// Just the hook order.
    pub fn kinds(&self) -> Vec<EventKind> {
        lock(&self.events).iter().map(RecordedEvent::kind).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.events).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }

    fn record(&self, event: RecordedEvent<T>) {
        lock(&self.events).push(event);
    }
}

impl<T: Cacheable> Default for RecordingSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Cacheable> InstrumentationSink<T> for RecordingSink<T> {
    fn on_cache_get(&self, event: &CacheGetEvent<'_>) {
        self.record(RecordedEvent::CacheGet {
            key: event.key.clone(),
            is_success: event.is_success,
            is_cache_hit: event.is_cache_hit,
            is_cache_fresh: event.is_cache_fresh,
            latency: event.latency,
            failure: event.failure.cloned(),
            correlation_id: event.context.correlation_id().map(str::to_string),
        });
    }

    fn on_cache_set(&self, event: &CacheSetEvent<'_>) {
        self.record(RecordedEvent::CacheSet {
            key: event.key.clone(),
            is_success: event.is_success,
            latency: event.latency,
            failure: event.failure.cloned(),
            correlation_id: event.context.correlation_id().map(str::to_string),
        });
    }

    fn on_backend_get(&self, event: &BackendGetEvent<'_, T>) {
        self.record(RecordedEvent::BackendGet {
            key: event.key.clone(),
            is_success: event.is_success,
            is_fallback_to_cache: event.is_fallback_to_cache,
            latency: event.latency,
            outcome: event.outcome.clone(),
            correlation_id: event.context.correlation_id().map(str::to_string),
        });
    }
}

/// Sink that panics on every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanickingSink;

impl<T> InstrumentationSink<T> for PanickingSink {
    fn on_cache_get(&self, _event: &CacheGetEvent<'_>) {
        panic!("PanickingSink: on_cache_get");
    }

    fn on_cache_set(&self, _event: &CacheSetEvent<'_>) {
        panic!("PanickingSink: on_cache_set");
    }

    fn on_backend_get(&self, _event: &BackendGetEvent<'_, T>) {
        panic!("PanickingSink: on_backend_get");
    }
}

// ============================================================================
// SCRIPTED STORE
// ============================================================================

/// In-memory store with programmable failures, delays and call counters.
#[derive(Debug)]
pub struct ScriptedStore<T> {
    inner: InMemoryCacheStore<T>,
    fail_gets: AtomicBool,
    fail_sets: AtomicBool,
    failing_sets_left: AtomicUsize,
    get_delay_ms: AtomicU64,
    set_delay_ms: AtomicU64,
    get_calls: AtomicUsize,
    set_calls: AtomicUsize,
}

impl<T: Cacheable> ScriptedStore<T> {
    pub fn new() -> Self {
        Self {
            inner: InMemoryCacheStore::new(),
            fail_gets: AtomicBool::new(false),
            fail_sets: AtomicBool::new(false),
            failing_sets_left: AtomicUsize::new(0),
            get_delay_ms: AtomicU64::new(0),
            set_delay_ms: AtomicU64::new(0),
            get_calls: AtomicUsize::new(0),
            set_calls: AtomicUsize::new(0),
        }
    }

    /// Put an entry in place without counting a call.
    pub async fn seed(&self, key: impl Into<CacheKey>, value: CacheValue<T>) {
        self.inner.insert(key, value).await;
    }

    /// Read an entry without counting a call.
    pub async fn peek(&self, key: impl Into<CacheKey>) -> Option<CacheValue<T>> {
        self.inner.peek(&key.into()).await
    }

    /// Make every get fail with `CacheError::Unavailable`.
    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Make every set fail with `CacheError::Unavailable`.
    pub fn fail_sets(&self, fail: bool) {
        self.fail_sets.store(fail, Ordering::SeqCst);
    }

    /// Fail only the next `count` sets.
    pub fn fail_next_sets(&self, count: usize) {
        self.failing_sets_left.store(count, Ordering::SeqCst);
    }

    pub fn delay_gets(&self, delay: Duration) {
        self.get_delay_ms
            .store(millis(delay), Ordering::SeqCst);
    }

    pub fn delay_sets(&self, delay: Duration) {
        self.set_delay_ms
            .store(millis(delay), Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    fn take_set_failure(&self) -> bool {
        if self.fail_sets.load(Ordering::SeqCst) {
            return true;
        }
        self.failing_sets_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

impl<T: Cacheable> Default for ScriptedStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

async fn pause(delay_ms: &AtomicU64) {
    let ms = delay_ms.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[async_trait]
impl<T: Cacheable> CacheStore<T> for ScriptedStore<T> {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheValue<T>>, CacheError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        pause(&self.get_delay_ms).await;
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("scripted get failure"));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &CacheKey, value: CacheValue<T>) -> Result<(), CacheError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        pause(&self.set_delay_ms).await;
        if self.take_set_failure() {
            return Err(CacheError::unavailable("scripted set failure"));
        }
        self.inner.set(key, value).await
    }
}

// ============================================================================
// COUNTING BACKEND
// ============================================================================

/// Backend error used by scenarios that simulate an upstream timeout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("backend timed out after {0:?}")]
pub struct BackendTimeout(pub Duration);

/// Backend fetch with scripted outcomes and an invocation counter.
///
/// Queued outcomes are returned first, in order; once the queue is empty
/// every call returns the default outcome.
#[derive(Debug)]
pub struct CountingBackend<T> {
    default_outcome: DelegateOutcome<T>,
    queued: Mutex<VecDeque<DelegateOutcome<T>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_context: Mutex<Option<ExecutionContext>>,
}

impl<T: Cacheable> CountingBackend<T> {
    pub fn new(default_outcome: DelegateOutcome<T>) -> Self {
        Self {
            default_outcome,
            queued: Mutex::new(VecDeque::new()),
            delay: None,
            calls: AtomicUsize::new(0),
            last_context: Mutex::new(None),
        }
    }

    /// Backend that always returns `value`.
    pub fn succeeding(value: T) -> Self {
        Self::new(DelegateOutcome::Success(value))
    }

    /// Backend that always fails with `error`.
    pub fn failing(error: BackendError) -> Self {
        Self::new(DelegateOutcome::Failure(error))
    }

    /// Backend that always times out.
    pub fn timing_out() -> Self {
        Self::failing(BackendError::new(BackendTimeout(Duration::from_secs(5))))
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue an outcome for the next unanswered call.
    pub fn then(self, outcome: DelegateOutcome<T>) -> Self {
        lock(&self.queued).push_back(outcome);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Context handed to the most recent call.
    pub fn last_context(&self) -> Option<ExecutionContext> {
        lock(&self.last_context).clone()
    }

    /// The fetch itself. Pass `|ctx| backend.fetch(ctx)` to the policy.
    pub async fn fetch(&self, context: ExecutionContext) -> DelegateOutcome<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_context) = Some(context);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queued = lock(&self.queued).pop_front();
        queued.unwrap_or_else(|| self.default_outcome.clone())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for keys, payloads and backend outcomes.

    use super::*;
    use proptest::prelude::*;

    /// Generate a cache key shaped like `"user:42"`.
    pub fn arb_key() -> impl Strategy<Value = CacheKey> {
        "[a-z]{1,8}:[0-9]{1,6}".prop_map(CacheKey::from)
    }

    /// Generate a short printable payload.
    pub fn arb_payload() -> impl Strategy<Value = String> {
        "[A-Za-z0-9 ]{0,32}"
    }

    /// Generate a backend outcome over string payloads.
    pub fn arb_outcome() -> impl Strategy<Value = DelegateOutcome<String>> {
        prop_oneof![
            arb_payload().prop_map(DelegateOutcome::Success),
            (1u64..10_000).prop_map(|ms| {
                DelegateOutcome::Failure(BackendError::new(BackendTimeout(
                    Duration::from_millis(ms),
                )))
            }),
        ]
    }

    /// What the cache holds before an execution.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum CacheState {
        Empty,
        Fresh(String),
        Stale(String),
    }

    pub fn arb_cache_state() -> impl Strategy<Value = CacheState> {
        prop_oneof![
            Just(CacheState::Empty),
            arb_payload().prop_map(CacheState::Fresh),
            arb_payload().prop_map(CacheState::Stale),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built cache values and policies for common scenarios.

    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    /// A value stored just now with a one hour window.
    pub fn fresh_value<T>(value: T) -> CacheValue<T> {
        CacheValue::with_ttl(value, Utc::now(), Duration::from_secs(3600))
    }

    /// A value stored ten minutes ago with a one minute window.
    pub fn stale_value<T>(value: T) -> CacheValue<T> {
        CacheValue::with_ttl(
            value,
            Utc::now() - chrono::Duration::minutes(10),
            Duration::from_secs(60),
        )
    }

    /// Seed `store` according to `state` under `key`.
    pub async fn seed_state(
        store: &ScriptedStore<String>,
        key: &CacheKey,
        state: &generators::CacheState,
    ) {
        match state {
            generators::CacheState::Empty => {}
            generators::CacheState::Fresh(v) => store.seed(key, fresh_value(v.clone())).await,
            generators::CacheState::Stale(v) => store.seed(key, stale_value(v.clone())).await,
        }
    }

    /// A policy over a scripted store reporting to a recording sink.
    pub fn recorded_policy<T: Cacheable>(
        config: PolicyConfig,
    ) -> (
        CachePolicy<T, ScriptedStore<T>, RecordingSink<T>>,
        Arc<ScriptedStore<T>>,
        Arc<RecordingSink<T>>,
    ) {
        let store = Arc::new(ScriptedStore::new());
        let sink = Arc::new(RecordingSink::new());
        let policy = CachePolicy::new(store.clone(), sink.clone(), config);
        (policy, store, sink)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for policy results and event logs.

    use super::*;

    /// Assert the result is a `NoFallback` failure wrapping an error of type `E`.
    pub fn assert_no_fallback<T, E>(result: &PolicyResult<T>)
    where
        T: std::fmt::Debug,
        E: std::error::Error + 'static,
    {
        match result {
            Err(PolicyError::NoFallback { cause, .. }) => assert!(
                cause.is::<E>(),
                "Expected cause of type {}, got {:?}",
                std::any::type_name::<E>(),
                cause
            ),
            other => panic!("Expected NoFallback, got {:?}", other),
        }
    }

    /// Assert the result is a cancellation at `stage`.
    pub fn assert_cancelled_at<T: std::fmt::Debug>(result: &PolicyResult<T>, stage: ProtocolStage) {
        match result {
            Err(PolicyError::Cancelled { stage: actual, .. }) => assert_eq!(
                *actual, stage,
                "Expected cancellation during {}, got {}",
                stage, actual
            ),
            other => panic!("Expected Cancelled, got {:?}", other),
        }
    }

    /// Assert the sink saw exactly these hooks, in this order.
    pub fn assert_event_order<T: Cacheable>(sink: &RecordingSink<T>, expected: &[EventKind]) {
        assert_eq!(sink.kinds(), expected, "Unexpected instrumentation sequence");
    }
}

// ============================================================================
// TESTS
// ============================================================================
