//! Tracing and Prometheus sinks driven by real policy executions.

use std::io::Write;
use std::sync::{Arc, Mutex};

use lastgood_policy::{CachePolicy, FanoutSink};
use lastgood_telemetry::{PrometheusSink, TracingSink};
use lastgood_test_utils::fixtures::{fresh_value, stale_value};
use lastgood_test_utils::{CountingBackend, ExecutionContext, PolicyConfig, ScriptedStore};
use prometheus::Registry;

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_prometheus_sink_counts_outcomes() {
    let registry = Registry::new();
    let sink = Arc::new(PrometheusSink::register(&registry).expect("register metrics"));
    let store = Arc::new(ScriptedStore::<String>::new());
    store.seed("user:1", fresh_value("fresh".to_string())).await;
    store.seed("user:2", stale_value("stale".to_string())).await;
    let policy = CachePolicy::new(store, sink.clone(), PolicyConfig::default());
    let failing = CountingBackend::<String>::timing_out();
    let working = CountingBackend::succeeding("Alice".to_string());

    policy
        .execute("user:1", |ctx| failing.fetch(ctx))
        .await
        .expect("fresh hit");
    policy
        .execute("user:2", |ctx| failing.fetch(ctx))
        .await
        .expect("stale fallback");
    assert!(policy.execute("user:3", |ctx| failing.fetch(ctx)).await.is_err());
    policy
        .execute("user:4", |ctx| working.fetch(ctx))
        .await
        .expect("backend succeeds");

    let metrics = sink.metrics();
    let gets = |outcome: &str| metrics.cache_get_total.with_label_values(&[outcome]).get();
    let backends = |status: &str| metrics.backend_get_total.with_label_values(&[status]).get();
    assert_eq!(gets("fresh_hit"), 1.0);
    assert_eq!(gets("stale_hit"), 1.0);
    assert_eq!(gets("miss"), 2.0);
    assert_eq!(gets("error"), 0.0);
    assert_eq!(backends("fallback"), 1.0);
    assert_eq!(backends("error"), 1.0);
    assert_eq!(backends("success"), 1.0);
    assert_eq!(
        metrics.cache_set_total.with_label_values(&["success"]).get(),
        1.0
    );

    let text = metrics.encode().expect("encode metrics");
    assert!(text.contains("lastgood_backend_get_total{status=\"fallback\"} 1"));
}

#[tokio::test]
async fn test_tracing_sink_logs_fallback_with_context() {
    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let store = Arc::new(ScriptedStore::<String>::new());
    store.seed("user:42", stale_value("Alice-old".to_string())).await;
    let registry = Registry::new();
    let fanout = FanoutSink::<String>::new()
        .with_sink(Arc::new(TracingSink::new()))
        .with_sink(Arc::new(PrometheusSink::register(&registry).expect("register metrics")));
    let policy = CachePolicy::new(store, Arc::new(fanout), PolicyConfig::default());
    let backend = CountingBackend::<String>::timing_out();
    let ctx = ExecutionContext::new().with_correlation_id("req-99");

    let value = policy
        .execute_with_context("user:42", &ctx, |c| backend.fetch(c))
        .await
        .expect("stale fallback");
    assert_eq!(value, "Alice-old");

    let logs = buf.contents();
    assert!(logs.contains("WARN"), "logs: {logs}");
    assert!(logs.contains("falling back to cached value"), "logs: {logs}");
    assert!(logs.contains("key=user:42"), "logs: {logs}");
    assert!(logs.contains("fallback=true"), "logs: {logs}");
    assert!(logs.contains("req-99"), "logs: {logs}");
}
