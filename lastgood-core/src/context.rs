//! Execution context threaded through a policy execution.
//!
//! The context is an opaque bag owned by the caller. The engine hands it,
//! unchanged, to every instrumentation event and to the backend fetch. The
//! only thing the engine reads from it is the cancellation signal.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

/// Caller-supplied correlation data for one execution.
///
/// Cheap to clone: the item bag is shared behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    operation_key: Option<String>,
    correlation_id: Option<String>,
    items: Arc<HashMap<String, Value>>,
    cancellation: Option<CancellationSignal>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the logical operation (e.g. "get_user_profile").
    pub fn with_operation_key(mut self, operation_key: impl Into<String>) -> Self {
        self.operation_key = Some(operation_key.into());
        self
    }

    /// Trace or request id to correlate events of one execution.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Attach an arbitrary item.
    pub fn with_item(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.items).insert(key.into(), value.into());
        self
    }

    /// Attach a cancellation signal the engine will honor.
    pub fn with_cancellation(mut self, signal: CancellationSignal) -> Self {
        self.cancellation = Some(signal);
        self
    }

    pub fn operation_key(&self) -> Option<&str> {
        self.operation_key.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.items.get(key)
    }

    pub fn items(&self) -> &HashMap<String, Value> {
        &self.items
    }

    pub fn cancellation(&self) -> Option<&CancellationSignal> {
        self.cancellation.as_ref()
    }

    /// True once the attached signal (if any) has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(CancellationSignal::is_cancelled)
            .unwrap_or(false)
    }
}

/// Sending half of a cancellation pair. Held by the caller.
#[derive(Debug)]
pub struct CancellationHandle {
    tx: watch::Sender<bool>,
}

/// Receiving half of a cancellation pair. Carried in an [`ExecutionContext`].
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected cancellation handle and signal.
pub fn cancellation_pair() -> (CancellationHandle, CancellationSignal) {
    let (tx, rx) = watch::channel(false);
    (CancellationHandle { tx }, CancellationSignal { rx })
}

impl CancellationHandle {
    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Another signal connected to this handle.
    pub fn signal(&self) -> CancellationSignal {
        CancellationSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl CancellationSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal fires.
    ///
    /// Never resolves if the handle is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let fired = rx.wait_for(|cancelled| *cancelled).await.map(|_| ());
        if fired.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_context_items_and_ids() {
        let ctx = ExecutionContext::new()
            .with_operation_key("get_user")
            .with_correlation_id("trace-123")
            .with_item("tenant", "acme")
            .with_item("attempt", 2);

        assert_eq!(ctx.operation_key(), Some("get_user"));
        assert_eq!(ctx.correlation_id(), Some("trace-123"));
        assert_eq!(ctx.get("tenant"), Some(&Value::from("acme")));
        assert_eq!(ctx.get("attempt"), Some(&Value::from(2)));
        assert_eq!(ctx.items().len(), 2);
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_clone_does_not_share_later_items() {
        let base = ExecutionContext::new().with_item("a", 1);
        let extended = base.clone().with_item("b", 2);

        assert!(base.get("b").is_none());
        assert_eq!(extended.get("a"), Some(&Value::from(1)));
    }

    #[test]
    fn test_cancel_is_visible_to_all_signals() {
        let (handle, signal) = cancellation_pair();
        let other = handle.signal();
        let ctx = ExecutionContext::new().with_cancellation(signal.clone());

        assert!(!ctx.is_cancelled());
        handle.cancel();
        handle.cancel();

        assert!(handle.is_cancelled());
        assert!(signal.is_cancelled());
        assert!(other.is_cancelled());
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let (handle, signal) = cancellation_pair();

        let waiter = tokio::spawn(async move { signal.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancelled() should resolve")
            .expect("waiter task should not panic");
    }

    #[tokio::test]
    async fn test_cancelled_pending_when_handle_dropped() {
        let (handle, signal) = cancellation_pair();
        drop(handle);

        let waited = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(waited.is_err(), "dropped handle must not count as cancellation");
    }
}
