//! Property tests over every combination of cache state, backend outcome
//! and write-back outcome.

use lastgood_test_utils::fixtures::{recorded_policy, seed_state};
use lastgood_test_utils::generators::{arb_cache_state, arb_key, arb_outcome, CacheState};
use lastgood_test_utils::{
    CountingBackend, DelegateOutcome, EventKind, PolicyConfig, PolicyError, RecordedEvent,
};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// **Property: decision table**
    ///
    /// A fresh entry is always served without the backend. Otherwise a
    /// backend success wins, a backend failure falls back to a stale entry,
    /// and with nothing cached the failure surfaces as `NoFallback`.
    #[test]
    fn prop_decision_table(
        key in arb_key(),
        state in arb_cache_state(),
        outcome in arb_outcome(),
        set_fails in any::<bool>(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (policy, store, sink) = recorded_policy::<String>(PolicyConfig::default());
            seed_state(&store, &key, &state).await;
            store.fail_sets(set_fails);
            let backend = CountingBackend::new(outcome.clone());

            let result = policy.execute(&key, |ctx| backend.fetch(ctx)).await;

            match (&state, &outcome) {
                (CacheState::Fresh(cached), _) => {
                    prop_assert_eq!(result.ok(), Some(cached.clone()));
                    prop_assert_eq!(backend.calls(), 0);
                    prop_assert_eq!(sink.kinds(), vec![EventKind::CacheGet]);
                }
                (_, DelegateOutcome::Success(fetched)) => {
                    prop_assert_eq!(result.ok(), Some(fetched.clone()));
                    prop_assert_eq!(
                        sink.kinds(),
                        vec![EventKind::CacheGet, EventKind::BackendGet, EventKind::CacheSet]
                    );
                    let set_ok = matches!(
                        sink.events()[2],
                        RecordedEvent::CacheSet { is_success: true, .. }
                    );
                    prop_assert_eq!(set_ok, !set_fails);
                }
                (CacheState::Stale(cached), DelegateOutcome::Failure(_)) => {
                    prop_assert_eq!(result.ok(), Some(cached.clone()));
                    prop_assert_eq!(store.set_calls(), 0);
                    let fell_back = matches!(
                        sink.events()[1],
                        RecordedEvent::BackendGet { is_fallback_to_cache: true, .. }
                    );
                    prop_assert!(fell_back);
                }
                (CacheState::Empty, DelegateOutcome::Failure(_)) => {
                    let is_no_fallback = matches!(result, Err(PolicyError::NoFallback { .. }));
                    prop_assert!(is_no_fallback);
                    prop_assert_eq!(store.set_calls(), 0);
                    prop_assert_eq!(sink.kinds(), vec![EventKind::CacheGet, EventKind::BackendGet]);
                }
            }

            prop_assert!(backend.calls() <= 1);
            prop_assert!(sink.events().iter().all(|e| e.key() == &key));
            Ok(())
        })?;
    }

    /// **Property: populate then hit**
    ///
    /// After a successful backend fetch whose write-back succeeded, the next
    /// execution for the same key is a fresh hit returning an equal value.
    #[test]
    fn prop_populate_then_fresh_hit(key in arb_key(), payload in "[a-z]{1,16}") {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (policy, store, sink) = recorded_policy::<String>(PolicyConfig::default());
            let backend = CountingBackend::succeeding(payload.clone());

            let first = policy.execute(&key, |ctx| backend.fetch(ctx)).await;
            prop_assert_eq!(first.ok(), Some(payload.clone()));
            let stored = store.peek(&key).await.map(|v| v.into_value());
            prop_assert_eq!(stored, Some(payload.clone()));

            sink.clear();
            let second = policy.execute(&key, |ctx| backend.fetch(ctx)).await;
            prop_assert_eq!(second.ok(), Some(payload));
            prop_assert_eq!(backend.calls(), 1);
            prop_assert_eq!(sink.kinds(), vec![EventKind::CacheGet]);
            Ok(())
        })?;
    }
}
