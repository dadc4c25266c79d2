//! At-most-once memoised key -> value computation with continuation
//! queuing, failure propagation, pending-key introspection, and cycle
//! detection (C2). Drives every analysis map in `bb-repo`/`bb-targets`.

mod consumer;
mod map;
mod node;

pub use consumer::{AsyncMapConsumer, Consumer, FailureFn, Logger, Setter, SubCaller, ValueCreator};
pub use map::AsyncMap;
pub use node::AsyncMapNode;

/// Bound satisfied by any key usable in an [`AsyncMap`]/[`AsyncMapConsumer`].
pub trait MapKey: Eq + std::hash::Hash + Clone + std::fmt::Debug + Send + Sync + 'static {}
impl<T> MapKey for T where T: Eq + std::hash::Hash + Clone + std::fmt::Debug + Send + Sync + 'static {}

/// Bound satisfied by any value usable in an [`AsyncMap`]/[`AsyncMapConsumer`].
pub trait MapValue: Send + Sync + 'static {}
impl<T> MapValue for T where T: Send + Sync + 'static {}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_task::TaskSystem;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scenario A (§8): Fibonacci via sub-caller.
    #[test]
    fn fibonacci_via_sub_caller() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_vc = Arc::clone(&call_count);

        let value_creator: ValueCreator<u64, u64> = Arc::new(move |ts, setter, _logger, sub_caller, key| {
            call_count_vc.fetch_add(1, Ordering::SeqCst);
            if key == 0 {
                setter(0);
                return;
            }
            if key == 1 {
                setter(1);
                return;
            }
            let setter2 = Arc::clone(&setter);
            sub_caller(
                vec![key - 2, key - 1],
                Box::new(move |values| {
                    let sum = *values[0] + *values[1];
                    setter2(sum);
                }),
                Arc::new(|_msg: &str, _fatal: bool| {}),
            );
            let _ = ts;
        });

        let map = AsyncMapConsumer::new(value_creator, 4);
        let ts = Arc::new(TaskSystem::with_threads(4));
        let result = Arc::new(parking_lot::Mutex::new(None));
        let result2 = Arc::clone(&result);

        map.consume_after_keys_ready(
            &ts,
            vec![92],
            Box::new(move |values| {
                *result2.lock() = Some(*values[0]);
            }),
            Arc::new(|_msg: &str, _fatal: bool| {}),
            None,
        );
        ts.finish();

        assert_eq!(*result.lock(), Some(7540113804746346429));
        assert!(call_count.load(Ordering::SeqCst) <= 93);
    }

    /// Scenario B (§8): cycle detection over a 1000-key ring.
    #[test]
    fn cycle_detection_over_ring() {
        let value_creator: ValueCreator<u64, ()> = Arc::new(move |_ts, _setter, _logger, sub_caller, key| {
            let next = (key + 1) % 1000;
            sub_caller(vec![next], Box::new(|_values| {}), Arc::new(|_msg: &str, _fatal: bool| {}));
        });

        let map = AsyncMapConsumer::new(value_creator, 4);
        let ts = Arc::new(TaskSystem::with_threads(4));
        map.consume_after_keys_ready(
            &ts,
            vec![0],
            Box::new(|_values| {}),
            Arc::new(|_msg: &str, _fatal: bool| {}),
            None,
        );
        ts.finish();

        let cycle = map.detect_cycle().expect("expected a cycle to be found");
        assert_eq!(cycle.len(), 1001);
        assert_eq!(cycle.first(), cycle.last());
        let start = cycle[0];
        for (i, key) in cycle.iter().enumerate().take(1000) {
            assert_eq!(*key, (start + i as u64) % 1000);
        }
    }

    #[test]
    fn value_is_produced_at_most_once_per_key() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_vc = Arc::clone(&calls);
        let value_creator: ValueCreator<u64, u64> = Arc::new(move |_ts, setter, _logger, _sub, key| {
            calls_vc.fetch_add(1, Ordering::SeqCst);
            setter(key * 2);
        });
        let map = AsyncMapConsumer::new(value_creator, 4);
        let ts = Arc::new(TaskSystem::with_threads(4));

        for _ in 0..20 {
            map.consume_after_keys_ready(
                &ts,
                vec![7],
                Box::new(|values| assert_eq!(*values[0], 14)),
                Arc::new(|_msg: &str, _fatal: bool| {}),
                None,
            );
        }
        ts.finish();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fatal_log_fails_dependents() {
        let value_creator: ValueCreator<u32, u32> = Arc::new(move |_ts, _setter, logger, _sub, key| {
            if key == 0 {
                logger("boom", true);
            }
        });
        let map = AsyncMapConsumer::new(value_creator, 2);
        let ts = Arc::new(TaskSystem::with_threads(2));
        let failed = Arc::new(AtomicUsize::new(0));
        let failed2 = Arc::clone(&failed);

        map.consume_after_keys_ready(
            &ts,
            vec![0],
            Box::new(|_values| panic!("consumer must not run for a failed dependency")),
            Arc::new(|_msg: &str, _fatal: bool| {}),
            Some(Arc::new(move || {
                failed2.fetch_add(1, Ordering::SeqCst);
            })),
        );
        ts.finish();
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }
}
