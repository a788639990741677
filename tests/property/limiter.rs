//! Property tests for the concurrency limiter.

use breakwater::{Admission, ConcurrencyLimiter};
use proptest::collection::vec;
use proptest::prelude::*;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
enum Op {
    Admit,
    DropPermit,
    DropWaiter,
}

fn ops() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Admit), Just(Op::DropPermit), Just(Op::DropWaiter)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Capacity and queue bounds hold at every observation point, and once
    /// everything held is dropped the limiter returns to zero.
    #[test]
    fn bounds_hold_and_permits_are_conserved(
        max_in_flight in 1usize..=6,
        max_queue in 0usize..=6,
        script in vec(ops(), 1..200),
    ) {
        let limiter =
            ConcurrencyLimiter::new(max_in_flight, max_queue, Duration::from_secs(1));
        let mut permits = Vec::new();
        let mut waiters = Vec::new();

        for op in script {
            match op {
                Op::Admit => match limiter.try_admit() {
                    Admission::Granted(permit) => permits.push(permit),
                    Admission::Queued(waiting) => waiters.push(waiting),
                    Admission::QueueFull => {
                        let snapshot = limiter.snapshot();
                        prop_assert_eq!(snapshot.in_flight, max_in_flight);
                        prop_assert_eq!(snapshot.queue_depth, max_queue);
                    }
                },
                Op::DropPermit => {
                    permits.pop();
                }
                Op::DropWaiter => {
                    waiters.pop();
                }
            }

            let snapshot = limiter.snapshot();
            prop_assert!(snapshot.in_flight <= max_in_flight);
            prop_assert!(snapshot.queue_depth <= max_queue);
            if snapshot.queue_depth > 0 {
                prop_assert_eq!(snapshot.in_flight, max_in_flight);
            }
        }

        drop(permits);
        drop(waiters);
        let snapshot = limiter.snapshot();
        prop_assert_eq!(snapshot.in_flight, 0);
        prop_assert_eq!(snapshot.queue_depth, 0);
    }

    /// The fast path admits exactly `max_in_flight` callers before anyone
    /// queues.
    #[test]
    fn fast_path_fills_exactly_to_capacity(
        max_in_flight in 1usize..=8,
        attempts in 1usize..=20,
    ) {
        let limiter = ConcurrencyLimiter::new(max_in_flight, 100, Duration::from_secs(1));
        let mut permits = Vec::new();
        let mut queued = 0usize;

        for _ in 0..attempts {
            match limiter.try_admit() {
                Admission::Granted(permit) => permits.push(permit),
                Admission::Queued(_) => queued += 1,
                Admission::QueueFull => unreachable!("queue bound is 100"),
            }
        }

        prop_assert_eq!(permits.len(), attempts.min(max_in_flight));
        prop_assert_eq!(queued, attempts.saturating_sub(max_in_flight));
    }
}
