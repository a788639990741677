//! Property tests for the circuit breaker state machine.

use breakwater::{BreakerConfig, CircuitBreaker, CircuitState};
use proptest::collection::vec;
use proptest::prelude::*;
use std::time::{Duration, Instant};

const KEY: &str = "upstream.test";

fn breaker(cooldown_ms: u64, half_open_probes: usize) -> CircuitBreaker {
    CircuitBreaker::new(BreakerConfig {
        window_size: 8,
        min_requests: 1,
        failure_threshold: 1.0,
        cooldown: Duration::from_millis(cooldown_ms),
        half_open_probes,
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Once open, every `allow` before the cooldown elapses is denied with
    /// the exact remaining wait; the first at or past it is admitted as a
    /// half-open probe.
    #[test]
    fn open_denies_for_the_full_cooldown(
        cooldown_ms in 1u64..=5_000,
        mut offsets_ms in vec(0u64..=10_000, 1..50),
    ) {
        let breaker = breaker(cooldown_ms, 1);
        let t0 = Instant::now();
        breaker.on_failure(KEY, t0);
        prop_assert_eq!(breaker.state(KEY), CircuitState::Open);

        offsets_ms.sort_unstable();
        for offset in offsets_ms {
            let now = t0 + Duration::from_millis(offset);
            let decision = breaker.allow(KEY, now);
            if offset < cooldown_ms {
                prop_assert!(!decision.allowed);
                prop_assert_eq!(
                    decision.retry_after,
                    Some(Duration::from_millis(cooldown_ms - offset))
                );
            } else {
                prop_assert!(decision.allowed);
                prop_assert_eq!(decision.state, CircuitState::HalfOpen);
                break;
            }
        }
    }

    /// With no outcomes reported, half-open admissions stop exactly at the
    /// probe bound.
    #[test]
    fn half_open_admissions_stop_at_the_probe_bound(
        half_open_probes in 1usize..=5,
        attempts in 1usize..=30,
    ) {
        let breaker = breaker(10, half_open_probes);
        let t0 = Instant::now();
        breaker.on_failure(KEY, t0);

        let after_cooldown = t0 + Duration::from_millis(20);
        let admitted = (0..attempts)
            .filter(|_| breaker.allow(KEY, after_cooldown).allowed)
            .count();

        prop_assert_eq!(admitted, attempts.min(half_open_probes));
        prop_assert_eq!(breaker.state(KEY), CircuitState::HalfOpen);
    }

    /// Reported outcomes in the closed state only open the circuit when
    /// both the minimum-sample and threshold conditions hold.
    #[test]
    fn closed_opens_only_past_min_requests_and_threshold(
        window_size in 1usize..=12,
        min_requests in 0usize..=12,
        threshold in 0.05f64..=1.0,
        outcomes in vec(any::<bool>(), 1..60),
    ) {
        let breaker = CircuitBreaker::new(BreakerConfig {
            window_size,
            min_requests,
            failure_threshold: threshold,
            cooldown: Duration::from_secs(60),
            half_open_probes: 1,
        });
        let t0 = Instant::now();

        let mut tracked: Vec<bool> = Vec::new();
        for &failure in &outcomes {
            if breaker.state(KEY) == CircuitState::Open {
                break;
            }
            tracked.push(failure);
            let last_n: Vec<bool> = tracked
                .iter()
                .rev()
                .take(window_size)
                .copied()
                .collect();
            let failures = last_n.iter().filter(|&&f| f).count();
            let rate = failures as f64 / last_n.len() as f64;
            let should_open = failure && last_n.len() >= min_requests && rate >= threshold;

            if failure {
                breaker.on_failure(KEY, t0);
            } else {
                breaker.on_success(KEY);
            }
            prop_assert_eq!(
                breaker.state(KEY) == CircuitState::Open,
                should_open,
                "tracked {:?}, rate {}",
                last_n,
                rate
            );
        }
    }
}
