//! Per-upstream circuit breaker.
//!
//! One bucket per breaker key, created lazily and kept for the life of the
//! breaker. Each bucket is a three-state machine (closed, open, half-open)
//! driven by a rolling outcome window, a cooldown clock, and bounded
//! half-open probing. There is no background timer: an open bucket moves to
//! half-open on the first `allow` call after its cooldown has elapsed.
//!
//! All methods take the current time as a parameter where they need one, so
//! the cooldown clock is fully deterministic under test.

use crate::window::RollingWindow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// The state of one breaker bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow; outcomes feed the rolling window.
    Closed,
    /// Requests are denied until the cooldown elapses.
    Open,
    /// A bounded number of probe requests test the upstream.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        })
    }
}

/// A state change, reported back so callers can surface it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Whether the request may proceed. When true the caller owes the
    /// breaker exactly one `on_success` or `on_failure` for this key
    /// (or `release_probe` if the request is shed before any I/O).
    pub allowed: bool,
    /// Bucket state after the check.
    pub state: CircuitState,
    /// For denials: how long until a retry could be admitted. Zero when
    /// denied only by the half-open probe bound.
    pub retry_after: Option<Duration>,
    /// Set when the check itself moved the bucket (open → half-open).
    pub transition: Option<Transition>,
}

/// Breaker tuning; see the builder on [`crate::Client`] for the defaults.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Outcomes tracked per key. Must be at least 1.
    pub window_size: usize,
    /// Minimum tracked outcomes before the failure rate is evaluated.
    pub min_requests: usize,
    /// Failure rate at or above which a closed bucket opens, `0.0..=1.0`.
    pub failure_threshold: f64,
    /// How long an open bucket denies before probing. Must be positive.
    pub cooldown: Duration,
    /// Concurrent probes admitted while half-open, and the number of probe
    /// successes required to close. Must be at least 1.
    pub half_open_probes: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 50,
            min_requests: 20,
            failure_threshold: 0.5,
            cooldown: Duration::from_secs(5),
            half_open_probes: 3,
        }
    }
}

impl BreakerConfig {
    pub(crate) fn validate(&self) {
        assert!(self.window_size > 0, "breaker window_size must be at least 1");
        assert!(
            (0.0..=1.0).contains(&self.failure_threshold),
            "breaker failure_threshold must be within 0.0..=1.0"
        );
        assert!(
            self.cooldown > Duration::ZERO,
            "breaker cooldown must be positive"
        );
        assert!(
            self.half_open_probes > 0,
            "breaker half_open_probes must be at least 1"
        );
    }
}

/// Point-in-time view of one bucket.
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    pub key: String,
    pub state: CircuitState,
    pub window_count: usize,
    pub window_failures: usize,
    /// Set while the bucket is open.
    pub opened_at: Option<Instant>,
}

enum Phase {
    Closed,
    Open { opened_at: Instant },
    HalfOpen,
}

struct Bucket {
    phase: Phase,
    half_open_in_flight: usize,
    half_open_successes: usize,
    window: RollingWindow,
}

impl Bucket {
    fn new(window_size: usize) -> Self {
        Self {
            phase: Phase::Closed,
            half_open_in_flight: 0,
            half_open_successes: 0,
            window: RollingWindow::new(window_size),
        }
    }

    fn state(&self) -> CircuitState {
        match self.phase {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen => CircuitState::HalfOpen,
        }
    }

    fn opened_at(&self) -> Option<Instant> {
        match self.phase {
            Phase::Open { opened_at } => Some(opened_at),
            _ => None,
        }
    }

    /// Moves the bucket to `to` and clears the probe counters. The window
    /// is left alone; only closing after successful probes resets it, so an
    /// open bucket keeps its failure memory.
    fn shift(&mut self, to: Phase) -> Transition {
        let from = self.state();
        self.phase = to;
        self.half_open_in_flight = 0;
        self.half_open_successes = 0;
        Transition {
            from,
            to: self.state(),
        }
    }
}

/// Per-key circuit breaker over a shared bucket map.
pub struct CircuitBreaker {
    cfg: BreakerConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl CircuitBreaker {
    /// Creates a breaker with the given tuning.
    ///
    /// # Panics
    ///
    /// Panics if the configuration violates its documented bounds.
    pub fn new(cfg: BreakerConfig) -> Self {
        cfg.validate();
        Self {
            cfg,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Bucket>> {
        self.buckets.lock().expect("breaker state poisoned")
    }

    /// Admission check for `key` at time `now`.
    ///
    /// For a closed bucket this always allows. For an open bucket it denies
    /// until the cooldown has elapsed, then shifts to half-open and admits
    /// the first probe. A half-open bucket admits probes up to the probe
    /// bound. When `allowed` is true the caller must report the outcome
    /// with exactly one `on_success`/`on_failure`, or `release_probe` if
    /// the request is shed locally before any I/O.
    pub fn allow(&self, key: &str, now: Instant) -> Decision {
        let mut buckets = self.lock();
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(self.cfg.window_size));

        match bucket.phase {
            Phase::Closed => Decision {
                allowed: true,
                state: CircuitState::Closed,
                retry_after: None,
                transition: None,
            },
            Phase::Open { opened_at } => {
                let elapsed = now.saturating_duration_since(opened_at);
                if elapsed < self.cfg.cooldown {
                    Decision {
                        allowed: false,
                        state: CircuitState::Open,
                        retry_after: Some(self.cfg.cooldown - elapsed),
                        transition: None,
                    }
                } else {
                    let transition = bucket.shift(Phase::HalfOpen);
                    bucket.half_open_in_flight = 1;
                    Decision {
                        allowed: true,
                        state: CircuitState::HalfOpen,
                        retry_after: None,
                        transition: Some(transition),
                    }
                }
            }
            Phase::HalfOpen => {
                if bucket.half_open_in_flight >= self.cfg.half_open_probes {
                    Decision {
                        allowed: false,
                        state: CircuitState::HalfOpen,
                        retry_after: Some(Duration::ZERO),
                        transition: None,
                    }
                } else {
                    bucket.half_open_in_flight += 1;
                    Decision {
                        allowed: true,
                        state: CircuitState::HalfOpen,
                        retry_after: None,
                        transition: None,
                    }
                }
            }
        }
    }

    /// Records a successful outcome for `key`.
    pub fn on_success(&self, key: &str) -> Option<Transition> {
        let mut buckets = self.lock();
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(self.cfg.window_size));

        match bucket.phase {
            Phase::Closed => {
                bucket.window.record(false);
                None
            }
            Phase::Open { .. } => None,
            Phase::HalfOpen => {
                bucket.half_open_in_flight = bucket.half_open_in_flight.saturating_sub(1);
                bucket.half_open_successes += 1;
                if bucket.half_open_successes >= self.cfg.half_open_probes {
                    let transition = bucket.shift(Phase::Closed);
                    bucket.window.reset();
                    Some(transition)
                } else {
                    None
                }
            }
        }
    }

    /// Records a failed outcome for `key` at time `now`.
    pub fn on_failure(&self, key: &str, now: Instant) -> Option<Transition> {
        let mut buckets = self.lock();
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(self.cfg.window_size));

        match bucket.phase {
            Phase::Closed => {
                bucket.window.record(true);
                if bucket.window.len() >= self.cfg.min_requests
                    && bucket.window.failure_rate() >= self.cfg.failure_threshold
                {
                    Some(bucket.shift(Phase::Open { opened_at: now }))
                } else {
                    None
                }
            }
            Phase::Open { .. } => None,
            Phase::HalfOpen => {
                bucket.half_open_in_flight = bucket.half_open_in_flight.saturating_sub(1);
                Some(bucket.shift(Phase::Open { opened_at: now }))
            }
        }
    }

    /// Returns a half-open probe slot reserved by `allow` without recording
    /// an outcome. Used when a probe is shed by the limiter before any I/O.
    pub fn release_probe(&self, key: &str) {
        let mut buckets = self.lock();
        if let Some(bucket) = buckets.get_mut(key) {
            if matches!(bucket.phase, Phase::HalfOpen) {
                bucket.half_open_in_flight = bucket.half_open_in_flight.saturating_sub(1);
            }
        }
    }

    /// Current state for `key`. Unseen keys report closed without
    /// allocating a bucket.
    pub fn state(&self, key: &str) -> CircuitState {
        self.lock()
            .get(key)
            .map(Bucket::state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Snapshots every bucket, sorted by key.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let buckets = self.lock();
        let mut out: Vec<BreakerSnapshot> = buckets
            .iter()
            .map(|(key, bucket)| BreakerSnapshot {
                key: key.clone(),
                state: bucket.state(),
                window_count: bucket.window.len(),
                window_failures: bucket.window.failures(),
                opened_at: bucket.opened_at(),
            })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// Manually closes `key`, clearing its window and probe counters.
    pub fn reset(&self, key: &str) -> Option<Transition> {
        let mut buckets = self.lock();
        let bucket = buckets.get_mut(key)?;
        if matches!(bucket.phase, Phase::Closed) {
            bucket.window.reset();
            return None;
        }
        let transition = bucket.shift(Phase::Closed);
        bucket.window.reset();
        Some(transition)
    }

    /// Manually opens `key` as of `now`.
    pub fn force_open(&self, key: &str, now: Instant) -> Option<Transition> {
        let mut buckets = self.lock();
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(self.cfg.window_size));
        if matches!(bucket.phase, Phase::Open { .. }) {
            return None;
        }
        Some(bucket.shift(Phase::Open { opened_at: now }))
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("buckets", &self.lock().len())
            .finish()
    }
}
