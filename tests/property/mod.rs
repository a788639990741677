//! Property-based tests for the protection primitives.
//!
//! Invariants covered:
//! - rolling window arithmetic matches a naive last-N model
//! - limiter capacity and queue bounds hold under arbitrary interleavings
//! - every admitted permit is eventually conserved back to zero
//! - an open breaker denies for the full cooldown
//! - half-open admissions never exceed the probe bound

pub mod breaker;
pub mod limiter;
pub mod window;
