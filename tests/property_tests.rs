//! Property-based tests for the protection primitives.
//!
//! Run with: cargo test --test property_tests

mod property;
