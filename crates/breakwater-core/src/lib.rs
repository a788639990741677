//! Core infrastructure shared by the breakwater client crates.
//!
//! Currently this is the lifecycle event system: the [`ObservableEvent`]
//! trait, the [`EventListener`] trait (any `Fn(&E)` closure qualifies), and
//! the [`EventListeners`] registry with panic-isolated dispatch.

pub mod events;

pub use events::{EventListener, EventListeners, ObservableEvent};
