//! Lifecycle event dispatch.
//!
//! Client components emit named events (`queue:enqueued`, `request:success`,
//! `breaker:state`, ...) at well-defined points; callers subscribe by
//! registering listeners. Listeners run synchronously, in registration
//! order, on the emitting task.

#[cfg(feature = "tracing")]
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// An event emitted by the client pipeline or one of its components.
pub trait ObservableEvent: Send + Sync + fmt::Debug {
    /// The event name, e.g. `"queue:enqueued"` or `"breaker:state"`.
    fn event_type(&self) -> &'static str;

    /// When the event occurred.
    fn timestamp(&self) -> Instant;

    /// The upstream key the event concerns.
    fn key(&self) -> &str;
}

/// A subscriber for events of type `E`.
///
/// Any `Fn(&E) + Send + Sync` closure implements this trait, so plain
/// closures can be passed to [`EventListeners::add`] directly.
pub trait EventListener<E: ObservableEvent>: Send + Sync {
    /// Called for every emitted event.
    fn on_event(&self, event: &E);
}

impl<E, F> EventListener<E> for F
where
    E: ObservableEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        self(event)
    }
}

/// An ordered collection of event listeners.
///
/// Subscriptions are additive; listeners are invoked synchronously in the
/// order they were registered.
#[derive(Clone)]
pub struct EventListeners<E: ObservableEvent> {
    listeners: Vec<Arc<dyn EventListener<E>>>,
}

impl<E: ObservableEvent> EventListeners<E> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Registers a listener. Closures of type `Fn(&E)` work directly.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits an event to every registered listener.
    ///
    /// A panicking listener is caught and skipped so the remaining listeners
    /// still run and the emitting request is not poisoned. With the
    /// `tracing` feature the panic is logged as a warning; with `metrics` a
    /// counter is incremented.
    pub fn emit(&self, event: &E) {
        for (index, listener) in self.listeners.iter().enumerate() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));

            if let Err(_payload) = result {
                #[cfg(feature = "tracing")]
                log_listener_panic(index, event, _payload.as_ref());

                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "breakwater_listener_panics_total",
                    "event_type" => event.event_type()
                )
                .increment(1);

                #[cfg(not(feature = "tracing"))]
                let _ = index;
            }
        }
    }

    /// Returns true if no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: ObservableEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ObservableEvent> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("len", &self.listeners.len())
            .finish()
    }
}

#[cfg(feature = "tracing")]
fn log_listener_panic<E: ObservableEvent>(index: usize, event: &E, payload: &(dyn Any + Send)) {
    let message = payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());

    tracing::warn!(
        listener_index = index,
        event_type = event.event_type(),
        key = event.key(),
        panic_message = %message,
        "event listener panicked"
    );
}
