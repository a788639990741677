//! Client configuration.

use crate::breaker::{BreakerConfig, CircuitState};
use crate::client::Client;
use crate::events::ClientEvent;
use crate::http::Request;
use crate::transport::{HttpTransport, ReqwestTransport};
use breakwater_core::EventListeners;
use std::sync::Arc;
use std::time::Duration;

/// Derives the breaker key for a request.
pub(crate) type KeyFn = Arc<dyn Fn(&Request) -> String + Send + Sync>;

/// Default key derivation: the URL's host. URLs without a host fall back to
/// the whole URL string so they do not alias into one shared bucket.
pub(crate) fn default_key(request: &Request) -> String {
    match request.url.host_str() {
        Some(host) => host.to_string(),
        None => request.url.as_str().to_string(),
    }
}

pub(crate) struct ClientConfig {
    pub(crate) max_in_flight: usize,
    pub(crate) max_queue: usize,
    pub(crate) enqueue_timeout: Duration,
    pub(crate) request_timeout: Duration,
    pub(crate) breaker: BreakerConfig,
    pub(crate) key_fn: KeyFn,
    pub(crate) event_listeners: EventListeners<ClientEvent>,
}

/// Builder for [`Client`].
///
/// ```rust
/// use breakwater::Client;
/// use std::time::Duration;
///
/// let client = Client::builder()
///     .max_in_flight(16)
///     .max_queue(64)
///     .enqueue_timeout(Duration::from_millis(250))
///     .request_timeout(Duration::from_secs(2))
///     .failure_threshold(0.5)
///     .cooldown(Duration::from_secs(5))
///     .build();
/// # let _ = client;
/// ```
pub struct ClientBuilder {
    max_in_flight: usize,
    max_queue: usize,
    enqueue_timeout: Duration,
    request_timeout: Duration,
    breaker: BreakerConfig,
    key_fn: KeyFn,
    event_listeners: EventListeners<ClientEvent>,
}

impl ClientBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            max_in_flight: 32,
            max_queue: 128,
            enqueue_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_secs(10),
            breaker: BreakerConfig::default(),
            key_fn: Arc::new(default_key),
            event_listeners: EventListeners::new(),
        }
    }

    /// Maximum concurrently executing requests.
    ///
    /// Default: 32
    pub fn max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    /// Maximum requests waiting for an in-flight slot. Zero disables
    /// queueing entirely: at capacity, requests are shed immediately.
    ///
    /// Default: 128
    pub fn max_queue(mut self, max: usize) -> Self {
        self.max_queue = max;
        self
    }

    /// How long a request may wait in the admission queue.
    ///
    /// Default: 500 ms
    pub fn enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout = timeout;
        self
    }

    /// Hard deadline for one outbound exchange, connection and body read
    /// included.
    ///
    /// Default: 10 s
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Outcomes tracked per upstream for the failure-rate window.
    ///
    /// Default: 50
    pub fn window_size(mut self, size: usize) -> Self {
        self.breaker.window_size = size;
        self
    }

    /// Minimum tracked outcomes before the failure rate can open a circuit.
    ///
    /// Default: 20
    pub fn min_requests(mut self, min: usize) -> Self {
        self.breaker.min_requests = min;
        self
    }

    /// Failure rate at or above which a circuit opens (`0.0..=1.0`).
    ///
    /// Default: 0.5
    pub fn failure_threshold(mut self, rate: f64) -> Self {
        self.breaker.failure_threshold = rate;
        self
    }

    /// How long an open circuit denies requests before probing.
    ///
    /// Default: 5 s
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.breaker.cooldown = cooldown;
        self
    }

    /// Concurrent probes while half-open; also the probe successes needed
    /// to close.
    ///
    /// Default: 3
    pub fn half_open_probes(mut self, probes: usize) -> Self {
        self.breaker.half_open_probes = probes;
        self
    }

    /// Replaces the breaker key derivation.
    ///
    /// Default: the request URL's host
    pub fn key_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request) -> String + Send + Sync + 'static,
    {
        self.key_fn = Arc::new(f);
        self
    }

    /// Registers a listener for every lifecycle event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(f);
        self
    }

    /// Registers a callback for breaker state changes.
    pub fn on_breaker_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners.add(move |event: &ClientEvent| {
            if let ClientEvent::BreakerState { key, from, to, .. } = event {
                f(key, *from, *to);
            }
        });
        self
    }

    /// Registers a callback for requests shed before any I/O.
    pub fn on_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.event_listeners.add(move |event: &ClientEvent| {
            if let ClientEvent::RequestRejected { key, error, .. } = event {
                f(key, error);
            }
        });
        self
    }

    /// Builds a client over the default reqwest transport.
    ///
    /// # Panics
    ///
    /// Panics if any configured value violates its documented bounds.
    pub fn build(self) -> Client<ReqwestTransport> {
        self.build_with_transport(ReqwestTransport::new())
    }

    /// Builds a client over a caller-supplied transport.
    ///
    /// # Panics
    ///
    /// Panics if any configured value violates its documented bounds.
    pub fn build_with_transport<T: HttpTransport>(self, transport: T) -> Client<T> {
        assert!(
            self.request_timeout > Duration::ZERO,
            "request_timeout must be positive"
        );
        let config = ClientConfig {
            max_in_flight: self.max_in_flight,
            max_queue: self.max_queue,
            enqueue_timeout: self.enqueue_timeout,
            request_timeout: self.request_timeout,
            breaker: self.breaker,
            key_fn: self.key_fn,
            event_listeners: self.event_listeners,
        };
        Client::from_config(config, transport)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
