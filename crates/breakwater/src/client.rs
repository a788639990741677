//! The resilient request pipeline.

use crate::breaker::{BreakerSnapshot, CircuitBreaker, CircuitState, Transition};
use crate::config::{ClientBuilder, ClientConfig, KeyFn};
use crate::error::Error;
use crate::events::ClientEvent;
use crate::http::{Request, Response};
use crate::limiter::{Admission, ConcurrencyLimiter};
use crate::transport::{HttpTransport, ReqwestTransport};
use breakwater_core::EventListeners;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Point-in-time view of the whole client.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    pub in_flight: usize,
    pub queue_depth: usize,
    pub breakers: Vec<BreakerSnapshot>,
}

struct Inner<T> {
    request_timeout: Duration,
    key_fn: KeyFn,
    limiter: ConcurrencyLimiter,
    breaker: CircuitBreaker,
    transport: T,
    events: EventListeners<ClientEvent>,
    next_request_id: AtomicU64,
}

/// Outbound HTTP client enforcing an in-flight cap, a bounded admission
/// queue, a per-request deadline, and a per-upstream circuit breaker.
///
/// Cheap to clone; clones share all protection state.
pub struct Client<T = ReqwestTransport> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Client<ReqwestTransport> {
    /// A client with the default configuration and transport.
    pub fn new() -> Self {
        ClientBuilder::new().build()
    }

    /// Starts configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl Default for Client<ReqwestTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: HttpTransport> Client<T> {
    pub(crate) fn from_config(config: ClientConfig, transport: T) -> Self {
        let limiter = ConcurrencyLimiter::new(
            config.max_in_flight,
            config.max_queue,
            config.enqueue_timeout,
        );
        let breaker = CircuitBreaker::new(config.breaker);
        Self {
            inner: Arc::new(Inner {
                request_timeout: config.request_timeout,
                key_fn: config.key_fn,
                limiter,
                breaker,
                transport,
                events: config.event_listeners,
                next_request_id: AtomicU64::new(1),
            }),
        }
    }

    /// Issues one logical request.
    ///
    /// The request passes the breaker, then the limiter, then runs on the
    /// transport under the request deadline; the outbound exchange happens
    /// at most once. Admission rejections (`QueueFull`, `QueueTimeout`,
    /// `CircuitOpen`) perform no I/O and are never reported to the breaker;
    /// outcomes of admitted requests always are, with `status >= 500`
    /// counting as an upstream failure even though the response is
    /// returned to the caller.
    pub async fn request(&self, request: Request) -> Result<Response, Error> {
        let inner = &self.inner;
        let request_id = inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        let key = (inner.key_fn)(&request);

        let decision = inner.breaker.allow(&key, Instant::now());
        if let Some(transition) = decision.transition {
            inner.emit_transition(&key, transition);
        }
        if !decision.allowed {
            let error = Error::CircuitOpen {
                key: key.clone(),
                retry_after: decision.retry_after.unwrap_or_default(),
            };
            inner.reject(&key, &request, request_id, &error);
            return Err(error);
        }
        // A half-open admission holds a probe slot. If the limiter sheds
        // this request before any I/O, the slot must go back without an
        // outcome being recorded.
        let probe = decision.state == CircuitState::HalfOpen;

        let permit = match inner.limiter.try_admit() {
            Admission::Granted(permit) => permit,
            Admission::QueueFull => {
                if probe {
                    inner.breaker.release_probe(&key);
                }
                inner.events.emit(&ClientEvent::QueueFull {
                    key: key.clone(),
                    request: request.clone(),
                    request_id,
                    queue_depth: inner.limiter.snapshot().queue_depth,
                    timestamp: Instant::now(),
                });
                let error = Error::QueueFull {
                    max_queue: inner.limiter.max_queue(),
                };
                inner.reject(&key, &request, request_id, &error);
                return Err(error);
            }
            Admission::Queued(waiting) => {
                inner.events.emit(&ClientEvent::QueueEnqueued {
                    key: key.clone(),
                    request: request.clone(),
                    request_id,
                    queue_depth: waiting.queue_depth(),
                    timestamp: Instant::now(),
                });
                match waiting.wait().await {
                    Ok(permit) => {
                        inner.events.emit(&ClientEvent::QueueDequeued {
                            key: key.clone(),
                            request: request.clone(),
                            request_id,
                            queue_depth: inner.limiter.snapshot().queue_depth,
                            timestamp: Instant::now(),
                        });
                        permit
                    }
                    Err(error) => {
                        if probe {
                            inner.breaker.release_probe(&key);
                        }
                        inner.events.emit(&ClientEvent::QueueTimeout {
                            key: key.clone(),
                            request: request.clone(),
                            request_id,
                            queue_depth: inner.limiter.snapshot().queue_depth,
                            timestamp: Instant::now(),
                        });
                        inner.reject(&key, &request, request_id, &error);
                        return Err(error);
                    }
                }
            }
        };

        let start = Instant::now();
        inner.events.emit(&ClientEvent::RequestStart {
            key: key.clone(),
            request: request.clone(),
            request_id,
            timestamp: start,
        });
        #[cfg(feature = "tracing")]
        tracing::debug!(key = %key, request_id, "request admitted");

        let result = inner
            .transport
            .execute(&request, inner.request_timeout)
            .await;
        let duration = start.elapsed();

        let outcome = match result {
            Ok(response) => {
                // A completed exchange with a 5xx is a success for the
                // caller but a failure signal for the breaker.
                let transition = if response.status >= 500 {
                    inner.breaker.on_failure(&key, Instant::now())
                } else {
                    inner.breaker.on_success(&key)
                };
                if let Some(transition) = transition {
                    inner.emit_transition(&key, transition);
                }
                inner.events.emit(&ClientEvent::RequestSuccess {
                    key: key.clone(),
                    request: request.clone(),
                    request_id,
                    status: response.status,
                    duration,
                    timestamp: Instant::now(),
                });
                #[cfg(feature = "metrics")]
                metrics::counter!("breakwater_requests_total", "outcome" => "success")
                    .increment(1);
                Ok(response)
            }
            Err(error) => {
                let transition = inner.breaker.on_failure(&key, Instant::now());
                if let Some(transition) = transition {
                    inner.emit_transition(&key, transition);
                }
                inner.events.emit(&ClientEvent::RequestFailure {
                    key: key.clone(),
                    request: request.clone(),
                    request_id,
                    error_name: error.name(),
                    duration,
                    timestamp: Instant::now(),
                });
                #[cfg(feature = "tracing")]
                tracing::debug!(key = %key, request_id, error = %error, "request failed");
                #[cfg(feature = "metrics")]
                metrics::counter!("breakwater_requests_total", "outcome" => "failure")
                    .increment(1);
                Err(error)
            }
        };

        drop(permit);
        outcome
    }

    /// Current limiter counters and every breaker bucket.
    pub fn snapshot(&self) -> ClientSnapshot {
        let limiter = self.inner.limiter.snapshot();
        ClientSnapshot {
            in_flight: limiter.in_flight,
            queue_depth: limiter.queue_depth,
            breakers: self.inner.breaker.snapshot(),
        }
    }

    /// The shared circuit breaker, for inspection and manual control.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.inner.breaker
    }
}

impl<T> Inner<T> {
    fn reject(&self, key: &str, request: &Request, request_id: u64, error: &Error) {
        self.events.emit(&ClientEvent::RequestRejected {
            key: key.to_string(),
            request: request.clone(),
            request_id,
            error: error.to_string(),
            timestamp: Instant::now(),
        });
        #[cfg(feature = "tracing")]
        tracing::debug!(key = %key, request_id, error = %error, "request rejected");
        #[cfg(feature = "metrics")]
        metrics::counter!("breakwater_requests_total", "outcome" => "rejected").increment(1);
    }

    fn emit_transition(&self, key: &str, transition: Transition) {
        self.events.emit(&ClientEvent::BreakerState {
            key: key.to_string(),
            from: transition.from,
            to: transition.to,
            timestamp: Instant::now(),
        });
        #[cfg(feature = "tracing")]
        tracing::info!(
            key = %key,
            from = %transition.from,
            to = %transition.to,
            "breaker state changed"
        );
        #[cfg(feature = "metrics")]
        metrics::counter!(
            "breakwater_breaker_transitions_total",
            "from" => transition.from.to_string(),
            "to" => transition.to.to_string()
        )
        .increment(1);
    }
}

impl<T> std::fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("limiter", &self.inner.limiter)
            .field("breaker", &self.inner.breaker)
            .finish()
    }
}
