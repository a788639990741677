//! The client's error taxonomy.

use std::time::Duration;
use thiserror::Error;

/// Every way a [`crate::Client::request`] call can fail.
///
/// The first three variants are admission rejections: the request was shed
/// before any outbound I/O happened. `RequestTimeout` and `Transport` are
/// outcomes of an admitted request and are reported to the circuit breaker;
/// rejections never are.
#[derive(Debug, Error)]
pub enum Error {
    /// The waiting queue was at capacity; the request was shed immediately.
    #[error("admission queue is full (max {max_queue} waiting)")]
    QueueFull {
        /// Configured queue bound.
        max_queue: usize,
    },

    /// The request waited the full enqueue timeout without being handed a
    /// permit.
    #[error("timed out after {waited:?} waiting for an in-flight slot")]
    QueueTimeout {
        /// How long the request waited (the configured enqueue timeout).
        waited: Duration,
    },

    /// The upstream's circuit is open; the request was denied without I/O.
    #[error("circuit for `{key}` is open; retry after {retry_after:?}")]
    CircuitOpen {
        /// Breaker key of the denied upstream.
        key: String,
        /// Remaining cooldown; zero when denied by the half-open probe bound.
        retry_after: Duration,
    },

    /// The exchange did not complete within the per-request deadline.
    #[error("request exceeded its {deadline:?} deadline")]
    RequestTimeout {
        /// The configured request timeout.
        deadline: Duration,
    },

    /// The transport failed; the underlying error is surfaced unmodified.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// True for local load-shedding and breaker denials — failures that
    /// performed no outbound I/O.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::QueueFull { .. } | Error::QueueTimeout { .. } | Error::CircuitOpen { .. }
        )
    }

    /// True if the breaker denied this request.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Error::CircuitOpen { .. })
    }

    /// True for either timeout flavor: queued too long or the outbound
    /// exchange missed its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::QueueTimeout { .. } | Error::RequestTimeout { .. })
    }

    /// Suggested wait before retrying, when the breaker supplied one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::CircuitOpen { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Stable snake_case name of the variant, used as the `error_name`
    /// field in lifecycle events.
    pub fn name(&self) -> &'static str {
        match self {
            Error::QueueFull { .. } => "queue_full",
            Error::QueueTimeout { .. } => "queue_timeout",
            Error::CircuitOpen { .. } => "circuit_open",
            Error::RequestTimeout { .. } => "request_timeout",
            Error::Transport(_) => "transport",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(Box::new(err))
    }
}
