//! Lifecycle events emitted by the client.
//!
//! Every event names the upstream key it concerns and, where one exists,
//! the logical request (with its client-assigned id). Register listeners
//! through the builder; dispatch is synchronous, in registration order.

use crate::breaker::CircuitState;
use crate::http::Request;
use breakwater_core::ObservableEvent;
use std::time::{Duration, Instant};

/// Everything the client reports about a request's life.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A request entered the admission queue.
    QueueEnqueued {
        key: String,
        request: Request,
        request_id: u64,
        queue_depth: usize,
        timestamp: Instant,
    },
    /// A queued request was handed a permit.
    QueueDequeued {
        key: String,
        request: Request,
        request_id: u64,
        queue_depth: usize,
        timestamp: Instant,
    },
    /// A request was shed because the queue was at capacity.
    QueueFull {
        key: String,
        request: Request,
        request_id: u64,
        queue_depth: usize,
        timestamp: Instant,
    },
    /// A queued request waited out the enqueue timeout.
    QueueTimeout {
        key: String,
        request: Request,
        request_id: u64,
        queue_depth: usize,
        timestamp: Instant,
    },
    /// An admitted request is about to hit the transport.
    RequestStart {
        key: String,
        request: Request,
        request_id: u64,
        timestamp: Instant,
    },
    /// The exchange completed with a status (5xx included; the status is
    /// the breaker's concern, not the event's).
    RequestSuccess {
        key: String,
        request: Request,
        request_id: u64,
        status: u16,
        duration: Duration,
        timestamp: Instant,
    },
    /// The exchange failed in flight (deadline or transport).
    RequestFailure {
        key: String,
        request: Request,
        request_id: u64,
        error_name: &'static str,
        duration: Duration,
        timestamp: Instant,
    },
    /// The request was rejected before any outbound I/O.
    RequestRejected {
        key: String,
        request: Request,
        request_id: u64,
        error: String,
        timestamp: Instant,
    },
    /// A breaker bucket changed state.
    BreakerState {
        key: String,
        from: CircuitState,
        to: CircuitState,
        timestamp: Instant,
    },
}

impl ObservableEvent for ClientEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::QueueEnqueued { .. } => "queue:enqueued",
            ClientEvent::QueueDequeued { .. } => "queue:dequeued",
            ClientEvent::QueueFull { .. } => "queue:full",
            ClientEvent::QueueTimeout { .. } => "queue:timeout",
            ClientEvent::RequestStart { .. } => "request:start",
            ClientEvent::RequestSuccess { .. } => "request:success",
            ClientEvent::RequestFailure { .. } => "request:failure",
            ClientEvent::RequestRejected { .. } => "request:rejected",
            ClientEvent::BreakerState { .. } => "breaker:state",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            ClientEvent::QueueEnqueued { timestamp, .. }
            | ClientEvent::QueueDequeued { timestamp, .. }
            | ClientEvent::QueueFull { timestamp, .. }
            | ClientEvent::QueueTimeout { timestamp, .. }
            | ClientEvent::RequestStart { timestamp, .. }
            | ClientEvent::RequestSuccess { timestamp, .. }
            | ClientEvent::RequestFailure { timestamp, .. }
            | ClientEvent::RequestRejected { timestamp, .. }
            | ClientEvent::BreakerState { timestamp, .. } => *timestamp,
        }
    }

    fn key(&self) -> &str {
        match self {
            ClientEvent::QueueEnqueued { key, .. }
            | ClientEvent::QueueDequeued { key, .. }
            | ClientEvent::QueueFull { key, .. }
            | ClientEvent::QueueTimeout { key, .. }
            | ClientEvent::RequestStart { key, .. }
            | ClientEvent::RequestSuccess { key, .. }
            | ClientEvent::RequestFailure { key, .. }
            | ClientEvent::RequestRejected { key, .. }
            | ClientEvent::BreakerState { key, .. } => key,
        }
    }
}
