//! Outbound HTTP client that protects the process from misbehaving
//! upstreams.
//!
//! Four coupled protections guard every call:
//! - a hard cap on concurrent in-flight requests,
//! - a bounded FIFO admission queue with an enqueue timeout,
//! - a hard per-request deadline,
//! - a per-upstream circuit breaker over a rolling outcome window.
//!
//! A logical request passes the breaker, then the limiter, then runs on the
//! transport; the outbound exchange happens at most once. Requests shed by
//! the queue or the breaker fail fast without any I/O, and local
//! load-shedding is never fed back into the breaker, so a busy process
//! cannot talk itself into opening a healthy upstream's circuit.
//!
//! ## Basic example
//!
//! ```rust,no_run
//! use breakwater::{Client, Request, Url};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), breakwater::Error> {
//! let client = Client::builder()
//!     .max_in_flight(10)
//!     .max_queue(100)
//!     .enqueue_timeout(Duration::from_millis(500))
//!     .request_timeout(Duration::from_millis(500))
//!     .build();
//!
//! let url = Url::parse("https://api.example.com/health").expect("static url");
//! let response = client.request(Request::get(url)).await?;
//! assert!(response.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! ## Handling rejections
//!
//! Every failure is one variant of the closed [`Error`] taxonomy:
//!
//! ```rust,no_run
//! use breakwater::{Client, Error, Request, Url};
//!
//! # async fn example() {
//! # let client = Client::new();
//! # let url = Url::parse("https://api.example.com/").expect("static url");
//! match client.request(Request::get(url)).await {
//!     Ok(response) => println!("{}", response.status),
//!     Err(Error::CircuitOpen { key, retry_after }) => {
//!         eprintln!("{key} is open, retry in {retry_after:?}");
//!     }
//!     Err(err) if err.is_rejection() => eprintln!("shed locally: {err}"),
//!     Err(err) => eprintln!("exchange failed: {err}"),
//! }
//! # }
//! ```
//!
//! ## Watching the lifecycle
//!
//! ```rust
//! use breakwater::{Client, ClientEvent};
//!
//! let client = Client::builder()
//!     .on_breaker_transition(|key, from, to| {
//!         println!("{key}: {from} -> {to}");
//!     })
//!     .on_event(|event: &ClientEvent| {
//!         // every queue/request/breaker event passes through here
//!         let _ = event;
//!     })
//!     .build();
//! # let _ = client;
//! ```
//!
//! ## Feature flags
//! - `tracing`: log admissions, rejections, and breaker transitions via the
//!   `tracing` crate
//! - `metrics`: request counters and breaker transition counters via the
//!   `metrics` crate

pub use breaker::{
    BreakerConfig, BreakerSnapshot, CircuitBreaker, CircuitState, Decision, Transition,
};
pub use client::{Client, ClientSnapshot};
pub use config::ClientBuilder;
pub use error::Error;
pub use events::ClientEvent;
pub use http::{Method, Request, Response};
pub use limiter::{Admission, ConcurrencyLimiter, LimiterSnapshot, Permit, Waiting};
pub use transport::{HttpTransport, ReqwestTransport};
pub use window::RollingWindow;

pub use breakwater_core::{EventListener, EventListeners, ObservableEvent};

// Re-exported so callers build requests without naming these crates.
pub use bytes::Bytes;
pub use url::Url;

mod breaker;
mod client;
mod config;
mod error;
mod events;
mod http;
mod limiter;
mod transport;
mod window;
