//! The HTTP transport seam.
//!
//! The pipeline asks the transport for exactly one thing: perform one HTTP
//! exchange under a deadline. Connection pooling, TLS, redirects, and DNS
//! all live behind this trait.

use crate::error::Error;
use crate::http::{Request, Response};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

/// Performs one HTTP exchange, honoring the per-request deadline.
///
/// Implementations must surface a missed deadline as
/// [`Error::RequestTimeout`] and must not leave work running past it. The
/// response body is read fully into memory and response header keys are
/// lowercased, with repeated headers joined by `", "`.
pub trait HttpTransport: Send + Sync {
    /// Executes `request`, resolving within `deadline`.
    fn execute(
        &self,
        request: &Request,
        deadline: Duration,
    ) -> impl Future<Output = Result<Response, Error>> + Send;
}

/// [`HttpTransport`] backed by a shared [`reqwest::Client`] connection pool.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport over a default connection pool.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Wraps an already-configured pool.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &Request, deadline: Duration) -> Result<Response, Error> {
        let mut builder = self
            .client
            .request(request.method.to_reqwest(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        // One timeout covers the whole exchange, body read included;
        // dropping the future on expiry cancels whatever is in flight.
        let exchange = async {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let headers = normalize_headers(response.headers());
            let body = response.bytes().await?;
            Ok(Response {
                status,
                headers,
                body,
            })
        };

        match tokio::time::timeout(deadline, exchange).await {
            Ok(result) => result,
            Err(_) => Err(Error::RequestTimeout { deadline }),
        }
    }
}

/// Lowercases header keys and joins repeated headers with `", "`.
/// Values that are not valid UTF-8 are skipped.
fn normalize_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect::<Vec<_>>()
            .join(", ");
        out.insert(name.as_str().to_ascii_lowercase(), joined);
    }
    out
}
