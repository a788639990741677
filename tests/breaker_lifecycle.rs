//! Breaker lifecycle: opening on real upstream failures, fail-fast during
//! cooldown, half-open probing, and recovery.

use breakwater::{
    BreakerConfig, CircuitBreaker, CircuitState, Client, Error, HttpTransport, Request, Response,
    Url,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn get(url: &str) -> Request {
    Request::get(Url::parse(url).expect("test url"))
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn opens_on_server_errors_then_recovers_through_a_probe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = Client::builder()
        .window_size(10)
        .min_requests(4)
        .failure_threshold(0.5)
        .cooldown(Duration::from_millis(200))
        .half_open_probes(1)
        .build();
    let url = format!("{}/data", server.uri());

    for _ in 0..4 {
        let response = client.request(get(&url)).await.unwrap();
        assert_eq!(response.status, 500);
    }
    assert_eq!(client.breaker().state("127.0.0.1"), CircuitState::Open);

    // Fail-fast while cooling down: the upstream sees nothing.
    let before = server.received_requests().await.unwrap().len();
    let err = client.request(get(&url)).await.unwrap_err();
    assert!(err.is_circuit_open());
    assert!(err.retry_after().unwrap() > Duration::ZERO);
    assert_eq!(server.received_requests().await.unwrap().len(), before);

    // Upstream recovers; after the cooldown one probe closes the circuit.
    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("back"))
        .mount(&server)
        .await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    let response = client.request(get(&url)).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(client.breaker().state("127.0.0.1"), CircuitState::Closed);
}

#[tokio::test]
async fn half_open_denies_beyond_the_probe_bound() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = Client::builder()
        .min_requests(1)
        .failure_threshold(1.0)
        .cooldown(Duration::from_millis(100))
        .half_open_probes(1)
        .build();
    let url = format!("{}/data", server.uri());

    let _ = client.request(get(&url)).await.unwrap();
    assert_eq!(client.breaker().state("127.0.0.1"), CircuitState::Open);

    // Recover the upstream, but slowly, so the probe stays in flight.
    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let probe = {
        let client = client.clone();
        let url = url.clone();
        tokio::spawn(async move { client.request(get(&url)).await })
    };
    wait_until(|| client.snapshot().in_flight == 1).await;
    assert_eq!(client.breaker().state("127.0.0.1"), CircuitState::HalfOpen);

    // The probe slot is taken; further requests are denied with no wait hint.
    let err = client.request(get(&url)).await.unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(err.retry_after(), Some(Duration::ZERO));

    assert_eq!(probe.await.unwrap().unwrap().status, 200);
    assert_eq!(client.breaker().state("127.0.0.1"), CircuitState::Closed);
}

/// Transport with per-host behavior: `slow.test` responds 200 after a
/// delay, anything else responds 503 immediately.
struct HostTransport;

impl HttpTransport for HostTransport {
    async fn execute(&self, request: &Request, _deadline: Duration) -> Result<Response, Error> {
        let (status, delay) = match request.url.host_str() {
            Some("slow.test") => (200, Duration::from_millis(200)),
            _ => (503, Duration::ZERO),
        };
        tokio::time::sleep(delay).await;
        Ok(Response {
            status,
            headers: HashMap::new(),
            body: breakwater::Bytes::new(),
        })
    }
}

#[tokio::test]
async fn probe_reservation_is_returned_when_the_limiter_sheds() {
    let client = Client::builder()
        .max_in_flight(1)
        .max_queue(0)
        .enqueue_timeout(Duration::from_millis(100))
        .min_requests(1)
        .failure_threshold(1.0)
        .cooldown(Duration::from_millis(50))
        .half_open_probes(1)
        .build_with_transport(HostTransport);

    // Open the circuit for down.test.
    let response = client.request(get("http://down.test/")).await.unwrap();
    assert_eq!(response.status, 503);
    assert_eq!(client.breaker().state("down.test"), CircuitState::Open);
    tokio::time::sleep(Duration::from_millis(60)).await;

    // A request to another upstream occupies the only permit.
    let holder = {
        let client = client.clone();
        tokio::spawn(async move { client.request(get("http://slow.test/")).await })
    };
    wait_until(|| client.snapshot().in_flight == 1).await;

    // The probe passes the breaker but is shed by the limiter.
    let err = client.request(get("http://down.test/")).await.unwrap_err();
    assert!(matches!(err, Error::QueueFull { .. }));
    assert_eq!(client.breaker().state("down.test"), CircuitState::HalfOpen);

    // The probe slot came back: the breaker can admit another probe.
    let decision = client.breaker().allow("down.test", Instant::now());
    assert!(decision.allowed);
    client.breaker().release_probe("down.test");

    assert_eq!(holder.await.unwrap().unwrap().status, 200);
}

#[test]
fn fail_fast_window_then_half_open_with_injected_clock() {
    let breaker = CircuitBreaker::new(BreakerConfig {
        window_size: 5,
        min_requests: 1,
        failure_threshold: 1.0,
        cooldown: Duration::from_millis(100),
        half_open_probes: 2,
    });
    let t0 = Instant::now();

    breaker.on_failure("shard-1", t0 + Duration::from_millis(1_000));
    assert_eq!(breaker.state("shard-1"), CircuitState::Open);

    let denied = breaker.allow("shard-1", t0 + Duration::from_millis(1_050));
    assert!(!denied.allowed);
    assert_eq!(denied.retry_after, Some(Duration::from_millis(50)));

    let admitted = breaker.allow("shard-1", t0 + Duration::from_millis(1_120));
    assert!(admitted.allowed);
    assert_eq!(admitted.state, CircuitState::HalfOpen);

    assert!(breaker.allow("shard-1", t0 + Duration::from_millis(1_121)).allowed);
    assert!(!breaker.allow("shard-1", t0 + Duration::from_millis(1_122)).allowed);

    assert!(breaker.on_success("shard-1").is_none());
    let transition = breaker.on_success("shard-1").expect("closes");
    assert_eq!(transition.to, CircuitState::Closed);
}
