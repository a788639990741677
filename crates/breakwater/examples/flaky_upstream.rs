//! Runs the client against a deliberately failing upstream and prints the
//! breaker lifecycle as it opens, cools down, and recovers.
//!
//! Run with: cargo run --example flaky_upstream

use breakwater::{Client, ClientEvent, ObservableEvent, Request, Url};
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::main]
async fn main() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = Client::builder()
        .max_in_flight(4)
        .window_size(10)
        .min_requests(3)
        .failure_threshold(0.5)
        .cooldown(Duration::from_millis(400))
        .half_open_probes(1)
        .on_event(|event: &ClientEvent| match event {
            ClientEvent::BreakerState { key, from, to, .. } => {
                println!("  [{key}] breaker {from} -> {to}");
            }
            ClientEvent::RequestRejected { key, error, .. } => {
                println!("  [{key}] rejected: {error}");
            }
            other => println!("  [{}] {}", other.key(), other.event_type()),
        })
        .build();

    let url = Url::parse(&format!("{}/orders", server.uri())).expect("mock server url");

    println!("upstream failing:");
    for _ in 0..4 {
        match client.request(Request::get(url.clone())).await {
            Ok(response) => println!("  -> {}", response.status),
            Err(err) => println!("  -> {err}"),
        }
    }

    println!("during cooldown, requests fail fast:");
    let _ = client.request(Request::get(url.clone())).await;

    println!("upstream recovers:");
    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;
    tokio::time::sleep(Duration::from_millis(450)).await;

    match client.request(Request::get(url)).await {
        Ok(response) => println!("  -> {}", response.status),
        Err(err) => println!("  -> {err}"),
    }

    println!("final snapshot: {:#?}", client.snapshot());
}
