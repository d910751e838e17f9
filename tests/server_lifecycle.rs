//! Lifecycle tests against a real listener.

use std::time::Duration;

use tokio::net::TcpListener;

use traced_api::config::ServiceConfig;
use traced_api::http::HttpServer;
use traced_api::lifecycle::{Lifecycle, LifecycleState};
use traced_api::observability::LogSinkHandle;
use traced_api::telemetry::emitter::BackendSink;
use traced_api::telemetry::Agent;

async fn start_server(
    config: ServiceConfig,
) -> (std::net::SocketAddr, Lifecycle, tokio::task::JoinHandle<Result<(), traced_api::ServeError>>) {
    let (sink, _store) = BackendSink::memory();
    let agent = Agent::with_sink(&config.agent, sink);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let lifecycle = Lifecycle::new();
    let server = HttpServer::new(config, agent, LogSinkHandle::disabled());

    let run = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move { server.run(listener, lifecycle).await })
    };

    // wait for the Listening transition
    for _ in 0..50 {
        if lifecycle.state() == LifecycleState::Listening {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(lifecycle.state(), LifecycleState::Listening);

    (addr, lifecycle, run)
}

#[tokio::test]
async fn in_flight_request_completes_while_draining() {
    let mut config = ServiceConfig::default();
    config.shutdown.grace_period_secs = 5;
    let (addr, lifecycle, run) = start_server(config).await;

    // /submit-data sleeps 50ms, long enough to still be in flight when the
    // drain starts
    let request = tokio::spawn(async move {
        reqwest::Client::new()
            .post(format!("http://{}/submit-data", addr))
            .json(&serde_json::json!({"userId": "u1"}))
            .send()
            .await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    lifecycle.begin_draining();

    let response = request
        .await
        .unwrap()
        .expect("in-flight request must still complete");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "success");

    // the serve loop finishes cleanly once drained
    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("server must stop within the grace period")
        .unwrap();
    assert!(result.is_ok());

    // no new connections after the drain
    let refused = reqwest::Client::new()
        .get(format!("http://{}/", addr))
        .timeout(Duration::from_secs(1))
        .send()
        .await;
    assert!(refused.is_err());
}

#[tokio::test]
async fn drain_with_no_traffic_stops_immediately() {
    let (addr, lifecycle, run) = start_server(ServiceConfig::default()).await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    lifecycle.begin_draining();
    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("idle server must stop promptly")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn responses_carry_the_trace_header_end_to_end() {
    let (addr, lifecycle, _run) = start_server(ServiceConfig::default()).await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/", addr))
        .send()
        .await
        .unwrap();
    let header = response
        .headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .expect("x-trace-id header expected");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["traceId"].as_str().unwrap(), header);

    lifecycle.begin_draining();
}
