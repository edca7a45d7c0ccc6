// tests/relay_tests.rs
use egress_relay::config::{RetryConfig, TargetConfig};
use egress_relay::gateway::{Gateway, RELAY_FAILURE_MESSAGE};
use egress_relay::pool::{AddressPool, HealthStatus};
use egress_relay::relay::{FailureKind, RelayOutcome, RelayRequest, RelayWorker};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn pool_of(addresses: &[&str], threshold: u32) -> Arc<AddressPool> {
    let addresses: Vec<IpAddr> = addresses.iter().map(|a| a.parse().unwrap()).collect();
    Arc::new(AddressPool::new(&addresses, threshold).unwrap())
}

fn worker_for(pool: Arc<AddressPool>, url: &str, max_attempts: u32) -> Arc<RelayWorker> {
    let target = TargetConfig {
        url: url.parse().unwrap(),
        timeout_secs: 2,
    };
    let retry = RetryConfig {
        max_attempts,
        backoff_base_ms: 10,
        backoff_max_ms: 50,
    };
    Arc::new(RelayWorker::new(pool, &target, retry, None).unwrap())
}

/// Upstream stub that answers a scripted sequence of responses, then keeps
/// repeating the last one.
async fn spawn_scripted_upstream(responses: Vec<(u16, &'static str)>) -> SocketAddr {
    let responses = Arc::new(responses);
    let counter = Arc::new(AtomicUsize::new(0));

    let make_service = make_service_fn(move |_| {
        let responses = responses.clone();
        let counter = counter.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |_req| {
                let responses = responses.clone();
                let counter = counter.clone();
                async move {
                    let idx = counter
                        .fetch_add(1, Ordering::SeqCst)
                        .min(responses.len() - 1);
                    let (status, body) = responses[idx];
                    Ok::<_, Infallible>(
                        Response::builder()
                            .status(status)
                            .body(Body::from(body))
                            .unwrap(),
                    )
                }
            }))
        }
    });

    let server = hyper::Server::bind(&"127.0.0.1:0".parse().unwrap()).serve(make_service);
    let addr = server.local_addr();
    tokio::spawn(async move {
        let _ = server.await;
    });
    addr
}

async fn body_string(response: Response<Body>) -> String {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn inbound_get_root() -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri("/")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn relay_returns_upstream_json_on_success() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ip":"198.51.100.7"}"#)
        .create_async()
        .await;

    let pool = pool_of(&["127.0.0.1"], 3);
    let worker = worker_for(pool.clone(), &server.url(), 3);

    let result = worker
        .relay(RelayRequest::get(server.url().parse().unwrap()))
        .await;

    mock.assert_async().await;
    assert_eq!(result.attempts, 1);
    assert!(!result.degraded);
    match result.outcome {
        RelayOutcome::Success { status, body } => {
            assert_eq!(status, 200);
            assert_eq!(body["ip"], "198.51.100.7");
        }
        other => panic!("expected success, got {:?}", other),
    }
    assert_eq!(pool.snapshot()[0].status, HealthStatus::Healthy);
}

#[tokio::test]
async fn relay_exhausts_retry_budget_on_persistent_5xx() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let pool = pool_of(&["127.0.0.1"], 3);
    let worker = worker_for(pool.clone(), &server.url(), 3);

    let result = worker
        .relay(RelayRequest::get(server.url().parse().unwrap()))
        .await;

    mock.assert_async().await;
    assert_eq!(result.attempts, 3);
    match result.outcome {
        RelayOutcome::Failure { kind, .. } => assert_eq!(kind, FailureKind::UpstreamStatus),
        other => panic!("expected failure, got {:?}", other),
    }
    // Three consecutive failures hit the default threshold.
    assert_eq!(pool.snapshot()[0].status, HealthStatus::Unhealthy);
}

#[tokio::test]
async fn relay_recovers_on_third_attempt_after_transient_failures() {
    let addr = spawn_scripted_upstream(vec![
        (503, ""),
        (503, ""),
        (200, r#"{"ip":"198.51.100.7"}"#),
    ])
    .await;
    let url = format!("http://{}/", addr);

    let pool = pool_of(&["127.0.0.1"], 5);
    let worker = worker_for(pool.clone(), &url, 3);

    let result = worker.relay(RelayRequest::get(url.parse().unwrap())).await;

    assert_eq!(result.attempts, 3);
    assert!(result.is_success());

    // Two reported failures, then one success resetting the counter.
    let snap = &pool.snapshot()[0];
    assert_eq!(snap.status, HealthStatus::Healthy);
    assert_eq!(snap.consecutive_failures, 0);
}

#[tokio::test]
async fn malformed_upstream_body_is_wrapped_not_failed() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/")
        .with_status(200)
        .with_body("not json at all")
        .create_async()
        .await;

    let pool = pool_of(&["127.0.0.1"], 3);
    let worker = worker_for(pool.clone(), &server.url(), 3);

    let result = worker
        .relay(RelayRequest::get(server.url().parse().unwrap()))
        .await;

    match result.outcome {
        RelayOutcome::Success { status, body } => {
            assert_eq!(status, 200);
            assert_eq!(body, serde_json::Value::String("not json at all".into()));
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn non_transient_upstream_status_is_passed_through_without_retry() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/")
        .with_status(404)
        .with_body("missing")
        .create_async()
        .await;

    let pool = pool_of(&["127.0.0.1"], 3);
    let worker = worker_for(pool.clone(), &server.url(), 3);

    let result = worker
        .relay(RelayRequest::get(server.url().parse().unwrap()))
        .await;

    mock.assert_async().await;
    assert_eq!(result.attempts, 1);
    match result.outcome {
        RelayOutcome::Success { status, .. } => assert_eq!(status, 404),
        other => panic!("expected pass-through, got {:?}", other),
    }
    // The address reached the upstream fine; its health is unaffected.
    assert_eq!(pool.snapshot()[0].status, HealthStatus::Healthy);
}

#[tokio::test]
async fn gateway_returns_ip_object_on_success() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/")
        .with_status(200)
        .with_body(r#"{"ip":"198.51.100.7"}"#)
        .create_async()
        .await;

    let pool = pool_of(&["127.0.0.1"], 3);
    let worker = worker_for(pool, &server.url(), 3);
    let gateway = Gateway::new(worker, server.url().parse().unwrap());

    let response = gateway.handle(inbound_get_root()).await;

    assert_eq!(response.status(), 200);
    assert_eq!(body_string(response).await, r#"{"ip":"198.51.100.7"}"#);
}

#[tokio::test]
async fn gateway_returns_fixed_failure_string_after_exhausted_retries() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let pool = pool_of(&["127.0.0.1"], 5);
    let worker = worker_for(pool, &server.url(), 3);
    let gateway = Gateway::new(worker, server.url().parse().unwrap());

    let response = gateway.handle(inbound_get_root()).await;

    mock.assert_async().await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        body_string(response).await,
        format!("\"{}\"", RELAY_FAILURE_MESSAGE)
    );
}

#[tokio::test]
async fn gateway_rotates_through_loopback_pool() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/")
        .with_status(200)
        .with_body(r#"{"ip":"198.51.100.7"}"#)
        .create_async()
        .await;

    // Loopback aliases stand in for distinct egress addresses.
    let pool = pool_of(&["127.0.0.1", "127.0.0.2"], 3);
    let worker = worker_for(pool.clone(), &server.url(), 3);
    let gateway = Gateway::new(worker, server.url().parse().unwrap());

    for _ in 0..2 {
        let response = gateway.handle(inbound_get_root()).await;
        assert_eq!(response.status(), 200);
        assert_eq!(body_string(response).await, r#"{"ip":"198.51.100.7"}"#);
    }

    // Both addresses carried one request each.
    for snap in pool.snapshot() {
        assert_eq!(snap.status, HealthStatus::Healthy);
        assert!(snap.last_checked.is_some());
    }
}
