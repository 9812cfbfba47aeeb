//! Retry and backoff tests.
//!
//! # Invariants
//! - 429, 502, 503, 504 and transport failures are retried
//! - Every other status is returned after a single attempt
//! - A 504 carrying the index DDL timeout code is not retried
//! - When attempts or the time budget run out, the last classified error is returned
//! - `Retry-After` raises the wait before the next attempt
//!
//! # What this does NOT handle
//! - Single-attempt classification (see executor_tests.rs)

mod common;

use std::net::TcpListener;
use std::time::{Duration, Instant};

use capella_client::{CapellaClient, RateLimiter, RetryPolicy};
use common::*;
use serde_json::json;
use wiremock::matchers::{method, path};

fn clusters_endpoint(server: &MockServer) -> EndpointConfig {
    EndpointConfig::get(format!(
        "{}/v4/organizations/org-1/projects/p-1/clusters",
        server.uri()
    ))
}

#[tokio::test]
async fn test_retry_on_503_then_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v4/organizations/org-1/projects/p-1/clusters"))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(api_error_body(
                503,
                503,
                "Service Unavailable",
            )),
        )
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v4/organizations/org-1/projects/p-1/clusters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server.uri());
    let response = client
        .execute_with_retry(&clusters_endpoint(&mock_server), None, &token(), &never_cancelled())
        .await
        .unwrap();

    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_retry_exhaustion_returns_last_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v4/organizations/org-1/projects/p-1/clusters"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(api_error_body(
                6001,
                429,
                "Too many requests",
            )),
        )
        .expect(4)
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server.uri());
    let err = client
        .execute_with_retry(&clusters_endpoint(&mock_server), None, &token(), &never_cancelled())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(429));
    assert_eq!(err.server_code(), Some(6001));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_mixed_transient_statuses_then_success() {
    let mock_server = MockServer::start().await;

    for status in [502, 429, 504] {
        Mock::given(method("GET"))
            .and(path("/v4/organizations/org-1/projects/p-1/clusters"))
            .respond_with(ResponseTemplate::new(status))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/v4/organizations/org-1/projects/p-1/clusters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server.uri());
    client
        .execute_with_retry(&clusters_endpoint(&mock_server), None, &token(), &never_cancelled())
        .await
        .unwrap();

    assert_eq!(mock_server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_non_transient_statuses_are_not_retried() {
    for status in [400, 401, 403, 404, 409, 422, 500] {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v4/organizations/org-1/projects/p-1/clusters"))
            .respond_with(ResponseTemplate::new(status))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = fast_client(&mock_server.uri());
        let err = client
            .execute_with_retry(&clusters_endpoint(&mock_server), None, &token(), &never_cancelled())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(status), "status {status}");
        assert!(!err.is_transient(), "status {status}");
        mock_server.verify().await;
    }
}

#[tokio::test]
async fn test_index_ddl_gateway_timeout_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v4/organizations/org-1/projects/p-1/clusters/c-1/queryService/indexes"))
        .respond_with(ResponseTemplate::new(504).set_body_json(api_error_body(
            7001,
            504,
            "The index DDL request timed out.",
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server.uri());
    let endpoint = EndpointConfig::post(format!(
        "{}/v4/organizations/org-1/projects/p-1/clusters/c-1/queryService/indexes",
        mock_server.uri()
    ))
    .with_success_status(reqwest::StatusCode::OK);

    let err = client
        .execute_with_retry(&endpoint, None, &token(), &never_cancelled())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(504));
    assert_eq!(err.server_code(), Some(7001));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_connection_refused_is_retried_then_surfaced() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let host = format!("http://127.0.0.1:{port}");
    let client = fast_client(&host);

    let started = Instant::now();
    let err = client
        .execute_with_retry(
            &EndpointConfig::get(format!("{host}/v4/organizations")),
            None,
            &token(),
            &never_cancelled(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport(TransportKind::Connect));
    assert!(err.is_transient());
    // Three backoffs of 5, 10 and 20ms separate the four attempts.
    assert!(started.elapsed() >= Duration::from_millis(35));
}

#[tokio::test]
async fn test_timeout_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v4/organizations/org-1/projects/p-1/clusters"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v4/organizations/org-1/projects/p-1/clusters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&mock_server)
        .await;

    let client = CapellaClient::builder()
        .host(mock_server.uri())
        .timeout(Duration::from_millis(200))
        .retry_policy(fast_retry_policy(3))
        .rate_limiter(RateLimiter::unlimited())
        .build()
        .unwrap();

    let response = client
        .execute_with_retry(&clusters_endpoint(&mock_server), None, &token(), &never_cancelled())
        .await
        .unwrap();

    assert_eq!(response.status.as_u16(), 200);
}

#[tokio::test]
async fn test_retry_after_header_extends_wait() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v4/organizations/org-1/projects/p-1/clusters"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v4/organizations/org-1/projects/p-1/clusters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server.uri());
    let started = Instant::now();
    client
        .execute_with_retry(&clusters_endpoint(&mock_server), None, &token(), &never_cancelled())
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn test_time_budget_stops_retries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v4/organizations/org-1/projects/p-1/clusters"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server.uri());
    let policy = RetryPolicy {
        max_attempts: 10,
        base_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(1),
        jitter: 0.0,
        max_elapsed: Duration::from_millis(100),
    };

    let started = Instant::now();
    let err = client
        .execute_with_policy(
            &clusters_endpoint(&mock_server),
            None,
            &token(),
            &policy,
            &never_cancelled(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(503));
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn test_single_attempt_policy() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v4/organizations/org-1/projects/p-1/clusters"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server.uri());
    let err = client
        .execute_with_policy(
            &clusters_endpoint(&mock_server),
            None,
            &token(),
            &RetryPolicy::none(),
            &never_cancelled(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn test_cancel_during_backoff() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v4/organizations/org-1/projects/p-1/clusters"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let client = fast_client(&mock_server.uri());
    let policy = RetryPolicy {
        max_attempts: 5,
        base_delay: Duration::from_secs(5),
        max_delay: Duration::from_secs(5),
        jitter: 0.0,
        max_elapsed: Duration::from_secs(60),
    };
    let cancel = never_cancelled();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let err = client
        .execute_with_policy(&clusters_endpoint(&mock_server), None, &token(), &policy, &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
}
