//! Integration tests for `ResilientClient` over fake ports.
//!
//! All tests run with paused Tokio time: backoff sleeps, transport latency
//! and refresh delays advance the clock instantly and deterministically.

mod support;

use std::sync::Arc;
use std::time::Duration;

use clinicdesk_common::CircuitState;
use clinicdesk_core::{RefreshError, RequestOptions, TransportError};
use clinicdesk_domain::constants::{AUTHORIZATION_HEADER, REQUEST_ID_HEADER};
use clinicdesk_domain::{ClientError, ErrorCode, Page};
use serde::Deserialize;
use serde_json::json;
use support::transport::{network_down, ok, status};
use support::{config, harness, FakeTransport, StubRefresher};
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

fn no_refresh() -> Arc<StubRefresher> {
    Arc::new(StubRefresher::failing(RefreshError::MissingRefreshToken))
}

/// Validates single-flight refresh under concurrency.
///
/// # Test Steps
/// 1. Five requests are in flight with a stale token; all get 401
/// 2. The refresh takes 50ms so every 401 lands while it is pending
///
/// Assertions:
/// - Exactly one refresh call is made.
/// - Every request succeeds after one replay with the new token.
/// - The breaker stays closed with no recorded failures.
#[tokio::test(start_paused = true)]
async fn test_concurrent_401s_trigger_one_refresh() {
    let h = harness(
        config(),
        Arc::new(FakeTransport::requiring_fresh_token().with_latency(Duration::from_millis(10))),
        Arc::new(StubRefresher::succeeding(Duration::from_millis(50))),
    );

    let handles: Vec<_> = (1..=5)
        .map(|id| {
            let client = Arc::clone(&h.client);
            tokio::spawn(async move {
                client.get(&format!("/patients/{id}"), RequestOptions::default()).await
            })
        })
        .collect();

    for handle in handles {
        let response = handle.await.expect("task").expect("request recovers");
        assert_eq!(response.status, 200);
    }

    assert_eq!(h.refresher.calls(), 1);
    assert_eq!(h.client.refresh_count(), 1);
    assert_eq!(h.transport.calls(), 10);

    let replays = h
        .transport
        .requests()
        .into_iter()
        .filter(|request| request.header(AUTHORIZATION_HEADER) == Some("Bearer fresh"))
        .count();
    assert_eq!(replays, 5);

    let metrics = h.client.breaker_metrics();
    assert_eq!(metrics.state, CircuitState::Closed);
    assert_eq!(metrics.consecutive_failures, 0);
}

/// Validates FIFO replay ordering.
///
/// # Test Steps
/// 1. Requests A, B and C receive their 401s 5ms apart
/// 2. The refresh completes after all three are queued
///
/// Assertions:
/// - Replays reach the transport in order A, B, C.
#[tokio::test(start_paused = true)]
async fn test_replays_follow_arrival_order() {
    let h = harness(
        config(),
        Arc::new(FakeTransport::requiring_fresh_token().with_latency(Duration::from_millis(10))),
        Arc::new(StubRefresher::succeeding(Duration::from_millis(50))),
    );

    let mut handles = Vec::new();
    for name in ["a", "b", "c"] {
        let client = Arc::clone(&h.client);
        handles.push(tokio::spawn(async move {
            client.get(&format!("/appointments/{name}"), RequestOptions::default()).await
        }));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for handle in handles {
        handle.await.expect("task").expect("request recovers");
    }

    let replayed: Vec<String> = h
        .transport
        .requests()
        .into_iter()
        .filter(|request| request.header(AUTHORIZATION_HEADER) == Some("Bearer fresh"))
        .map(|request| request.url)
        .collect();
    assert_eq!(
        replayed,
        vec![
            "http://clinic.test/api/appointments/a",
            "http://clinic.test/api/appointments/b",
            "http://clinic.test/api/appointments/c",
        ]
    );
}

/// Validates the end-to-end 401 path for a single request.
///
/// Assertions:
/// - The caller sees only the replayed 200.
/// - The new credential is stored in the session.
/// - Every attempt carries a request id.
#[tokio::test(start_paused = true)]
async fn test_401_refresh_and_replay_end_to_end() {
    let h = harness(
        config(),
        Arc::new(FakeTransport::requiring_fresh_token()),
        Arc::new(StubRefresher::succeeding(Duration::from_millis(20))),
    );

    let response = h.client.get("/billing/invoices", RequestOptions::default()).await;

    let response = response.expect("replayed request succeeds");
    assert_eq!(response.data["url"], json!("http://clinic.test/api/billing/invoices"));

    let requests = h.transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].header(AUTHORIZATION_HEADER), Some("Bearer stale"));
    assert_eq!(requests[1].header(AUTHORIZATION_HEADER), Some("Bearer fresh"));
    assert!(requests.iter().all(|request| request.header(REQUEST_ID_HEADER).is_some()));

    let stored = h.session.credential_token();
    assert_eq!(stored.as_deref(), Some("fresh"));
    assert_eq!(h.client.breaker_state(), CircuitState::Closed);
    assert_eq!(h.hook.fired(), 0);
}

/// Validates that a replayed request never re-enters recovery.
///
/// Assertions:
/// - A second 401 surfaces as `HTTP_401`.
/// - Only one refresh and one replay happen.
#[tokio::test(start_paused = true)]
async fn test_second_401_is_terminal() {
    let h = harness(
        config(),
        Arc::new(FakeTransport::always(401, json!({ "error": "Token revoked" }))),
        Arc::new(StubRefresher::succeeding(Duration::ZERO)),
    );

    let error = h.client.get("/settings", RequestOptions::default()).await.unwrap_err();

    let api = error.as_api_error().expect("api error");
    assert_eq!(api.code, ErrorCode::Http(401));
    assert_eq!(api.message, "Token revoked");
    assert_eq!(h.refresher.calls(), 1);
    assert_eq!(h.transport.calls(), 2);
}

/// Validates refresh failure handling.
///
/// Assertions:
/// - The caller gets `AuthenticationExpired`.
/// - The session is cleared and the hook fires once.
/// - The breaker does not count the failure.
#[tokio::test(start_paused = true)]
async fn test_refresh_failure_expires_session() {
    let h = harness(
        config(),
        Arc::new(FakeTransport::requiring_fresh_token()),
        Arc::new(StubRefresher::failing(RefreshError::Rejected { status: 401 })),
    );

    let error = h.client.get("/patients", RequestOptions::default()).await.unwrap_err();

    assert!(matches!(error, ClientError::AuthenticationExpired { .. }));
    assert_eq!(h.session.credential_token(), None);
    assert_eq!(h.hook.fired(), 1);
    assert_eq!(h.transport.calls(), 1);
    assert_eq!(h.client.breaker_metrics().consecutive_failures, 0);
}

/// Validates retry of server errors with the default backoff.
///
/// Assertions:
/// - Two 503s then a 200 succeed after three calls.
/// - The waits total 1000ms + 2000ms.
#[tokio::test(start_paused = true)]
async fn test_503_is_retried_with_backoff() {
    let h = harness(
        config(),
        Arc::new(FakeTransport::scripted(vec![status(503), status(503), ok(json!({"id": 1}))])),
        no_refresh(),
    );

    let started = Instant::now();
    let response = h.client.get("/doctors/1", RequestOptions::default()).await.expect("success");

    assert_eq!(response.data, json!({"id": 1}));
    assert_eq!(h.transport.calls(), 3);
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(3000), "waited {waited:?}");
    assert!(waited < Duration::from_millis(3100), "waited {waited:?}");
}

#[tokio::test(start_paused = true)]
async fn test_404_is_not_retried() {
    let h = harness(
        config(),
        Arc::new(FakeTransport::always(404, json!({ "message": "Patient not found" }))),
        no_refresh(),
    );

    let error = assert_err!(h.client.get("/patients/99", RequestOptions::default()).await);

    let api = error.as_api_error().expect("api error");
    assert_eq!(api.code, ErrorCode::Http(404));
    assert_eq!(api.message, "Patient not found");
    assert_eq!(api.path, "/api/patients/99");
    assert_eq!(api.details, Some(json!({ "message": "Patient not found" })));
    assert_eq!(h.transport.calls(), 1);
    assert_eq!(h.client.breaker_metrics().consecutive_failures, 0);
}

/// Validates network failure handling.
///
/// Assertions:
/// - The request is attempted once plus three retries.
/// - The caller sees `NETWORK_ERROR`.
#[tokio::test(start_paused = true)]
async fn test_network_failure_is_retried_then_normalized() {
    let h = harness(config(), Arc::new(FakeTransport::scripted(vec![network_down()])), no_refresh());

    let error = h.client.get("/services", RequestOptions::default()).await.unwrap_err();

    assert_eq!(error.code(), "NETWORK_ERROR");
    assert_eq!(h.transport.calls(), 4);
    assert_eq!(h.client.breaker_metrics().consecutive_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_request_is_unknown_error() {
    let h = harness(
        config(),
        Arc::new(FakeTransport::scripted(vec![Err(TransportError::InvalidRequest {
            message: "header value contains newline".to_string(),
        })])),
        no_refresh(),
    );

    let error = h.client.post("/patients", &json!({}), RequestOptions::default()).await.unwrap_err();

    assert_eq!(error.code(), "UNKNOWN_ERROR");
    assert_eq!(h.transport.calls(), 1);
}

/// Validates circuit breaking at the client level.
///
/// # Test Steps
/// 1. Threshold 2, no retries: two 500s open the circuit
/// 2. A third request is attempted
///
/// Assertions:
/// - The third request fails with `CircuitOpen`.
/// - The transport is not called for it.
#[tokio::test(start_paused = true)]
async fn test_breaker_opens_and_rejects_without_calling_transport() {
    let mut config = config();
    config.failure_threshold = 2;
    config.max_retries = 0;
    let h = harness(config, Arc::new(FakeTransport::always(500, json!(null))), no_refresh());

    for _ in 0..2 {
        let error = h.client.get("/appointments", RequestOptions::default()).await.unwrap_err();
        assert_eq!(error.code(), "HTTP_500");
    }
    assert_eq!(h.client.breaker_state(), CircuitState::Open);

    let error = h.client.get("/appointments", RequestOptions::default()).await.unwrap_err();
    assert_eq!(error, ClientError::CircuitOpen);
    assert_eq!(h.transport.calls(), 2);
    assert_eq!(h.client.breaker_metrics().rejected_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn test_request_deadline_produces_timeout() {
    let h = harness(
        config(),
        Arc::new(FakeTransport::always(200, json!({})).with_latency(Duration::from_secs(5))),
        no_refresh(),
    );

    let options = RequestOptions::new().timeout(Duration::from_secs(1));
    let error = h.client.get("/billing", options).await.unwrap_err();

    assert_eq!(error, ClientError::Timeout { timeout: Duration::from_secs(1) });
    assert_eq!(error.code(), "TIMEOUT");
}

/// Validates response caching for reads.
///
/// # Test Steps
/// 1. GET the collection twice
/// 2. PUT one member
/// 3. GET the collection again
///
/// Assertions:
/// - The second GET is served from cache.
/// - The write invalidates the cached collection.
/// - `skip_cache` always reaches the transport.
#[tokio::test(start_paused = true)]
async fn test_reads_are_cached_and_writes_invalidate() {
    let h = harness(config(), Arc::new(FakeTransport::always(200, json!([]))), no_refresh());

    assert_ok!(h.client.get("/patients", RequestOptions::default()).await);
    assert_ok!(h.client.get("/patients", RequestOptions::default()).await);
    assert_eq!(h.transport.calls(), 1);
    assert_eq!(h.client.cache_stats().hits, 1);

    h.client
        .put("/patients/1", &json!({ "name": "Ana" }), RequestOptions::default())
        .await
        .expect("write");
    assert_eq!(h.transport.calls(), 2);

    h.client.get("/patients", RequestOptions::default()).await.expect("read after write");
    assert_eq!(h.transport.calls(), 3);

    h.client.get("/patients", RequestOptions::new().skip_cache()).await.expect("uncached read");
    assert_eq!(h.transport.calls(), 4);

    h.client.invalidate_cache();
    h.client.get("/patients", RequestOptions::default()).await.expect("read after clear");
    assert_eq!(h.transport.calls(), 5);
}

#[derive(Debug, Deserialize, PartialEq)]
struct Doctor {
    id: u32,
    name: String,
}

#[tokio::test(start_paused = true)]
async fn test_get_paginated_decodes_page() {
    let h = harness(
        config(),
        Arc::new(FakeTransport::always(
            200,
            json!({
                "content": [{ "id": 1, "name": "Dr. Ruiz" }, { "id": 2, "name": "Dr. Vega" }],
                "totalElements": 5,
                "totalPages": 3,
                "size": 2,
                "number": 0
            }),
        )),
        no_refresh(),
    );

    let page: Page<Doctor> = h
        .client
        .get_paginated("/doctors", RequestOptions::new().page(0, 2))
        .await
        .expect("page decodes");

    assert_eq!(page.content.len(), 2);
    assert_eq!(page.content[1], Doctor { id: 2, name: "Dr. Vega".to_string() });
    assert_eq!(page.total_elements, 5);
    assert!(!page.is_last());
    assert_eq!(h.transport.requests()[0].url, "http://clinic.test/api/doctors?page=0&size=2");
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_page_shape_is_unknown_error() {
    let h = harness(config(), Arc::new(FakeTransport::always(200, json!("<html>"))), no_refresh());

    let error = h
        .client
        .get_paginated::<Doctor>("/doctors", RequestOptions::default())
        .await
        .unwrap_err();

    assert_eq!(error.code(), "UNKNOWN_ERROR");
}
