//! Integration tests for `OffersClient::fetch_offers` against a local `wiremock` server.

use std::time::Duration;

use netoffer_core::{Address, ConnectionType, Country, SearchCriteria};
use netoffer_storage::{FetchError, HttpClientConfig, OffersClient, RetryPolicy};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(server: &MockServer, max_retries: usize) -> OffersClient {
    client_with_timeout(server, max_retries, Duration::from_secs(5))
}

fn client_with_timeout(server: &MockServer, max_retries: usize, timeout: Duration) -> OffersClient {
    OffersClient::new(HttpClientConfig {
        endpoint: format!("{}/api/all/offers", server.uri()),
        timeout,
        connect_timeout: Duration::from_secs(5),
        user_agent: Some("netoffer-test/0.1".into()),
        max_in_flight: 2,
        retry: RetryPolicy {
            max_retries,
            first_delay: Duration::from_millis(1),
            delay_cap: Duration::from_millis(5),
        },
    })
    .expect("failed to build test OffersClient")
}

fn criteria() -> SearchCriteria {
    let mut criteria = SearchCriteria::new(Address {
        street: "Main St".into(),
        number: "5".into(),
        city: "Vienna".into(),
        zip: "1010".into(),
        country: Country::Austria,
    });
    criteria.connection_type = Some(ConnectionType::Fiber);
    criteria
}

#[tokio::test]
async fn posts_request_body_and_returns_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/all/offers"))
        .and(body_partial_json(json!({
            "wantsFiber": true,
            "connectionType": "FIBER",
            "address": {"street": "Main St", "country": "AUSTRIA"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"byteMe": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server, 0);
    let resp = client
        .fetch_offers(Uuid::new_v4(), &criteria().to_request())
        .await
        .expect("fetch ok");

    assert!(resp.status.is_success());
    let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(body, json!({"byteMe": []}));
}

#[tokio::test]
async fn retries_server_errors_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = test_client(&server, 3);
    let resp = client
        .fetch_offers(Uuid::new_v4(), &criteria().to_request())
        .await
        .expect("fetch ok after retries");
    assert_eq!(resp.status.as_u16(), 200);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server, 3);
    let err = client
        .fetch_offers(Uuid::new_v4(), &criteria().to_request())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::HttpStatus { status: 400, .. }), "got {err:?}");
}

#[tokio::test]
async fn gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let client = test_client(&server, 2);
    let err = client
        .fetch_offers(Uuid::new_v4(), &criteria().to_request())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::HttpStatus { status: 500, .. }), "got {err:?}");
}

#[tokio::test]
async fn retries_timed_out_requests_then_gives_up() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_with_timeout(&server, 2, Duration::from_millis(100));
    let err = client
        .fetch_offers(Uuid::new_v4(), &criteria().to_request())
        .await
        .unwrap_err();
    match err {
        FetchError::Request(inner) => assert!(inner.is_timeout(), "got {inner:?}"),
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn recovers_after_a_timed_out_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"pingPerfect": []})))
        .mount(&server)
        .await;

    let client = client_with_timeout(&server, 1, Duration::from_millis(100));
    let resp = client
        .fetch_offers(Uuid::new_v4(), &criteria().to_request())
        .await
        .expect("second attempt succeeds");
    let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(body, json!({"pingPerfect": []}));
}
