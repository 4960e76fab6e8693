//! Request executor retry behaviour observed through test outcomes.

use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use spatialprobe::Session;
use spatialprobe::config::BasicAuth;
use spatialprobe::results::Status;

use crate::common::{init_logging, png, session_for, test_config, wms_context};

const CONFORMANCE: &str = "/edr/conformance";

fn conformance_body() -> serde_json::Value {
    serde_json::json!({
        "conformsTo": ["http://www.opengis.net/spec/ogcapi-edr-1/1.0/conf/core"]
    })
}

#[tokio::test]
async fn test_transient_failures_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONFORMANCE))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONFORMANCE))
        .respond_with(ResponseTemplate::new(200).set_body_json(conformance_body()))
        .with_priority(2)
        .mount(&server)
        .await;

    let session = session_for(&server, 3);
    let outcome = session.run_test("edr-conformance").await.unwrap();

    assert_eq!(outcome.status, Status::Pass, "{:?}", outcome);
    assert_eq!(outcome.attempt_count, 3);
}

#[tokio::test]
async fn test_retry_reuses_sampled_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wms"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wms"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(png(256, 256)),
        )
        .with_priority(2)
        .mount(&server)
        .await;

    let session = session_for(&server, 2);
    session.set_context(wms_context()).unwrap();
    let outcome = session.run_test("wms-time-dimension").await.unwrap();

    assert_eq!(outcome.status, Status::Pass, "{:?}", outcome);
    assert_eq!(outcome.attempt_count, 2);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let times: Vec<String> = requests
        .iter()
        .map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "TIME")
                .map(|(_, v)| v.into_owned())
                .unwrap()
        })
        .collect();
    assert_eq!(times[0], times[1]);
    assert_eq!(requests[0].url, requests[1].url);
}

#[tokio::test]
async fn test_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONFORMANCE))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let session = session_for(&server, 2);
    let outcome = session.run_test("edr-conformance").await.unwrap();

    assert_eq!(outcome.status, Status::Fail);
    assert_eq!(outcome.attempt_count, 3);
    assert!(outcome.error_message.as_deref().unwrap().contains("gave up after 3 attempts"));
    assert!(outcome.last_request_url.as_deref().unwrap().ends_with(CONFORMANCE));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_error_status_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONFORMANCE))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let session = session_for(&server, 3);
    let outcome = session.run_test("edr-conformance").await.unwrap();

    assert_eq!(outcome.status, Status::Fail);
    assert_eq!(outcome.attempt_count, 1);
    let failed: Vec<_> = outcome.checks.iter().filter(|c| !c.passed).map(|c| c.name.as_str()).collect();
    assert!(failed.contains(&"HTTP 200"));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_connection_refused_is_fatal() {
    init_logging();
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = test_config(&format!("http://127.0.0.1:{}", port), 3);
    let session = Session::new(Arc::new(config)).unwrap();

    let outcome = session.run_test("edr-conformance").await.unwrap();

    assert_eq!(outcome.status, Status::Fail);
    assert_eq!(outcome.attempt_count, 1);
    assert!(outcome.checks.is_empty());
    assert!(outcome.error_message.is_some());
}

#[tokio::test]
async fn test_timeout_is_retried() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONFORMANCE))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(conformance_body())
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri(), 1);
    config.retry.timeout_ms = 100;
    let session = Session::new(Arc::new(config)).unwrap();

    let outcome = session.run_test("edr-conformance").await.unwrap();

    assert_eq!(outcome.status, Status::Fail);
    assert_eq!(outcome.attempt_count, 2);
    assert!(outcome.error_message.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_credentials_and_user_agent_are_sent() {
    init_logging();
    let server = MockServer::start().await;
    let user_agent = format!("spatialprobe/{}", env!("CARGO_PKG_VERSION"));
    Mock::given(method("GET"))
        .and(path(CONFORMANCE))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .and(header("user-agent", user_agent.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(conformance_body()))
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri(), 0);
    config.auth = Some(BasicAuth {
        username: "user".to_string(),
        password: Some("pass".to_string()),
    });
    let session = Session::new(Arc::new(config)).unwrap();

    let outcome = session.run_test("edr-conformance").await.unwrap();
    assert_eq!(outcome.status, Status::Pass, "{:?}", outcome);
}
