//! Strict and two-branch acceptance against canned service responses.

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use spatialprobe::Session;
use spatialprobe::assertions::EXPECTED_ERROR_CODE;
use spatialprobe::capabilities::Resource;
use spatialprobe::fixtures::ExecutionContext;
use spatialprobe::results::{Outcome, Status};
use spatialprobe::service::Service;

use crate::common::{png, service_exception, session_for, wms_context};

async fn run_wms(server: &MockServer, test_id: &str) -> Outcome {
    let session: Session = session_for(server, 2);
    session.set_context(wms_context()).unwrap();
    session.run_test(test_id).await.unwrap()
}

fn detail<'a>(outcome: &'a Outcome, name: &str) -> Option<&'a str> {
    outcome
        .checks
        .iter()
        .find(|c| c.name == name)
        .and_then(|c| c.detail.as_deref())
}

#[tokio::test]
async fn test_missing_exception_code_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wms"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request"))
        .mount(&server)
        .await;

    let outcome = run_wms(&server, "wms-missing-layers").await;

    assert_eq!(outcome.status, Status::Fail);
    assert_eq!(outcome.attempt_count, 1);
    let check = outcome.checks.iter().find(|c| c.name == EXPECTED_ERROR_CODE).unwrap();
    assert!(!check.passed);
    let url = outcome.last_request_url.as_deref().unwrap();
    assert!(url.contains("REQUEST=GetMap"));
    assert!(!url.contains("LAYERS="));
}

#[tokio::test]
async fn test_expected_exception_code_passes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wms"))
        .respond_with(
            ResponseTemplate::new(400)
                .insert_header("content-type", "text/xml")
                .set_body_string(service_exception("MissingParameterValue")),
        )
        .mount(&server)
        .await;

    let outcome = run_wms(&server, "wms-missing-layers").await;
    assert_eq!(outcome.status, Status::Pass, "{:?}", outcome);
}

#[tokio::test]
async fn test_two_branch_rejects_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wms"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let outcome = run_wms(&server, "wms-invalid-style").await;

    assert_eq!(outcome.status, Status::Fail);
    assert!(detail(&outcome, "unknown style handled").unwrap().contains("HTTP 404"));
}

#[tokio::test]
async fn test_two_branch_accepts_strict_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wms"))
        .and(query_param("STYLES", "spatialprobe_no_such_style"))
        .respond_with(
            ResponseTemplate::new(400)
                .insert_header("content-type", "application/vnd.ogc.se_xml")
                .set_body_string(service_exception("StyleNotDefined")),
        )
        .mount(&server)
        .await;

    let outcome = run_wms(&server, "wms-invalid-style").await;

    assert_eq!(outcome.status, Status::Pass, "{:?}", outcome);
    assert_eq!(detail(&outcome, "unknown style handled"), Some("strict: StyleNotDefined"));
}

#[tokio::test]
async fn test_two_branch_accepts_graceful_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wms"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(png(256, 256)),
        )
        .mount(&server)
        .await;

    let outcome = run_wms(&server, "wms-invalid-style").await;

    assert_eq!(outcome.status, Status::Pass, "{:?}", outcome);
    assert_eq!(detail(&outcome, "unknown style handled"), Some("graceful: HTTP 200 image"));
}

#[tokio::test]
async fn test_getmap_checks_decoded_image_size() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wms"))
        .and(query_param("REQUEST", "GetMap"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(png(128, 128)),
        )
        .mount(&server)
        .await;

    let outcome = run_wms(&server, "wms-getmap-png").await;

    assert_eq!(outcome.status, Status::Fail);
    let failed: Vec<_> = outcome.checks.iter().filter(|c| !c.passed).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name, "image is 256x256");
    assert_eq!(failed[0].detail.as_deref(), Some("128x128"));
}

#[tokio::test]
async fn test_sampled_time_is_an_advertised_value() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wms"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(png(256, 256)),
        )
        .mount(&server)
        .await;

    let outcome = run_wms(&server, "wms-time-dimension").await;
    assert_eq!(outcome.status, Status::Pass, "{:?}", outcome);

    let requests = server.received_requests().await.unwrap();
    let time = requests[0]
        .url
        .query_pairs()
        .find(|(k, _)| k == "TIME")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    let advertised = crate::common::wms_layer().dimensions["time"].values.clone();
    assert!(advertised.contains(&time), "{} not advertised", time);
}

#[tokio::test]
async fn test_unknown_crs_accepts_either_branch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wms"))
        .and(query_param("CRS", "EPSG:99999"))
        .respond_with(
            ResponseTemplate::new(400)
                .insert_header("content-type", "text/xml")
                .set_body_string(service_exception("InvalidCRS")),
        )
        .mount(&server)
        .await;
    let outcome = run_wms(&server, "wms-invalid-crs").await;
    assert_eq!(outcome.status, Status::Pass, "{:?}", outcome);
    assert_eq!(detail(&outcome, "unknown CRS handled"), Some("strict: InvalidCRS"));

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/wms"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(png(256, 256)),
        )
        .mount(&server)
        .await;
    let outcome = run_wms(&server, "wms-invalid-crs").await;
    assert_eq!(outcome.status, Status::Pass, "{:?}", outcome);
    assert_eq!(detail(&outcome, "unknown CRS handled"), Some("graceful: HTTP 200 image"));
}

#[tokio::test]
async fn test_unknown_parameter_name_may_be_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/edr/collections/gfs-isobaric/position"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "type": "Coverage",
            "domain": { "type": "Domain", "domainType": "Point", "axes": {} },
            "ranges": {}
        })))
        .mount(&server)
        .await;

    let session = session_for(&server, 0);
    let mut capabilities = indexmap::IndexMap::new();
    capabilities.insert(Service::Wms, Vec::new());
    capabilities.insert(Service::Wmts, Vec::new());
    capabilities.insert(
        Service::Edr,
        vec![Resource::new("gfs-isobaric").with_bbox(-180.0, -90.0, 180.0, 90.0)],
    );
    session.set_context(ExecutionContext::build(capabilities)).unwrap();

    let outcome = session.run_test("edr-invalid-parameter").await.unwrap();
    assert_eq!(outcome.status, Status::Pass, "{:?}", outcome);
    assert_eq!(
        detail(&outcome, "unknown parameter-name handled"),
        Some("graceful: HTTP 200 CoverageJSON")
    );
}
