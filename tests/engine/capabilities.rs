//! Capabilities loading and fixture-driven skipping.

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use spatialprobe::capabilities::DimensionKind;
use spatialprobe::results::Status;
use spatialprobe::service::Service;

use crate::common::{WMS_CAPABILITIES, WMTS_CAPABILITIES, edr_collections, session_for};

/// Tests that only touch service-level documents and never need a resource.
const WITHOUT_FIXTURES: [&str; 8] = [
    "wms-capabilities",
    "wms-unsupported-request",
    "wmts-capabilities",
    "wmts-webmercatorquad",
    "edr-landing",
    "edr-conformance",
    "edr-collections",
    "edr-unknown-collection",
];

async fn mount_capabilities(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/wms"))
        .and(query_param("SERVICE", "WMS"))
        .and(query_param("REQUEST", "GetCapabilities"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/xml")
                .set_body_string(WMS_CAPABILITIES),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wmts"))
        .and(query_param("SERVICE", "WMTS"))
        .and(query_param("REQUEST", "GetCapabilities"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/xml")
                .set_body_string(WMTS_CAPABILITIES),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/edr/collections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(edr_collections()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_empty_server_skips_fixture_tests() {
    let server = MockServer::start().await;
    let session = session_for(&server, 0);

    assert_eq!(session.reload_capabilities().await.unwrap(), 0);
    let summary = session.run_all().await.unwrap();

    assert_eq!(summary.global.pending, 0);
    assert_eq!(summary.global.total, session.catalog().len());
    for category in session.catalog().categories() {
        for case in &category.tests {
            let outcome = session.outcome(case.id).unwrap();
            if WITHOUT_FIXTURES.contains(&case.id) {
                assert_eq!(outcome.status, Status::Fail, "{}", case.id);
                assert!(outcome.last_request_url.is_some(), "{}", case.id);
            } else {
                assert_eq!(outcome.status, Status::Skip, "{}", case.id);
                assert!(outcome.error_message.is_some(), "{}", case.id);
                assert!(outcome.last_request_url.is_none(), "{}", case.id);
            }
        }
    }
    assert_eq!(summary.global.fail, WITHOUT_FIXTURES.len());
}

#[tokio::test]
async fn test_reload_builds_context_from_documents() {
    let server = MockServer::start().await;
    mount_capabilities(&server).await;
    let session = session_for(&server, 0);

    assert_eq!(session.reload_capabilities().await.unwrap(), 3);
    let context = session.context();

    let wms = context.default_resource(Service::Wms).unwrap();
    assert_eq!(wms.name, "gfs_TMP");
    assert!(wms.crs.iter().any(|c| c == "EPSG:3857"));
    let time = context.dimension(Service::Wms, DimensionKind::Time).unwrap();
    assert_eq!(time.axis().unwrap().values.len(), 2);

    let wmts = context.default_resource(Service::Wmts).unwrap();
    assert_eq!(wmts.name, "gfs_TMP");
    assert_eq!(wmts.tile_matrix_sets, vec!["WebMercatorQuad".to_string()]);

    let edr = context.default_resource(Service::Edr).unwrap();
    assert_eq!(edr.name, "gfs-isobaric");
    assert_eq!(edr.parameters, vec!["TMP".to_string()]);
    let z = context.dimension(Service::Edr, DimensionKind::Elevation).unwrap();
    assert_eq!(z.dimension, "z");
    assert!(context.dimension(Service::Edr, DimensionKind::Time).is_none());
}

#[tokio::test]
async fn test_failed_service_degrades_to_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/edr/collections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(edr_collections()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wms"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not capabilities"))
        .mount(&server)
        .await;
    let session = session_for(&server, 0);

    assert_eq!(session.reload_capabilities().await.unwrap(), 1);
    let context = session.context();
    assert!(context.default_resource(Service::Wms).is_none());
    assert!(context.default_resource(Service::Wmts).is_none());
    assert!(context.default_resource(Service::Edr).is_some());

    let outcome = session.run_test("wms-getmap-png").await.unwrap();
    assert_eq!(outcome.status, Status::Skip);
}
