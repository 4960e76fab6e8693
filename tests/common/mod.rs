//! Common test utilities and fixtures
//!
//! Integration tests run the engine against a `wiremock` server standing in for the
//! service under test. Delays are zeroed so a full catalog run finishes quickly.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::io::Cursor;
use std::sync::{Arc, Once};
use std::time::Duration;
use wiremock::MockServer;

use spatialprobe::capabilities::{CapabilitiesSource, Dimension, Resource};
use spatialprobe::catalog::{Catalog, Category, Probe, TestCase};
use spatialprobe::config::{Config, RetryConfig, ScheduleConfig};
use spatialprobe::executor::RequestExecutor;
use spatialprobe::fixtures::ExecutionContext;
use spatialprobe::results::Outcome;
use spatialprobe::service::Service;
use spatialprobe::{ProbeResult, Session};

static INIT: Once = Once::new();

/// Initialize test logging
pub fn init_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("spatialprobe=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Configuration pointing at `base_url` with short timeouts and no scheduling delays.
pub fn test_config(base_url: &str, max_retries: u32) -> Config {
    Config {
        base_url: base_url.to_string(),
        retry: RetryConfig {
            timeout_ms: 2_000,
            max_retries,
            retry_delay_ms: 10,
        },
        schedule: ScheduleConfig {
            test_delay_ms: 0,
            category_delay_ms: 0,
        },
        seed: Some(7),
        ..Config::default()
    }
}

/// Session over the builtin catalog against a mock server.
pub fn session_for(server: &MockServer, max_retries: u32) -> Session {
    init_logging();
    Session::new(Arc::new(test_config(&server.uri(), max_retries))).unwrap()
}

/// Session over a custom catalog with a fixed capabilities source.
pub fn custom_session(config: Config, catalog: Catalog) -> Session {
    init_logging();
    let config = Arc::new(config);
    let executor = Arc::new(RequestExecutor::new(&config).unwrap());
    Session::with_parts(config, executor, catalog, Box::new(StaticCapabilities::default())).unwrap()
}

/// Capabilities source returning fixed resources without touching the network.
#[derive(Default)]
pub struct StaticCapabilities {
    pub wms: Vec<Resource>,
    pub wmts: Vec<Resource>,
    pub edr: Vec<Resource>,
}

#[async_trait]
impl CapabilitiesSource for StaticCapabilities {
    async fn fetch(&self, service: Service) -> ProbeResult<Vec<Resource>> {
        Ok(match service {
            Service::Wms => self.wms.clone(),
            Service::Wmts => self.wmts.clone(),
            Service::Edr => self.edr.clone(),
        })
    }
}

/// WMS layer with a time dimension.
pub fn wms_layer() -> Resource {
    Resource::new("gfs_TMP")
        .with_style("gradient")
        .with_bbox(-130.0, 20.0, -60.0, 55.0)
        .with_dimension(
            "time",
            Dimension {
                default: Some("2025-12-02T18:00:00Z".to_string()),
                values: vec![
                    "2025-12-02T00:00:00Z".to_string(),
                    "2025-12-02T06:00:00Z".to_string(),
                    "2025-12-02T12:00:00Z".to_string(),
                    "2025-12-02T18:00:00Z".to_string(),
                ],
                units: Some("ISO8601".to_string()),
            },
        )
}

/// Context with a single WMS layer and nothing else.
pub fn wms_context() -> ExecutionContext {
    let mut capabilities = indexmap::IndexMap::new();
    capabilities.insert(Service::Wms, vec![wms_layer()]);
    capabilities.insert(Service::Wmts, Vec::new());
    capabilities.insert(Service::Edr, Vec::new());
    ExecutionContext::build(capabilities)
}

/// Encoded PNG of the given size.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbaImage::new(width, height);
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn service_exception(code: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ServiceExceptionReport version="1.3.0" xmlns="http://www.opengis.net/ogc">
  <ServiceException code="{code}">spatialprobe test</ServiceException>
</ServiceExceptionReport>"#
    )
}

fn slow_skip<'a>(_: &'a Probe<'a>) -> BoxFuture<'a, Outcome> {
    async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Outcome::skipped("placeholder")
    }
    .boxed()
}

/// Two categories, `one` and `two`, of five placeholder tests each.
pub fn two_category_catalog() -> Catalog {
    const ONE: [&str; 5] = ["one-1", "one-2", "one-3", "one-4", "one-5"];
    const TWO: [&str; 5] = ["two-1", "two-2", "two-3", "two-4", "two-5"];
    let cases = |category: &'static str, ids: [&'static str; 5]| -> Vec<TestCase> {
        ids.into_iter()
            .map(|id| TestCase {
                id,
                description: "placeholder",
                spec_reference: "none",
                category,
                run: slow_skip,
            })
            .collect()
    };
    Catalog::new(vec![
        Category::new("one", "One", cases("one", ONE)),
        Category::new("two", "Two", cases("two", TWO)),
    ])
    .unwrap()
}

pub const WMS_CAPABILITIES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<WMS_Capabilities version="1.3.0" xmlns="http://www.opengis.net/wms">
  <Service><Name>WMS</Name><Title>Weather WMS</Title></Service>
  <Capability>
    <Request>
      <GetMap><Format>image/png</Format></GetMap>
    </Request>
    <Layer>
      <Title>Root</Title>
      <CRS>CRS:84</CRS>
      <CRS>EPSG:4326</CRS>
      <CRS>EPSG:3857</CRS>
      <Layer queryable="1">
        <Name>gfs_TMP</Name>
        <Title>GFS Temperature</Title>
        <Style><Name>gradient</Name></Style>
        <EX_GeographicBoundingBox>
          <westBoundLongitude>-180</westBoundLongitude>
          <eastBoundLongitude>180</eastBoundLongitude>
          <southBoundLatitude>-90</southBoundLatitude>
          <northBoundLatitude>90</northBoundLatitude>
        </EX_GeographicBoundingBox>
        <Dimension name="time" units="ISO8601" default="2025-12-02T18:00:00Z">2025-12-02T12:00:00Z,2025-12-02T18:00:00Z</Dimension>
      </Layer>
    </Layer>
  </Capability>
</WMS_Capabilities>"#;

pub const WMTS_CAPABILITIES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Capabilities xmlns="http://www.opengis.net/wmts/1.0" xmlns:ows="http://www.opengis.net/ows/1.1" version="1.0.0">
  <Contents>
    <Layer>
      <ows:Title>GFS Temperature</ows:Title>
      <ows:Identifier>gfs_TMP</ows:Identifier>
      <Style isDefault="true"><ows:Identifier>gradient</ows:Identifier></Style>
      <Format>image/png</Format>
      <TileMatrixSetLink><TileMatrixSet>WebMercatorQuad</TileMatrixSet></TileMatrixSetLink>
    </Layer>
    <TileMatrixSet>
      <ows:Identifier>WebMercatorQuad</ows:Identifier>
      <TileMatrix><ows:Identifier>0</ows:Identifier></TileMatrix>
    </TileMatrixSet>
  </Contents>
</Capabilities>"#;

pub fn edr_collections() -> serde_json::Value {
    serde_json::json!({
        "links": [],
        "collections": [{
            "id": "gfs-isobaric",
            "title": "GFS isobaric levels",
            "extent": {
                "spatial": { "bbox": [[-180.0, -90.0, 180.0, 90.0]] },
                "vertical": { "values": ["1000", "850", "500"], "vrs": "hPa" }
            },
            "parameter_names": { "TMP": { "type": "Parameter" } }
        }]
    })
}
