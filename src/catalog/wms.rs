//! WMS 1.3.0 conformance tests (OGC 06-042).

use image::DynamicImage;
use std::f64::consts::PI;

use super::{Category, Kvp, Probe, bbox_param, rejected_with, served_image, test_case};
use crate::assertions::{Branch, Checks};
use crate::capabilities::{DimensionKind, Resource, capabilities_url, wms as document};
use crate::executor::Exchange;
use crate::results::Outcome;
use crate::service::Service;

const CATEGORY: &str = "wms";
const SIZE: u32 = 256;
const NO_LAYER: &str = "no WMS layer advertised";
const NO_SUCH_LAYER: &str = "spatialprobe_no_such_layer";

pub fn category() -> Category {
    Category::new(
        CATEGORY,
        "WMS 1.3.0",
        vec![
            test_case!(CATEGORY, "wms-capabilities", "OGC 06-042 7.2", "GetCapabilities returns a WMS 1.3.0 capabilities document", capabilities),
            test_case!(CATEGORY, "wms-named-layer", "OGC 06-042 7.2.4.6.3", "Capabilities advertise at least one named layer", named_layer),
            test_case!(CATEGORY, "wms-getmap-png", "OGC 06-042 7.3", "GetMap returns a PNG of the requested size", getmap_png),
            test_case!(CATEGORY, "wms-getmap-epsg3857", "OGC 06-042 6.7.3", "GetMap renders in EPSG:3857", getmap_web_mercator),
            test_case!(CATEGORY, "wms-crs84-axis-order", "OGC 06-042 6.7.3.3", "CRS:84 and EPSG:4326 honour their axis order", crs84_axis_order),
            test_case!(CATEGORY, "wms-time-dimension", "OGC 06-042 C.4.1", "GetMap with a sampled TIME value", time_dimension),
            test_case!(CATEGORY, "wms-elevation-dimension", "OGC 06-042 C.4.2", "GetMap with a sampled ELEVATION value", elevation_dimension),
            test_case!(CATEGORY, "wms-custom-dimension", "OGC 06-042 C.4.3", "GetMap with a sampled DIM_ value", custom_dimension),
            test_case!(CATEGORY, "wms-getfeatureinfo-json", "OGC 06-042 7.4", "GetFeatureInfo returns JSON", getfeatureinfo_json),
            test_case!(CATEGORY, "wms-getfeatureinfo-invalid-point", "OGC 06-042 7.4.3.7", "GetFeatureInfo outside the map is rejected or ignored", getfeatureinfo_invalid_point),
            test_case!(CATEGORY, "wms-invalid-layer", "OGC 06-042 7.3.3.3", "Unknown layer raises LayerNotDefined", invalid_layer),
            test_case!(CATEGORY, "wms-invalid-style", "OGC 06-042 7.3.3.4", "Unknown style raises StyleNotDefined or falls back", invalid_style),
            test_case!(CATEGORY, "wms-invalid-crs", "OGC 06-042 7.3.3.5", "Unknown CRS raises InvalidCRS or falls back", invalid_crs),
            test_case!(CATEGORY, "wms-invalid-format", "OGC 06-042 7.3.3.7", "Unknown format raises InvalidFormat or falls back", invalid_format),
            test_case!(CATEGORY, "wms-invalid-dimension-value", "OGC 06-042 C.4.4", "Out of range TIME raises InvalidDimensionValue or snaps", invalid_dimension_value),
            test_case!(CATEGORY, "wms-missing-layers", "OGC 06-042 7.3.2", "GetMap without LAYERS raises MissingParameterValue", missing_layers),
            test_case!(CATEGORY, "wms-unsupported-request", "OGC 06-042 6.9.3", "Unknown REQUEST raises OperationNotSupported", unsupported_request),
        ],
    )
}

fn getmap(layer: &Resource) -> Kvp {
    let size = SIZE.to_string();
    let bbox = bbox_param(&layer.extent(), false);
    Kvp::new(&[
        ("SERVICE", "WMS"),
        ("VERSION", "1.3.0"),
        ("REQUEST", "GetMap"),
        ("LAYERS", layer.name.as_str()),
        ("STYLES", layer.default_style()),
        ("CRS", "CRS:84"),
        ("BBOX", bbox.as_str()),
        ("WIDTH", size.as_str()),
        ("HEIGHT", size.as_str()),
        ("FORMAT", "image/png"),
    ])
}

fn getfeatureinfo(layer: &Resource) -> Kvp {
    let centre = (SIZE / 2).to_string();
    getmap(layer)
        .set("REQUEST", "GetFeatureInfo")
        .set("QUERY_LAYERS", layer.name.clone())
        .set("I", centre.clone())
        .set("J", centre)
        .set("INFO_FORMAT", "application/json")
        .remove("FORMAT")
}

fn expect_map(x: &Exchange, checks: &mut Checks) {
    checks.status(x, 200);
    checks.content_type(x, "image/png");
    checks.image_size(x, SIZE, SIZE);
}

fn describe(x: &Exchange) -> String {
    format!("HTTP {}, {}", x.status.as_u16(), x.content_type().unwrap_or("<none>"))
}

/// Spherical mercator projection of a CRS:84 coordinate.
fn web_mercator(lon: f64, lat: f64) -> (f64, f64) {
    const HALF_WORLD: f64 = 20_037_508.342_789_244;
    let lat = lat.clamp(-85.051_128_78, 85.051_128_78);
    let x = lon * HALF_WORLD / 180.0;
    let y = ((90.0 + lat) * PI / 360.0).tan().ln() / PI * HALF_WORLD;
    (x, y)
}

async fn capabilities(probe: &Probe<'_>) -> Outcome {
    let url = capabilities_url(probe.endpoints, Service::Wms);
    probe
        .evaluate(url, |x, checks| {
            checks.status(x, 200);
            checks.check_detail(
                "Content-Type is XML",
                x.content_type().is_some_and(|ct| ct.to_ascii_lowercase().contains("xml")),
                describe(x),
            );
            match document::parse(&x.text()) {
                Ok(doc) => {
                    checks.check_detail("root is WMS_Capabilities", doc.root == "WMS_Capabilities", doc.root.clone());
                    checks.check_detail(
                        "version is 1.3.0",
                        doc.version.as_deref() == Some("1.3.0"),
                        doc.version.clone().unwrap_or_default(),
                    );
                    checks.check("GetMap offers image/png", doc.map_formats.iter().any(|f| f == "image/png"));
                }
                Err(e) => {
                    checks.check_detail("document parses", false, e.to_string());
                }
            }
        })
        .await
}

async fn named_layer(probe: &Probe<'_>) -> Outcome {
    let Some(layer) = probe.resource(Service::Wms) else {
        return Outcome::skipped(NO_LAYER);
    };
    let url = capabilities_url(probe.endpoints, Service::Wms);
    probe
        .evaluate(url, |x, checks| {
            checks.status(x, 200);
            let layers = document::parse(&x.text()).map(|doc| doc.layers).unwrap_or_default();
            checks.check_detail("named layers present", !layers.is_empty(), format!("{} layers", layers.len()));
            checks.check(
                format!("layer '{}' listed", layer.name),
                layers.iter().any(|l| l.name == layer.name),
            );
            checks.check(
                "every named layer has a title",
                layers.iter().all(|l| l.title.as_deref().is_some_and(|t| !t.is_empty())),
            );
        })
        .await
}

async fn getmap_png(probe: &Probe<'_>) -> Outcome {
    let Some(layer) = probe.resource(Service::Wms) else {
        return Outcome::skipped(NO_LAYER);
    };
    let url = getmap(layer).url(probe.endpoints, Service::Wms);
    probe.evaluate(url, expect_map).await
}

async fn getmap_web_mercator(probe: &Probe<'_>) -> Outcome {
    let Some(layer) = probe.resource(Service::Wms) else {
        return Outcome::skipped(NO_LAYER);
    };
    if !layer.crs.is_empty() && !layer.crs.iter().any(|c| c == "EPSG:3857") {
        return Outcome::skipped(format!("layer '{}' does not advertise EPSG:3857", layer.name));
    }
    let area = layer.sample_box(10.0);
    let (min_x, min_y) = web_mercator(area.min().x, area.min().y);
    let (max_x, max_y) = web_mercator(area.max().x, area.max().y);
    let url = getmap(layer)
        .set("CRS", "EPSG:3857")
        .set("BBOX", format!("{},{},{},{}", min_x, min_y, max_x, max_y))
        .url(probe.endpoints, Service::Wms);
    probe.evaluate(url, expect_map).await
}

async fn crs84_axis_order(probe: &Probe<'_>) -> Outcome {
    let Some(layer) = probe.resource(Service::Wms) else {
        return Outcome::skipped(NO_LAYER);
    };
    let area = layer.sample_box(10.0);
    let lon_lat = getmap(layer)
        .set("BBOX", bbox_param(&area, false))
        .url(probe.endpoints, Service::Wms);
    let lat_lon = getmap(layer)
        .set("CRS", "EPSG:4326")
        .set("BBOX", bbox_param(&area, true))
        .url(probe.endpoints, Service::Wms);

    let crs84 = match probe.fetch(&lon_lat).await {
        Ok(x) => x,
        Err(failure) => return Outcome::transport_failure(&failure),
    };
    let epsg4326 = match probe.fetch(&lat_lon).await {
        Ok(x) => x,
        Err(failure) => return Outcome::transport_failure(&failure),
    };

    let mut checks = Checks::new();
    checks.check_detail("CRS:84 lon/lat box renders", served_image(&crs84), describe(&crs84));
    checks.check_detail("EPSG:4326 lat/lon box renders", served_image(&epsg4326), describe(&epsg4326));
    let same = match (crs84.image(), epsg4326.image()) {
        (Some(a), Some(b)) => maps_match(&a, &b),
        _ => false,
    };
    checks.check("both axis orders render the same map", same);
    Outcome::evaluated(checks, &epsg4326)
}

/// Pixels whose channels differ by more than this count as different.
const CHANNEL_TOLERANCE: u8 = 32;

/// Same size, with at most 1% of pixels differing beyond the channel tolerance.
/// Encoders and anti-aliasing may differ between two renderings of the same map.
fn maps_match(a: &DynamicImage, b: &DynamicImage) -> bool {
    let (a, b) = (a.to_rgba8(), b.to_rgba8());
    if a.dimensions() != b.dimensions() {
        return false;
    }
    let differing = a
        .pixels()
        .zip(b.pixels())
        .filter(|(p, q)| p.0.iter().zip(q.0.iter()).any(|(x, y)| x.abs_diff(*y) > CHANNEL_TOLERANCE))
        .count();
    let total = (a.width() as usize * a.height() as usize).max(1);
    differing * 100 <= total
}

async fn dimension_getmap(probe: &Probe<'_>, kind: DimensionKind) -> Outcome {
    let Some(sampled) = probe.sample(Service::Wms, kind) else {
        return Outcome::skipped(format!("no WMS layer with a {:?} dimension", kind));
    };
    let param = match kind {
        DimensionKind::Time => "TIME".to_string(),
        DimensionKind::Elevation => "ELEVATION".to_string(),
        DimensionKind::Custom => dim_param(sampled.dimension),
    };
    let url = getmap(sampled.resource)
        .set(param, sampled.value.clone())
        .url(probe.endpoints, Service::Wms);
    let value = sampled.value;
    probe
        .evaluate(url, move |x, checks| {
            expect_map(x, checks);
            checks.check_detail("sampled value accepted", served_image(x), value);
        })
        .await
}

/// Request parameter for a custom sample dimension.
fn dim_param(name: &str) -> String {
    let upper = name.to_ascii_uppercase();
    if upper.starts_with("DIM_") {
        upper
    } else {
        format!("DIM_{}", upper)
    }
}

async fn time_dimension(probe: &Probe<'_>) -> Outcome {
    dimension_getmap(probe, DimensionKind::Time).await
}

async fn elevation_dimension(probe: &Probe<'_>) -> Outcome {
    dimension_getmap(probe, DimensionKind::Elevation).await
}

async fn custom_dimension(probe: &Probe<'_>) -> Outcome {
    dimension_getmap(probe, DimensionKind::Custom).await
}

async fn getfeatureinfo_json(probe: &Probe<'_>) -> Outcome {
    let Some(layer) = probe.resource(Service::Wms) else {
        return Outcome::skipped(NO_LAYER);
    };
    let url = getfeatureinfo(layer).url(probe.endpoints, Service::Wms);
    probe
        .evaluate(url, |x, checks| {
            checks.status(x, 200);
            checks.content_type(x, "application/json");
            checks.json_body(x);
        })
        .await
}

async fn getfeatureinfo_invalid_point(probe: &Probe<'_>) -> Outcome {
    let Some(layer) = probe.resource(Service::Wms) else {
        return Outcome::skipped(NO_LAYER);
    };
    let outside = (SIZE * 4).to_string();
    let url = getfeatureinfo(layer)
        .set("I", outside.clone())
        .set("J", outside)
        .url(probe.endpoints, Service::Wms);
    probe
        .evaluate(url, |x, checks| {
            checks.accept_either(
                "point outside the map handled",
                x,
                Branch::new("HTTP 400 InvalidPoint", rejected_with(x, "InvalidPoint")),
                Branch::new("HTTP 200 empty result", x.status.as_u16() == 200),
            );
        })
        .await
}

/// Strict-only exception test: HTTP 400 with the expected exception code.
async fn expect_exception(probe: &Probe<'_>, request: Kvp, code: &'static str) -> Outcome {
    let url = request.url(probe.endpoints, Service::Wms);
    probe
        .evaluate(url, |x, checks| {
            checks.status(x, 400);
            checks.exception_code(x, code);
        })
        .await
}

/// Two-branch test: HTTP 400 with `code`, or a rendered map ignoring the bad parameter.
async fn reject_or_render(probe: &Probe<'_>, request: Kvp, name: &'static str, code: &'static str) -> Outcome {
    let url = request.url(probe.endpoints, Service::Wms);
    probe
        .evaluate(url, |x, checks| {
            checks.accept_either(
                name,
                x,
                Branch::new(code, rejected_with(x, code)),
                Branch::new("HTTP 200 image", served_image(x)),
            );
        })
        .await
}

async fn invalid_layer(probe: &Probe<'_>) -> Outcome {
    let Some(layer) = probe.resource(Service::Wms) else {
        return Outcome::skipped(NO_LAYER);
    };
    let request = getmap(layer).set("LAYERS", NO_SUCH_LAYER).set("STYLES", "");
    expect_exception(probe, request, "LayerNotDefined").await
}

async fn invalid_style(probe: &Probe<'_>) -> Outcome {
    let Some(layer) = probe.resource(Service::Wms) else {
        return Outcome::skipped(NO_LAYER);
    };
    let request = getmap(layer).set("STYLES", "spatialprobe_no_such_style");
    reject_or_render(probe, request, "unknown style handled", "StyleNotDefined").await
}

async fn invalid_crs(probe: &Probe<'_>) -> Outcome {
    let Some(layer) = probe.resource(Service::Wms) else {
        return Outcome::skipped(NO_LAYER);
    };
    let request = getmap(layer).set("CRS", "EPSG:99999");
    reject_or_render(probe, request, "unknown CRS handled", "InvalidCRS").await
}

async fn invalid_format(probe: &Probe<'_>) -> Outcome {
    let Some(layer) = probe.resource(Service::Wms) else {
        return Outcome::skipped(NO_LAYER);
    };
    let request = getmap(layer).set("FORMAT", "image/x-spatialprobe");
    reject_or_render(probe, request, "unknown format handled", "InvalidFormat").await
}

async fn invalid_dimension_value(probe: &Probe<'_>) -> Outcome {
    let Some(fixture) = probe.context.dimension(Service::Wms, DimensionKind::Time) else {
        return Outcome::skipped("no WMS layer with a Time dimension");
    };
    let request = getmap(&fixture.resource).set("TIME", "1800-01-01T00:00:00Z");
    reject_or_render(probe, request, "out of range TIME handled", "InvalidDimensionValue").await
}

async fn missing_layers(probe: &Probe<'_>) -> Outcome {
    let Some(layer) = probe.resource(Service::Wms) else {
        return Outcome::skipped(NO_LAYER);
    };
    let request = getmap(layer).remove("LAYERS");
    expect_exception(probe, request, "MissingParameterValue").await
}

async fn unsupported_request(probe: &Probe<'_>) -> Outcome {
    let request = Kvp::new(&[("SERVICE", "WMS"), ("VERSION", "1.3.0"), ("REQUEST", "GetSpatialProbe")]);
    expect_exception(probe, request, "OperationNotSupported").await
}
