//! WMTS 1.0.0 conformance tests (OGC 07-057r7), KVP and RESTful encodings.

use url::Url;

use super::{Category, Kvp, Probe, rejected_with, served_image, test_case};
use crate::assertions::{Branch, Checks};
use crate::capabilities::{DimensionKind, Resource, capabilities_url, wmts as document};
use crate::executor::Exchange;
use crate::results::Outcome;
use crate::service::{Endpoints, Service};

const CATEGORY: &str = "wmts";
const WEB_MERCATOR_QUAD: &str = "WebMercatorQuad";
const TILE_SIZE: u32 = 256;
const NO_LAYER: &str = "no WMTS layer advertised";

/// Tile address probed by default: zoom 2, column 1, row 1.
const TILE: (u32, u32, u32) = (2, 1, 1);

pub fn category() -> Category {
    Category::new(
        CATEGORY,
        "WMTS 1.0.0",
        vec![
            test_case!(CATEGORY, "wmts-capabilities", "OGC 07-057r7 7.1", "GetCapabilities returns a WMTS 1.0.0 capabilities document", capabilities),
            test_case!(CATEGORY, "wmts-webmercatorquad", "OGC 07-057r7 6.2 / OGC 17-083r2 D.1", "WebMercatorQuad tile matrix set is advertised", web_mercator_quad),
            test_case!(CATEGORY, "wmts-gettile-kvp", "OGC 07-057r7 7.2", "KVP GetTile returns a PNG tile", gettile_kvp),
            test_case!(CATEGORY, "wmts-gettile-rest", "OGC 07-057r7 10.2", "RESTful GetTile returns a PNG tile", gettile_rest),
            test_case!(CATEGORY, "wmts-tile-size", "OGC 07-057r7 6.1", "Tiles are 256x256 pixels", tile_size),
            test_case!(CATEGORY, "wmts-time-tile", "OGC 07-057r7 7.2.4.5", "GetTile with a sampled TIME value", time_tile),
            test_case!(CATEGORY, "wmts-tile-out-of-range", "OGC 07-057r7 8.2.3", "Tile outside the matrix raises TileOutOfRange", tile_out_of_range),
            test_case!(CATEGORY, "wmts-invalid-layer", "OGC 07-057r7 8.2.3", "Unknown layer raises InvalidParameterValue", invalid_layer),
            test_case!(CATEGORY, "wmts-invalid-style", "OGC 07-057r7 8.2.3", "Unknown style is rejected or falls back", invalid_style),
            test_case!(CATEGORY, "wmts-invalid-format", "OGC 07-057r7 8.2.3", "Unknown format is rejected or falls back", invalid_format),
            test_case!(CATEGORY, "wmts-missing-parameter", "OGC 07-057r7 8.2.3", "GetTile without LAYER raises MissingParameterValue", missing_parameter),
        ],
    )
}

/// Tile matrix set to probe: WebMercatorQuad when linked, else the first link.
fn tile_matrix_set(layer: &Resource) -> &str {
    if layer.tile_matrix_sets.is_empty() || layer.tile_matrix_sets.iter().any(|t| t == WEB_MERCATOR_QUAD) {
        WEB_MERCATOR_QUAD
    } else {
        &layer.tile_matrix_sets[0]
    }
}

fn gettile(layer: &Resource) -> Kvp {
    let (z, col, row) = TILE;
    let (z, col, row) = (z.to_string(), col.to_string(), row.to_string());
    Kvp::new(&[
        ("SERVICE", "WMTS"),
        ("REQUEST", "GetTile"),
        ("VERSION", "1.0.0"),
        ("LAYER", layer.name.as_str()),
        ("STYLE", layer.default_style()),
        ("TILEMATRIXSET", tile_matrix_set(layer)),
        ("TILEMATRIX", z.as_str()),
        ("TILEROW", row.as_str()),
        ("TILECOL", col.as_str()),
        ("FORMAT", "image/png"),
    ])
}

/// RESTful tile URL, expanded from the advertised template when there is one.
fn rest_tile_url(endpoints: &Endpoints, layer: &Resource) -> Url {
    let (z, col, row) = TILE;
    let style = match layer.default_style() {
        "" => "default",
        style => style,
    };
    let tms = tile_matrix_set(layer);

    if let Some(template) = &layer.tile_template {
        let expanded = template
            .replace("{Layer}", &layer.name)
            .replace("{layer}", &layer.name)
            .replace("{Style}", style)
            .replace("{style}", style)
            .replace("{TileMatrixSet}", tms)
            .replace("{TileMatrix}", &z.to_string())
            .replace("{TileCol}", &col.to_string())
            .replace("{TileRow}", &row.to_string());
        if !expanded.contains('{') {
            if let Ok(url) = Url::parse(&expanded) {
                return url;
            }
        }
    }

    let (z, col, tile) = (z.to_string(), col.to_string(), format!("{}.png", row));
    endpoints.path(
        Service::Wmts,
        &["rest", layer.name.as_str(), style, tms, z.as_str(), col.as_str(), tile.as_str()],
    )
}

fn expect_tile(x: &Exchange, checks: &mut Checks) {
    checks.status(x, 200);
    checks.content_type(x, "image/png");
}

async fn capabilities(probe: &Probe<'_>) -> Outcome {
    let url = capabilities_url(probe.endpoints, Service::Wmts);
    probe
        .evaluate(url, |x, checks| {
            checks.status(x, 200);
            match document::parse(&x.text()) {
                Ok(doc) => {
                    checks.check_detail(
                        "version is 1.0.0",
                        doc.version.as_deref() == Some("1.0.0"),
                        doc.version.clone().unwrap_or_default(),
                    );
                    checks.check_detail(
                        "Contents lists layers",
                        !doc.layers.is_empty(),
                        format!("{} layers", doc.layers.len()),
                    );
                    checks.check(
                        "every layer links a tile matrix set",
                        doc.layers.iter().all(|l| !l.tile_matrix_sets.is_empty()),
                    );
                }
                Err(e) => {
                    checks.check_detail("document parses", false, e.to_string());
                }
            }
        })
        .await
}

async fn web_mercator_quad(probe: &Probe<'_>) -> Outcome {
    let url = capabilities_url(probe.endpoints, Service::Wmts);
    probe
        .evaluate(url, |x, checks| {
            checks.status(x, 200);
            let doc = document::parse(&x.text()).unwrap_or_default();
            match doc.tile_matrix_set(WEB_MERCATOR_QUAD) {
                Some(tms) => {
                    checks.check("WebMercatorQuad advertised", true);
                    checks.check_detail(
                        "WebMercatorQuad has tile matrices",
                        tms.matrix_count > 0,
                        format!("{} matrices", tms.matrix_count),
                    );
                }
                None => {
                    checks.check_detail(
                        "WebMercatorQuad advertised",
                        false,
                        format!(
                            "found: {}",
                            doc.tile_matrix_sets.iter().map(|t| t.id.as_str()).collect::<Vec<_>>().join(", ")
                        ),
                    );
                }
            }
        })
        .await
}

async fn gettile_kvp(probe: &Probe<'_>) -> Outcome {
    let Some(layer) = probe.resource(Service::Wmts) else {
        return Outcome::skipped(NO_LAYER);
    };
    let url = gettile(layer).url(probe.endpoints, Service::Wmts);
    probe.evaluate(url, expect_tile).await
}

async fn gettile_rest(probe: &Probe<'_>) -> Outcome {
    let Some(layer) = probe.resource(Service::Wmts) else {
        return Outcome::skipped(NO_LAYER);
    };
    let url = rest_tile_url(probe.endpoints, layer);
    probe.evaluate(url, expect_tile).await
}

async fn tile_size(probe: &Probe<'_>) -> Outcome {
    let Some(layer) = probe.resource(Service::Wmts) else {
        return Outcome::skipped(NO_LAYER);
    };
    let url = gettile(layer).url(probe.endpoints, Service::Wmts);
    probe
        .evaluate(url, |x, checks| {
            checks.status(x, 200);
            checks.image_size(x, TILE_SIZE, TILE_SIZE);
        })
        .await
}

async fn time_tile(probe: &Probe<'_>) -> Outcome {
    let Some(sampled) = probe.sample(Service::Wmts, DimensionKind::Time) else {
        return Outcome::skipped("no WMTS layer with a Time dimension");
    };
    let url = gettile(sampled.resource)
        .set(sampled.dimension.to_string(), sampled.value.clone())
        .url(probe.endpoints, Service::Wmts);
    let value = sampled.value;
    probe
        .evaluate(url, move |x, checks| {
            expect_tile(x, checks);
            checks.check_detail("sampled value accepted", served_image(x), value);
        })
        .await
}

async fn tile_out_of_range(probe: &Probe<'_>) -> Outcome {
    let Some(layer) = probe.resource(Service::Wmts) else {
        return Outcome::skipped(NO_LAYER);
    };
    let url = gettile(layer)
        .set("TILEROW", "9999")
        .set("TILECOL", "9999")
        .url(probe.endpoints, Service::Wmts);
    probe
        .evaluate(url, |x, checks| {
            checks.status(x, 400);
            checks.exception_code(x, "TileOutOfRange");
        })
        .await
}

async fn invalid_layer(probe: &Probe<'_>) -> Outcome {
    let Some(layer) = probe.resource(Service::Wmts) else {
        return Outcome::skipped(NO_LAYER);
    };
    let url = gettile(layer)
        .set("LAYER", "spatialprobe_no_such_layer")
        .url(probe.endpoints, Service::Wmts);
    probe
        .evaluate(url, |x, checks| {
            checks.status(x, 400);
            checks.exception_code(x, "InvalidParameterValue");
        })
        .await
}

async fn reject_or_render(probe: &Probe<'_>, request: Kvp, name: &'static str) -> Outcome {
    let url = request.url(probe.endpoints, Service::Wmts);
    probe
        .evaluate(url, |x, checks| {
            checks.accept_either(
                name,
                x,
                Branch::new("HTTP 400 InvalidParameterValue", rejected_with(x, "InvalidParameterValue")),
                Branch::new("HTTP 200 image", served_image(x)),
            );
        })
        .await
}

async fn invalid_style(probe: &Probe<'_>) -> Outcome {
    let Some(layer) = probe.resource(Service::Wmts) else {
        return Outcome::skipped(NO_LAYER);
    };
    let request = gettile(layer).set("STYLE", "spatialprobe_no_such_style");
    reject_or_render(probe, request, "unknown style handled").await
}

async fn invalid_format(probe: &Probe<'_>) -> Outcome {
    let Some(layer) = probe.resource(Service::Wmts) else {
        return Outcome::skipped(NO_LAYER);
    };
    let request = gettile(layer).set("FORMAT", "image/x-spatialprobe");
    reject_or_render(probe, request, "unknown format handled").await
}

async fn missing_parameter(probe: &Probe<'_>) -> Outcome {
    let Some(layer) = probe.resource(Service::Wmts) else {
        return Outcome::skipped(NO_LAYER);
    };
    let url = gettile(layer).remove("LAYER").url(probe.endpoints, Service::Wmts);
    probe
        .evaluate(url, |x, checks| {
            checks.status(x, 400);
            checks.exception_code(x, "MissingParameterValue");
        })
        .await
}
