//! OGC API - Environmental Data Retrieval 1.0 conformance tests (OGC 19-086r6).

use geo::{Coord, Rect};
use serde_json::Value;

use super::{Category, Probe, test_case};
use crate::assertions::{Branch, Checks};
use crate::capabilities::{DimensionKind, Resource};
use crate::executor::Exchange;
use crate::results::Outcome;
use crate::service::Service;

const CATEGORY: &str = "edr";
const CONF_CORE: &str = "http://www.opengis.net/spec/ogcapi-edr-1/1.0/conf/core";
const NO_COLLECTION: &str = "no EDR collection advertised";

pub fn category() -> Category {
    Category::new(
        CATEGORY,
        "OGC API - EDR 1.0",
        vec![
            test_case!(CATEGORY, "edr-landing", "OGC 19-086r6 7.2", "Landing page links the API resources", landing),
            test_case!(CATEGORY, "edr-conformance", "OGC 19-086r6 7.3", "Conformance declares the EDR core class", conformance),
            test_case!(CATEGORY, "edr-collections", "OGC 19-086r6 7.4", "Collections list is served as JSON", collections),
            test_case!(CATEGORY, "edr-collection-metadata", "OGC 19-086r6 7.5", "Collection metadata describes extent and queries", collection_metadata),
            test_case!(CATEGORY, "edr-position", "OGC 19-086r6 8.2.1", "Position query returns CoverageJSON", position),
            test_case!(CATEGORY, "edr-position-datetime", "OGC 19-086r6 8.2.1.4", "Position query with a sampled datetime", position_datetime),
            test_case!(CATEGORY, "edr-position-z", "OGC 19-086r6 8.2.1.5", "Position query with a sampled z level", position_z),
            test_case!(CATEGORY, "edr-position-parameter", "OGC 19-086r6 8.2.1.6", "Position query with a sampled parameter-name", position_parameter),
            test_case!(CATEGORY, "edr-area", "OGC 19-086r6 8.2.3", "Area query returns CoverageJSON", area),
            test_case!(CATEGORY, "edr-invalid-coords", "OGC 19-086r6 8.2.1.2", "Malformed coords are rejected with 400", invalid_coords),
            test_case!(CATEGORY, "edr-invalid-parameter", "OGC 19-086r6 8.2.1.6", "Unknown parameter-name is rejected or ignored", invalid_parameter),
            test_case!(CATEGORY, "edr-invalid-crs", "OGC 19-086r6 8.2.1.3", "Unsupported crs is rejected or ignored", invalid_crs),
            test_case!(CATEGORY, "edr-unknown-collection", "OGC 19-086r6 7.5", "Unknown collection returns 404", unknown_collection),
        ],
    )
}

fn point_wkt(c: Coord<f64>) -> String {
    format!("POINT({} {})", c.x, c.y)
}

fn polygon_wkt(rect: &Rect<f64>) -> String {
    let (min, max) = (rect.min(), rect.max());
    format!(
        "POLYGON(({x0} {y0},{x1} {y0},{x1} {y1},{x0} {y1},{x0} {y0}))",
        x0 = min.x,
        y0 = min.y,
        x1 = max.x,
        y1 = max.y
    )
}

fn json_type(x: &Exchange) -> bool {
    x.content_type().is_some_and(|ct| ct.to_ascii_lowercase().contains("json"))
}

/// CoverageJSON document: status, media type and top-level structure.
fn expect_coverage(x: &Exchange, checks: &mut Checks) -> Option<Value> {
    checks.status(x, 200);
    checks.check_detail("Content-Type is JSON", json_type(x), x.content_type().unwrap_or("<none>").to_string());
    let json = checks.json_body(x)?;
    let kind = json.get("type").and_then(Value::as_str).unwrap_or_default().to_string();
    checks.check_detail(
        "CoverageJSON type",
        matches!(kind.as_str(), "Coverage" | "CoverageCollection"),
        kind,
    );
    checks.check(
        "coverage has a domain",
        json.get("domain").is_some() || json.get("coverages").and_then(Value::as_array).is_some(),
    );
    Some(json)
}

/// EDR exception body: JSON carrying a `type` or `code`.
fn expect_exception(x: &Exchange, checks: &mut Checks, status: u16) {
    checks.status(x, status);
    let json = x.json();
    checks.check(
        "exception body describes the error",
        json.as_ref()
            .is_some_and(|j| j.get("type").is_some() || j.get("code").is_some() || j.get("title").is_some()),
    );
}

fn position_url(probe: &Probe<'_>, collection: &Resource, extra: &[(&str, &str)]) -> url::Url {
    let coords = point_wkt(collection.center());
    let mut params = vec![("coords", coords.as_str())];
    params.extend_from_slice(extra);
    probe
        .endpoints
        .path_query(Service::Edr, &["collections", collection.name.as_str(), "position"], &params)
}

async fn landing(probe: &Probe<'_>) -> Outcome {
    let url = probe.endpoints.path(Service::Edr, &[]);
    probe
        .evaluate(url, |x, checks| {
            checks.status(x, 200);
            let json = checks.json_body(x).unwrap_or_default();
            let links = json.get("links").and_then(Value::as_array).cloned().unwrap_or_default();
            checks.check_detail("links present", !links.is_empty(), format!("{} links", links.len()));
            for rel in ["conformance", "data"] {
                checks.check(
                    format!("link rel={}", rel),
                    links.iter().any(|l| l.get("rel").and_then(Value::as_str) == Some(rel)),
                );
            }
        })
        .await
}

async fn conformance(probe: &Probe<'_>) -> Outcome {
    let url = probe.endpoints.path(Service::Edr, &["conformance"]);
    probe
        .evaluate(url, |x, checks| {
            checks.status(x, 200);
            let json = checks.json_body(x).unwrap_or_default();
            let classes: Vec<&str> = json
                .get("conformsTo")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            checks.check("declares EDR core", classes.contains(&CONF_CORE));
        })
        .await
}

async fn collections(probe: &Probe<'_>) -> Outcome {
    let url = probe.endpoints.path(Service::Edr, &["collections"]);
    probe
        .evaluate(url, |x, checks| {
            checks.status(x, 200);
            checks.check("Content-Type is JSON", json_type(x));
            let json = checks.json_body(x).unwrap_or_default();
            let collections = json.get("collections").and_then(Value::as_array);
            checks.check("collections array present", collections.is_some());
            checks.check(
                "every collection has an id",
                collections.is_some_and(|c| c.iter().all(|c| c.get("id").and_then(Value::as_str).is_some())),
            );
        })
        .await
}

async fn collection_metadata(probe: &Probe<'_>) -> Outcome {
    let Some(collection) = probe.resource(Service::Edr) else {
        return Outcome::skipped(NO_COLLECTION);
    };
    let url = probe
        .endpoints
        .path(Service::Edr, &["collections", collection.name.as_str()]);
    let id = collection.name.clone();
    probe
        .evaluate(url, move |x, checks| {
            checks.status(x, 200);
            let json = checks.json_body(x).unwrap_or_default();
            checks.check(
                format!("id is '{}'", id),
                json.get("id").and_then(Value::as_str) == Some(id.as_str()),
            );
            checks.check("extent present", json.get("extent").is_some());
            checks.check("data_queries present", json.get("data_queries").is_some());
        })
        .await
}

async fn position(probe: &Probe<'_>) -> Outcome {
    let Some(collection) = probe.resource(Service::Edr) else {
        return Outcome::skipped(NO_COLLECTION);
    };
    let url = position_url(probe, collection, &[]);
    probe
        .evaluate(url, |x, checks| {
            expect_coverage(x, checks);
        })
        .await
}

async fn position_dimension(probe: &Probe<'_>, kind: DimensionKind, param: &'static str) -> Outcome {
    let Some(sampled) = probe.sample(Service::Edr, kind) else {
        return Outcome::skipped(format!("no EDR collection with a {:?} axis", kind));
    };
    let url = position_url(probe, sampled.resource, &[(param, sampled.value.as_str())]);
    let value = sampled.value;
    probe
        .evaluate(url, move |x, checks| {
            expect_coverage(x, checks);
            checks.check_detail("sampled value accepted", x.status.is_success(), value);
        })
        .await
}

async fn position_datetime(probe: &Probe<'_>) -> Outcome {
    position_dimension(probe, DimensionKind::Time, "datetime").await
}

async fn position_z(probe: &Probe<'_>) -> Outcome {
    position_dimension(probe, DimensionKind::Elevation, "z").await
}

async fn position_parameter(probe: &Probe<'_>) -> Outcome {
    let Some(collection) = probe.context.service(Service::Edr).and_then(|f| f.with_parameters()) else {
        return Outcome::skipped("no EDR collection advertises parameter_names");
    };
    let Some(parameter) = probe.sampler.pick(&collection.parameters) else {
        return Outcome::skipped("no EDR collection advertises parameter_names");
    };
    let url = position_url(probe, collection, &[("parameter-name", parameter.as_str())]);
    probe
        .evaluate(url, move |x, checks| {
            let Some(json) = expect_coverage(x, checks) else {
                return;
            };
            let parameters = json
                .get("parameters")
                .or_else(|| json.pointer("/coverages/0/parameters"))
                .and_then(Value::as_object);
            checks.check(
                format!("parameter '{}' returned", parameter),
                parameters.is_some_and(|p| p.contains_key(&parameter)),
            );
        })
        .await
}

async fn area(probe: &Probe<'_>) -> Outcome {
    let Some(collection) = probe.resource(Service::Edr) else {
        return Outcome::skipped(NO_COLLECTION);
    };
    let coords = polygon_wkt(&collection.sample_box(1.0));
    let url = probe.endpoints.path_query(
        Service::Edr,
        &["collections", collection.name.as_str(), "area"],
        &[("coords", coords.as_str())],
    );
    probe
        .evaluate(url, |x, checks| {
            expect_coverage(x, checks);
        })
        .await
}

async fn invalid_coords(probe: &Probe<'_>) -> Outcome {
    let Some(collection) = probe.resource(Service::Edr) else {
        return Outcome::skipped(NO_COLLECTION);
    };
    let url = probe.endpoints.path_query(
        Service::Edr,
        &["collections", collection.name.as_str(), "position"],
        &[("coords", "POINT(east north)")],
    );
    probe
        .evaluate(url, |x, checks| expect_exception(x, checks, 400))
        .await
}

async fn invalid_parameter(probe: &Probe<'_>) -> Outcome {
    let Some(collection) = probe.resource(Service::Edr) else {
        return Outcome::skipped(NO_COLLECTION);
    };
    let url = position_url(probe, collection, &[("parameter-name", "spatialprobe_no_such_parameter")]);
    probe
        .evaluate(url, |x, checks| reject_or_cover(x, checks, "unknown parameter-name handled"))
        .await
}

async fn invalid_crs(probe: &Probe<'_>) -> Outcome {
    let Some(collection) = probe.resource(Service::Edr) else {
        return Outcome::skipped(NO_COLLECTION);
    };
    let url = position_url(probe, collection, &[("crs", "EPSG:99999")]);
    probe
        .evaluate(url, |x, checks| reject_or_cover(x, checks, "unsupported crs handled"))
        .await
}

/// Two-branch check: a 400 exception body, or CoverageJSON ignoring the bad argument.
fn reject_or_cover(x: &Exchange, checks: &mut Checks, name: &str) {
    let is_coverage = x.status.as_u16() == 200
        && x
            .json()
            .and_then(|j| j.get("type").and_then(Value::as_str).map(str::to_string))
            .is_some_and(|t| t.starts_with("Coverage"));
    checks.accept_either(
        name,
        x,
        Branch::new("HTTP 400 exception", x.status.as_u16() == 400 && json_type(x)),
        Branch::new("HTTP 200 CoverageJSON", is_coverage),
    );
}

async fn unknown_collection(probe: &Probe<'_>) -> Outcome {
    let url = probe
        .endpoints
        .path(Service::Edr, &["collections", "spatialprobe_no_such_collection"]);
    probe
        .evaluate(url, |x, checks| expect_exception(x, checks, 404))
        .await
}
