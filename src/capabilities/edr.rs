//! OGC API EDR collection metadata.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use super::model::{Dimension, Resource, TemporalExtent};
use crate::error::ProbeResult;

#[derive(Debug, Deserialize)]
struct CollectionList {
    #[serde(default)]
    collections: Vec<CollectionDoc>,
}

#[derive(Debug, Deserialize)]
struct CollectionDoc {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    extent: Option<ExtentDoc>,
    #[serde(default)]
    crs: Vec<Value>,
    #[serde(default)]
    output_formats: Vec<String>,
    #[serde(default)]
    parameter_names: IndexMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ExtentDoc {
    #[serde(default)]
    spatial: Option<SpatialDoc>,
    #[serde(default)]
    temporal: Option<TemporalDoc>,
    #[serde(default)]
    vertical: Option<VerticalDoc>,
    #[serde(default)]
    custom: Vec<CustomDoc>,
}

#[derive(Debug, Deserialize)]
struct SpatialDoc {
    #[serde(default)]
    bbox: Vec<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct TemporalDoc {
    #[serde(default)]
    interval: Vec<Vec<Option<String>>>,
    #[serde(default)]
    values: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct VerticalDoc {
    #[serde(default)]
    interval: Vec<Vec<Value>>,
    #[serde(default)]
    values: Vec<Value>,
    #[serde(default)]
    vrs: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CustomDoc {
    id: String,
    #[serde(default)]
    interval: Vec<Vec<Value>>,
    #[serde(default)]
    values: Vec<Value>,
    #[serde(default)]
    reference: Option<String>,
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Enumerated values, or the interval endpoints when none are listed.
fn axis_values(values: &[Value], interval: &[Vec<Value>]) -> Vec<String> {
    let mut out: Vec<String> = values.iter().filter_map(scalar).collect();
    if out.is_empty() {
        for value in interval.iter().flatten().filter_map(scalar) {
            if !out.contains(&value) {
                out.push(value);
            }
        }
    }
    out
}

/// Parse an EDR `/collections` document.
pub fn parse(body: &[u8]) -> ProbeResult<Vec<Resource>> {
    let list: CollectionList = serde_json::from_slice(body)?;
    Ok(list.collections.into_iter().map(into_resource).collect())
}

fn into_resource(doc: CollectionDoc) -> Resource {
    let mut resource = Resource::new(doc.id);
    resource.title = doc.title;
    resource.formats = doc.output_formats;
    resource.parameters = doc.parameter_names.into_keys().collect();
    resource.crs = doc
        .crs
        .iter()
        .filter_map(|c| match c {
            Value::Object(obj) => obj.get("crs").and_then(scalar),
            other => scalar(other),
        })
        .collect();

    let extent = doc.extent.unwrap_or_default();

    if let Some(bbox) = extent.spatial.and_then(|s| s.bbox.into_iter().next()) {
        // 3D boxes carry [minx, miny, minz, maxx, maxy, maxz]
        let (west, south, east, north) = match bbox.as_slice() {
            [w, s, e, n] => (*w, *s, *e, *n),
            [w, s, _, e, n, _] => (*w, *s, *e, *n),
            _ => (-180.0, -90.0, 180.0, 90.0),
        };
        resource = resource.with_bbox(west, south, east, north);
    }

    if let Some(temporal) = extent.temporal {
        let mut values = temporal.values;
        if values.is_empty() {
            values = temporal.interval.into_iter().flatten().flatten().collect();
        }
        resource.temporal = Some(TemporalExtent {
            start: values.first().cloned(),
            end: values.last().cloned(),
        });
        if !values.is_empty() {
            resource.dimensions.insert(
                "datetime".to_string(),
                Dimension {
                    default: values.last().cloned(),
                    values,
                    units: Some("ISO8601".to_string()),
                },
            );
        }
    }

    if let Some(vertical) = extent.vertical {
        let values = axis_values(&vertical.values, &vertical.interval);
        if !values.is_empty() {
            resource.dimensions.insert(
                "z".to_string(),
                Dimension {
                    default: values.first().cloned(),
                    values,
                    units: vertical.vrs,
                },
            );
        }
    }

    for custom in extent.custom {
        let values = axis_values(&custom.values, &custom.interval);
        if !values.is_empty() {
            resource.dimensions.insert(
                custom.id,
                Dimension {
                    default: values.first().cloned(),
                    values,
                    units: custom.reference,
                },
            );
        }
    }

    resource
}
