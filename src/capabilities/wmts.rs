//! WMTS 1.0.0 capabilities parsing.

use geo::Rect;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::model::{Dimension, Resource};
use super::wms::{attr, local_name};
use crate::error::{ProbeError, ProbeResult};

#[derive(Debug, Clone, Default)]
pub struct WmtsCapabilities {
    pub version: Option<String>,
    pub layers: Vec<Resource>,
    pub tile_matrix_sets: Vec<TileMatrixSetSummary>,
}

impl WmtsCapabilities {
    pub fn tile_matrix_set(&self, id: &str) -> Option<&TileMatrixSetSummary> {
        self.tile_matrix_sets.iter().find(|tms| tms.id == id)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileMatrixSetSummary {
    pub id: String,
    pub matrix_count: usize,
}

fn parse_corner(text: &str) -> Option<(f64, f64)> {
    let mut parts = text.split_whitespace().map(|p| p.parse::<f64>());
    match (parts.next(), parts.next()) {
        (Some(Ok(x)), Some(Ok(y))) => Some((x, y)),
        _ => None,
    }
}

fn on_resource_url(e: &BytesStart, layer: Option<&mut Resource>) -> ProbeResult<()> {
    let Some(layer) = layer else {
        return Ok(());
    };
    if attr(e, "resourceType")?.as_deref() == Some("tile") && layer.tile_template.is_none() {
        layer.tile_template = attr(e, "template")?;
    }
    Ok(())
}

/// Parse a WMTS capabilities document into its layers and tile matrix sets.
pub fn parse(xml: &str) -> ProbeResult<WmtsCapabilities> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut caps = WmtsCapabilities::default();
    let mut root = String::new();
    let mut path: Vec<String> = Vec::new();
    let mut layer: Option<Resource> = None;
    let mut style_is_default = false;
    let mut dimension: Option<(String, Dimension)> = None;
    let mut lower: Option<(f64, f64)> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = local_name(&e);
                let parent = path.last().map(String::as_str);
                if path.is_empty() {
                    root = name.clone();
                    caps.version = attr(&e, "version")?;
                }
                match (parent, name.as_str()) {
                    (Some("Contents"), "Layer") => layer = Some(Resource::new(String::new())),
                    (Some("Layer"), "Style") => {
                        style_is_default = attr(&e, "isDefault")?.as_deref() == Some("true");
                    }
                    (Some("Layer"), "Dimension") => {
                        dimension = Some((String::new(), Dimension::default()));
                    }
                    (Some("Layer"), "ResourceURL") => on_resource_url(&e, layer.as_mut())?,
                    (Some("Contents"), "TileMatrixSet") => {
                        caps.tile_matrix_sets.push(TileMatrixSetSummary::default());
                    }
                    (Some("TileMatrixSet"), "TileMatrix") => {
                        if let Some(tms) = caps.tile_matrix_sets.last_mut() {
                            tms.matrix_count += 1;
                        }
                    }
                    _ => {}
                }
                path.push(name);
            }
            Event::Empty(e) => {
                if local_name(&e) == "ResourceURL" && path.last().is_some_and(|p| p == "Layer") {
                    on_resource_url(&e, layer.as_mut())?;
                }
            }
            Event::Text(t) => {
                let text = t.unescape()?.into_owned();
                let Some(current) = path.last().map(String::as_str) else {
                    continue;
                };
                let parent = path.len().checked_sub(2).map(|i| path[i].as_str());
                match (parent, current) {
                    (Some("Layer"), "Identifier") => {
                        if let Some(l) = layer.as_mut() {
                            l.name = text;
                        }
                    }
                    (Some("Layer"), "Title") => {
                        if let Some(l) = layer.as_mut() {
                            l.title = Some(text);
                        }
                    }
                    (Some("Layer"), "Format") => {
                        if let Some(l) = layer.as_mut() {
                            l.formats.push(text);
                        }
                    }
                    (Some("Style"), "Identifier") => {
                        if let Some(l) = layer.as_mut() {
                            if style_is_default {
                                l.styles.insert(0, text);
                            } else {
                                l.styles.push(text);
                            }
                        }
                    }
                    (Some("Dimension"), "Identifier") => {
                        if let Some((name, _)) = dimension.as_mut() {
                            *name = text;
                        }
                    }
                    (Some("Dimension"), "Default") => {
                        if let Some((_, dim)) = dimension.as_mut() {
                            dim.default = Some(text);
                        }
                    }
                    (Some("Dimension"), "UOM") => {
                        if let Some((_, dim)) = dimension.as_mut() {
                            dim.units = Some(text);
                        }
                    }
                    (Some("Dimension"), "Value") => {
                        if let Some((_, dim)) = dimension.as_mut() {
                            dim.values.extend(Dimension::parse_values(&text));
                        }
                    }
                    (Some("WGS84BoundingBox"), "LowerCorner") => lower = parse_corner(&text),
                    (Some("WGS84BoundingBox"), "UpperCorner") => {
                        if let (Some((west, south)), Some((east, north)), Some(l)) =
                            (lower.take(), parse_corner(&text), layer.as_mut())
                        {
                            l.bbox = Some(Rect::new((west, south), (east, north)));
                        }
                    }
                    (Some("TileMatrixSetLink"), "TileMatrixSet") => {
                        if let Some(l) = layer.as_mut() {
                            l.tile_matrix_sets.push(text);
                        }
                    }
                    (Some("TileMatrixSet"), "Identifier") => {
                        if let Some(tms) = caps.tile_matrix_sets.last_mut() {
                            tms.id = text;
                        }
                    }
                    _ => {}
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                path.pop();
                let parent = path.last().map(String::as_str);
                match (parent, name.as_str()) {
                    (Some("Layer"), "Dimension") => {
                        if let (Some((dim_name, dim)), Some(l)) = (dimension.take(), layer.as_mut())
                        {
                            if !dim_name.is_empty() {
                                l.dimensions.insert(dim_name, dim);
                            }
                        }
                    }
                    (Some("Layer"), "Style") => style_is_default = false,
                    (Some("Contents"), "Layer") => {
                        if let Some(l) = layer.take() {
                            if !l.name.is_empty() {
                                caps.layers.push(l);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if root != "Capabilities" {
        return Err(ProbeError::Capabilities(format!(
            "expected WMTS Capabilities root element, found '{}'",
            root
        )));
    }

    Ok(caps)
}
