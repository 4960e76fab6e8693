//! WMS 1.3.0 capabilities parsing.

use geo::Rect;
use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::model::{Dimension, DimensionKind, Resource, TemporalExtent};
use crate::error::{ProbeError, ProbeResult};

#[derive(Debug, Clone, Default)]
pub struct WmsCapabilities {
    /// Local name of the root element.
    pub root: String,
    pub version: Option<String>,
    pub layers: Vec<Resource>,
    pub map_formats: Vec<String>,
}

#[derive(Default)]
struct LayerFrame {
    /// Position of the layer's opening tag among all layers.
    slot: usize,
    name: Option<String>,
    title: Option<String>,
    styles: Vec<String>,
    dimensions: IndexMap<String, Dimension>,
    crs: Vec<String>,
    bbox: Option<Rect<f64>>,
    bounds: [Option<f64>; 4],
}

impl LayerFrame {
    /// Child layers inherit CRS and geographic extent from their parent.
    fn child_of(parent: &LayerFrame) -> Self {
        Self {
            crs: parent.crs.clone(),
            bbox: parent.bbox,
            ..Self::default()
        }
    }

    fn finish_bounds(&mut self) {
        if let [Some(west), Some(east), Some(south), Some(north)] = self.bounds {
            self.bbox = Some(Rect::new((west, south), (east, north)));
        }
        self.bounds = [None; 4];
    }
}

pub(crate) fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

pub(crate) fn attr(e: &BytesStart, key: &str) -> ProbeResult<Option<String>> {
    for attribute in e.attributes().flatten() {
        if attribute.key.local_name().as_ref() == key.as_bytes() {
            return Ok(Some(attribute.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Parse a WMS capabilities document into its named layers.
pub fn parse(xml: &str) -> ProbeResult<WmsCapabilities> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut caps = WmsCapabilities::default();
    let mut path: Vec<String> = Vec::new();
    let mut layers: Vec<LayerFrame> = Vec::new();
    // Filled as layers close, so nested layers keep document order
    let mut slots: Vec<Option<Resource>> = Vec::new();
    let mut dimension: Option<(String, Dimension)> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = local_name(&e);
                if path.is_empty() {
                    caps.root = name.clone();
                    caps.version = attr(&e, "version")?;
                }
                match name.as_str() {
                    "Layer" => {
                        let mut frame = layers.last().map(LayerFrame::child_of).unwrap_or_default();
                        frame.slot = slots.len();
                        slots.push(None);
                        layers.push(frame);
                    }
                    "Dimension" if path.last().is_some_and(|p| p == "Layer") => {
                        dimension = Some(start_dimension(&e)?);
                    }
                    _ => {}
                }
                path.push(name);
            }
            Event::Empty(e) => {
                let name = local_name(&e);
                if name == "Dimension" && path.last().is_some_and(|p| p == "Layer") {
                    let (dim_name, dim) = start_dimension(&e)?;
                    if let Some(frame) = layers.last_mut() {
                        frame.dimensions.insert(dim_name, dim);
                    }
                }
            }
            Event::Text(t) => {
                let text = t.unescape()?.into_owned();
                let Some(current) = path.last().map(String::as_str) else {
                    continue;
                };
                let parent = path.len().checked_sub(2).map(|i| path[i].as_str());
                match (parent, current) {
                    (Some("Layer"), "Name") => {
                        if let Some(frame) = layers.last_mut() {
                            frame.name = Some(text);
                        }
                    }
                    (Some("Layer"), "Title") => {
                        if let Some(frame) = layers.last_mut() {
                            frame.title = Some(text);
                        }
                    }
                    (Some("Style"), "Name") => {
                        if let Some(frame) = layers.last_mut() {
                            frame.styles.push(text);
                        }
                    }
                    (Some("Layer"), "CRS") | (Some("Layer"), "SRS") => {
                        if let Some(frame) = layers.last_mut() {
                            if !frame.crs.contains(&text) {
                                frame.crs.push(text);
                            }
                        }
                    }
                    (Some("Layer"), "Dimension") => {
                        if let Some((_, dim)) = dimension.as_mut() {
                            dim.values.extend(Dimension::parse_values(&text));
                        }
                    }
                    (Some("EX_GeographicBoundingBox"), bound) => {
                        let index = match bound {
                            "westBoundLongitude" => Some(0),
                            "eastBoundLongitude" => Some(1),
                            "southBoundLatitude" => Some(2),
                            "northBoundLatitude" => Some(3),
                            _ => None,
                        };
                        if let (Some(i), Some(frame)) = (index, layers.last_mut()) {
                            frame.bounds[i] = text.trim().parse().ok();
                        }
                    }
                    (Some("GetMap"), "Format") => {
                        caps.map_formats.push(text);
                    }
                    _ => {}
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                path.pop();
                match name.as_str() {
                    "Dimension" => {
                        if let (Some((dim_name, dim)), Some(frame)) =
                            (dimension.take(), layers.last_mut())
                        {
                            frame.dimensions.insert(dim_name, dim);
                        }
                    }
                    "EX_GeographicBoundingBox" => {
                        if let Some(frame) = layers.last_mut() {
                            frame.finish_bounds();
                        }
                    }
                    "Layer" => {
                        if let Some(frame) = layers.pop() {
                            let slot = frame.slot;
                            slots[slot] = into_resource(frame);
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

    if caps.root != "WMS_Capabilities" && caps.root != "WMT_MS_Capabilities" {
        return Err(ProbeError::Capabilities(format!(
            "expected WMS_Capabilities root element, found '{}'",
            caps.root
        )));
    }

    caps.layers = slots.into_iter().flatten().collect();
    for layer in &mut caps.layers {
        layer.formats = caps.map_formats.clone();
    }

    Ok(caps)
}

fn start_dimension(e: &BytesStart) -> ProbeResult<(String, Dimension)> {
    let name = attr(e, "name")?.unwrap_or_default();
    let dim = Dimension {
        default: attr(e, "default")?,
        values: Vec::new(),
        units: attr(e, "units")?,
    };
    Ok((name, dim))
}

fn into_resource(frame: LayerFrame) -> Option<Resource> {
    let name = frame.name?;
    let temporal = frame
        .dimensions
        .iter()
        .find(|(n, _)| DimensionKind::of(n) == DimensionKind::Time)
        .and_then(|(_, dim)| {
            let values = dim.candidates();
            if values.is_empty() {
                return None;
            }
            Some(TemporalExtent {
                start: values.first().cloned(),
                end: values.last().cloned(),
            })
        });

    Some(Resource {
        name,
        title: frame.title,
        styles: frame.styles,
        dimensions: frame.dimensions,
        bbox: frame.bbox,
        temporal,
        crs: frame.crs,
        formats: Vec::new(),
        parameters: Vec::new(),
        tile_matrix_sets: Vec::new(),
        tile_template: None,
    })
}
