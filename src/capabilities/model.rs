use geo::{Coord, Rect};
use indexmap::IndexMap;

/// Classification of a dimension axis for fixture selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DimensionKind {
    Time,
    Elevation,
    Custom,
}

impl DimensionKind {
    pub fn of(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "time" | "datetime" => DimensionKind::Time,
            "elevation" | "z" => DimensionKind::Elevation,
            _ => DimensionKind::Custom,
        }
    }
}

/// A dimension advertised by a resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dimension {
    pub default: Option<String>,
    pub values: Vec<String>,
    pub units: Option<String>,
}

impl Dimension {
    /// Split a comma separated dimension body into its values.
    ///
    /// Interval notation (`start/end/period`) is kept as a single opaque value.
    pub fn parse_values(text: &str) -> Vec<String> {
        text.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Values a request may use: the enumeration, or the default alone.
    pub fn candidates(&self) -> Vec<String> {
        if !self.values.is_empty() {
            return self.values.clone();
        }
        self.default.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemporalExtent {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// A queryable layer or collection, normalized across protocols.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub name: String,
    pub title: Option<String>,
    pub styles: Vec<String>,
    pub dimensions: IndexMap<String, Dimension>,
    /// Geographic extent in CRS:84 (x = longitude, y = latitude).
    pub bbox: Option<Rect<f64>>,
    pub temporal: Option<TemporalExtent>,
    pub crs: Vec<String>,
    pub formats: Vec<String>,
    /// EDR parameter names.
    pub parameters: Vec<String>,
    pub tile_matrix_sets: Vec<String>,
    /// WMTS RESTful tile URL template.
    pub tile_template: Option<String>,
}

impl Resource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            styles: Vec::new(),
            dimensions: IndexMap::new(),
            bbox: None,
            temporal: None,
            crs: Vec::new(),
            formats: Vec::new(),
            parameters: Vec::new(),
            tile_matrix_sets: Vec::new(),
            tile_template: None,
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.styles.push(style.into());
        self
    }

    pub fn with_dimension(mut self, name: impl Into<String>, dimension: Dimension) -> Self {
        self.dimensions.insert(name.into(), dimension);
        self
    }

    pub fn with_bbox(mut self, west: f64, south: f64, east: f64, north: f64) -> Self {
        self.bbox = Some(Rect::new((west, south), (east, north)));
        self
    }

    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameters.push(parameter.into());
        self
    }

    /// First dimension of the given kind, in advertised order.
    pub fn dimension(&self, kind: DimensionKind) -> Option<(&str, &Dimension)> {
        self.dimensions
            .iter()
            .find(|(name, _)| DimensionKind::of(name) == kind)
            .map(|(name, dim)| (name.as_str(), dim))
    }

    /// Style to request when a test does not care which one: the first advertised, or the
    /// empty string which WMS treats as the default style.
    pub fn default_style(&self) -> &str {
        self.styles.first().map(String::as_str).unwrap_or("")
    }

    /// Geographic extent, falling back to the whole globe.
    pub fn extent(&self) -> Rect<f64> {
        self.bbox
            .unwrap_or_else(|| Rect::new((-180.0, -90.0), (180.0, 90.0)))
    }

    pub fn center(&self) -> Coord<f64> {
        self.extent().center()
    }

    /// Small box around the centre, clamped to the advertised extent.
    pub fn sample_box(&self, half_size: f64) -> Rect<f64> {
        let extent = self.extent();
        let c = extent.center();
        let half_w = half_size.min(extent.width() / 2.0);
        let half_h = half_size.min(extent.height() / 2.0);
        Rect::new((c.x - half_w, c.y - half_h), (c.x + half_w, c.y + half_h))
    }
}
