use geo::Polygon;
use geojson::GeoJson;
use serde::{Deserialize, Serialize};

use crate::error::LstError;
use crate::geo_core::Region;
use crate::thermal::legend::HexColor;

/// Shapes the drawing tool can be constrained to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Polygon,
}

/// A completed user drawing
#[derive(Debug, Clone, PartialEq)]
pub struct DrawnShape {
    pub geometry: Polygon<f64>,
    pub color: HexColor,
}

impl DrawnShape {
    pub fn to_region(&self) -> Result<Region, LstError> {
        Region::drawn(self.geometry.clone())
    }
}

/// Interactive drawing tool state: visibility, shape mode and the drawn shapes
#[derive(Debug, Clone)]
pub struct DrawingTool {
    shown: bool,
    shape: Option<ShapeKind>,
    listening: bool,
    layers: Vec<DrawnShape>,
    highlight: HexColor,
}

impl DrawingTool {
    /// Hidden tool; completed shapes will be colored with `highlight`
    pub fn new(highlight: HexColor) -> Self {
        DrawingTool {
            shown: false,
            shape: None,
            listening: false,
            layers: Vec::new(),
            highlight,
        }
    }

    pub fn set_shown(&mut self, shown: bool) {
        self.shown = shown;
        if !shown {
            self.listening = false;
        }
    }

    pub fn is_shown(&self) -> bool {
        self.shown
    }

    pub fn set_shape(&mut self, shape: Option<ShapeKind>) {
        self.shape = shape;
        if shape.is_none() {
            self.listening = false;
        }
    }

    pub fn shape(&self) -> Option<ShapeKind> {
        self.shape
    }

    /// Start listening for draw-completion events
    pub fn draw(&mut self) -> Result<(), LstError> {
        if !self.shown || self.shape.is_none() {
            return Err(LstError::DrawingInactive);
        }
        self.listening = true;
        Ok(())
    }

    pub fn is_drawing(&self) -> bool {
        self.shown && self.shape.is_some() && self.listening
    }

    /// Draw-completion event: store the polygon with the highlight color
    pub fn complete_shape(&mut self, geometry: Polygon<f64>) -> Result<usize, LstError> {
        if !self.is_drawing() {
            return Err(LstError::DrawingInactive);
        }
        Region::drawn(geometry.clone())?;
        self.layers.push(DrawnShape {
            geometry,
            color: self.highlight,
        });
        Ok(self.layers.len() - 1)
    }

    /// Draw-completion event carrying GeoJSON
    pub fn complete_geojson(&mut self, geojson: &str) -> Result<usize, LstError> {
        let polygon = polygon_from_geojson(geojson)?;
        self.complete_shape(polygon)
    }

    pub fn layers(&self) -> &[DrawnShape] {
        &self.layers
    }

    /// Geometry of the first drawn shape. Later shapes are not considered.
    pub fn first_geometry(&self) -> Option<&Polygon<f64>> {
        self.layers.first().map(|shape| &shape.geometry)
    }

    /// Hide the tool and leave drawing mode, keeping the shapes
    pub fn stop(&mut self) {
        self.set_shape(None);
        self.set_shown(false);
    }

    /// Remove every drawn shape, returning how many were removed
    pub fn clear(&mut self) -> usize {
        let removed = self.layers.len();
        self.layers.clear();
        removed
    }
}

/// Extract a polygon from GeoJSON text: a Polygon, the first polygon of a MultiPolygon, or the
/// first such geometry of a Feature / FeatureCollection
pub fn polygon_from_geojson(text: &str) -> Result<Polygon<f64>, LstError> {
    let geojson: GeoJson = text
        .parse()
        .map_err(|e| LstError::InvalidRegion(format!("invalid GeoJSON: {}", e)))?;

    let geometry = match geojson {
        GeoJson::Geometry(geometry) => Some(geometry),
        GeoJson::Feature(feature) => feature.geometry,
        GeoJson::FeatureCollection(fc) => fc.features.into_iter().find_map(|f| f.geometry),
    }
    .ok_or_else(|| LstError::InvalidRegion("GeoJSON carries no geometry".to_string()))?;

    let geo_geom = geo::Geometry::<f64>::try_from(geometry.value)
        .map_err(|e| LstError::InvalidRegion(format!("unsupported geometry: {}", e)))?;

    match geo_geom {
        geo::Geometry::Polygon(p) => Ok(p),
        geo::Geometry::MultiPolygon(mp) => mp
            .0
            .into_iter()
            .next()
            .ok_or_else(|| LstError::InvalidRegion("empty MultiPolygon".to_string())),
        geo::Geometry::Rect(r) => Ok(r.to_polygon()),
        _ => Err(LstError::InvalidRegion(
            "only polygons can be drawn".to_string(),
        )),
    }
}
