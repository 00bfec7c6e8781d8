#[cfg(feature = "proj")]
use anyhow::Context;
use geo::{BoundingRect, Centroid, Coord, Intersects, Point, Polygon, Rect};
use serde::{Deserialize, Serialize};

use crate::commons::basic_functions::{deg_to_m_lat, deg_to_m_lon};
use crate::error::LstError;

/// EPSG code of geographic lon/lat coordinates (WGS 84)
pub const WGS84_EPSG: i32 = 4326;

/// Base struct for CRS handling
/// Every region handled by the crate is expressed in EPSG:4326; scenes carry their own CRS
/// (usually a UTM zone) and GeoCore bridges the two.
#[derive(Debug, Clone)]
pub struct GeoCore {
    /// EPSG code
    pub epsg: i32,
}

impl GeoCore {
    /// Create a new GeoCore with EPSG
    pub fn new(epsg: i32) -> Self {
        GeoCore { epsg }
    }

    /// Set EPSG code
    pub fn set_epsg(&mut self, epsg: i32) {
        self.epsg = epsg;
    }

    /// Whether this CRS is plain lon/lat, needing no projection
    pub fn is_wgs84(&self) -> bool {
        self.epsg == WGS84_EPSG
    }

    /// Get a Proj instance converting lon/lat (EPSG:4326) into this CRS
    #[cfg(feature = "proj")]
    pub fn from_wgs84(&self) -> anyhow::Result<proj::Proj> {
        let from_crs = format!("EPSG:{}", WGS84_EPSG);
        let to_crs = format!("EPSG:{}", self.epsg);
        proj::Proj::new_known_crs(&from_crs, &to_crs, None)
            .with_context(|| format!("Failed to create Proj from {} to {}", from_crs, to_crs))
    }
}

impl Default for GeoCore {
    fn default() -> Self {
        GeoCore::new(WGS84_EPSG)
    }
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64, // min longitude
    pub min_y: f64, // min latitude
    pub max_x: f64, // max longitude
    pub max_y: f64, // max latitude
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Build from `[min_x, min_y, max_x, max_y]`
    pub fn from_array(coords: [f64; 4]) -> Self {
        BoundingBox::new(coords[0], coords[1], coords[2], coords[3])
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    /// Check that the box is finite and non-degenerate
    pub fn validate(&self) -> Result<(), LstError> {
        let finite = self.to_array().iter().all(|v| v.is_finite());
        if !finite || self.min_x >= self.max_x || self.min_y >= self.max_y {
            return Err(LstError::InvalidRegion(format!(
                "bounding box must satisfy min < max, got {:?}",
                self.to_array()
            )));
        }
        Ok(())
    }

    /// Closed containment test
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Approximate east-west extent in metres
    pub fn width_m(&self) -> f64 {
        let (_, lat_center) = self.center();
        (self.max_x - self.min_x) * deg_to_m_lon(lat_center)
    }

    /// Approximate north-south extent in metres
    pub fn height_m(&self) -> f64 {
        (self.max_y - self.min_y) * deg_to_m_lat()
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        Rect::new(
            geo::coord! { x: self.min_x, y: self.min_y },
            geo::coord! { x: self.max_x, y: self.max_y },
        )
        .to_polygon()
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

/// Region of interest: the fixed rectangle, or a polygon drawn by the user.
/// Coordinates are lon/lat (EPSG:4326).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Region {
    Rectangle(BoundingBox),
    Drawn(Polygon<f64>),
}

impl Region {
    /// Build a drawn region, rejecting degenerate polygons
    pub fn drawn(polygon: Polygon<f64>) -> Result<Self, LstError> {
        let region = Region::Drawn(polygon);
        region.validate()?;
        Ok(region)
    }

    pub fn validate(&self) -> Result<(), LstError> {
        match self {
            Region::Rectangle(bbox) => bbox.validate(),
            Region::Drawn(polygon) => {
                let exterior: Vec<Coord<f64>> = polygon.exterior().coords().copied().collect();
                if exterior.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
                    return Err(LstError::InvalidRegion(
                        "polygon has non-finite coordinates".to_string(),
                    ));
                }
                // A closed ring repeats its first vertex
                if exterior.len() < 4 {
                    return Err(LstError::InvalidRegion(format!(
                        "polygon needs at least 3 vertices, got {}",
                        exterior.len().saturating_sub(1)
                    )));
                }
                self.bounds()?.validate()
            }
        }
    }

    pub fn bounds(&self) -> Result<BoundingBox, LstError> {
        match self {
            Region::Rectangle(bbox) => Ok(*bbox),
            Region::Drawn(polygon) => polygon
                .bounding_rect()
                .map(BoundingBox::from)
                .ok_or_else(|| LstError::InvalidRegion("polygon has no vertices".to_string())),
        }
    }

    pub fn polygon(&self) -> Polygon<f64> {
        match self {
            Region::Rectangle(bbox) => bbox.to_polygon(),
            Region::Drawn(polygon) => polygon.clone(),
        }
    }

    /// Whether a lon/lat point (typically a pixel center) falls inside the region
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        match self {
            Region::Rectangle(bbox) => bbox.contains(lon, lat),
            Region::Drawn(polygon) => polygon.intersects(&Point::new(lon, lat)),
        }
    }

    pub fn centroid(&self) -> Option<Point<f64>> {
        match self {
            Region::Rectangle(bbox) => {
                let (x, y) = bbox.center();
                Some(Point::new(x, y))
            }
            Region::Drawn(polygon) => polygon.centroid(),
        }
    }

    pub fn is_drawn(&self) -> bool {
        matches!(self, Region::Drawn(_))
    }

    pub fn to_geojson(&self) -> geojson::Geometry {
        geojson::Geometry::new(geojson::Value::from(&self.polygon()))
    }
}
