use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::LstError;
use crate::geo_core::Region;
use crate::thermal::raster::Raster;

/// Resolution and pixel budget of a region reduction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReduceParams {
    /// Metres per pixel
    pub scale_m: f64,
    pub max_pixels: u64,
}

/// Dictionary of reduced statistics keyed `<band>_min` / `<band>_max`.
/// A `null` value means no valid pixel fell inside the region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionStats(BTreeMap<String, Option<f64>>);

pub fn min_key(band: &str) -> String {
    format!("{}_min", band)
}

pub fn max_key(band: &str) -> String {
    format!("{}_max", band)
}

impl RegionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a statistics dictionary produced by a remote engine
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).map_err(|e| anyhow::anyhow!("Invalid statistics JSON: {}", e))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn insert(&mut self, key: &str, value: Option<f64>) {
        self.0.insert(key.to_string(), value);
    }

    /// Value of `key`; missing keys and nulls are both errors
    pub fn get(&self, key: &str) -> Result<f64, LstError> {
        match self.0.get(key) {
            Some(Some(value)) if value.is_finite() => Ok(*value),
            _ => Err(LstError::MissingStatistic {
                key: key.to_string(),
            }),
        }
    }

    pub fn min(&self, band: &str) -> Result<f64, LstError> {
        self.get(&min_key(band))
    }

    pub fn max(&self, band: &str) -> Result<f64, LstError> {
        self.get(&max_key(band))
    }

    /// (min, max) of `band`
    pub fn range(&self, band: &str) -> Result<(f64, f64), LstError> {
        Ok((self.min(band)?, self.max(band)?))
    }
}

/// Min/max of `raster` over the pixels whose centers fall inside `region`
pub fn reduce_min_max(
    raster: &Raster,
    region: &Region,
    params: &ReduceParams,
) -> Result<RegionStats, LstError> {
    let grid = raster.grid();
    let mut inside: u64 = 0;
    let mut min: Option<f64> = None;
    let mut max: Option<f64> = None;

    for (i, value) in raster.values().iter().enumerate() {
        let (lon, lat) = grid.index_center(i);
        if !region.contains(lon, lat) {
            continue;
        }
        inside += 1;
        if let Some(v) = value {
            min = Some(min.map_or(*v, |m| m.min(*v)));
            max = Some(max.map_or(*v, |m| m.max(*v)));
        }
    }

    if inside > params.max_pixels {
        return Err(LstError::PixelBudgetExceeded {
            pixels: inside,
            max_pixels: params.max_pixels,
        });
    }

    let mut stats = RegionStats::new();
    stats.insert(&min_key(raster.band()), min);
    stats.insert(&max_key(raster.band()), max);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_core::BoundingBox;
    use crate::thermal::raster::GridSpec;

    fn raster() -> Raster {
        let grid = GridSpec {
            bounds: BoundingBox::new(0.0, 0.0, 4.0, 1.0),
            width: 4,
            height: 1,
            scale_m: 1.0,
        };
        Raster::new(grid, "ST_B10", vec![Some(30.0), None, Some(42.5), Some(35.0)]).unwrap()
    }

    fn params() -> ReduceParams {
        ReduceParams {
            scale_m: 1.0,
            max_pixels: 1_000,
        }
    }

    #[test]
    fn test_reduce_min_max() {
        let region = Region::Rectangle(BoundingBox::new(0.0, 0.0, 4.0, 1.0));
        let stats = reduce_min_max(&raster(), &region, &params()).unwrap();
        assert_eq!(stats.range("ST_B10").unwrap(), (30.0, 42.5));
        assert_eq!(stats.to_json(), r#"{"ST_B10_max":42.5,"ST_B10_min":30.0}"#);
    }

    #[test]
    fn test_reduce_respects_region() {
        let region = Region::Rectangle(BoundingBox::new(2.0, 0.0, 4.0, 1.0));
        let stats = reduce_min_max(&raster(), &region, &params()).unwrap();
        assert_eq!(stats.range("ST_B10").unwrap(), (35.0, 42.5));
    }

    #[test]
    fn test_empty_region_gives_null_statistics() {
        let region = Region::Rectangle(BoundingBox::new(1.0, 0.0, 2.0, 1.0));
        let stats = reduce_min_max(&raster(), &region, &params()).unwrap();
        assert!(matches!(
            stats.min("ST_B10"),
            Err(LstError::MissingStatistic { key }) if key == "ST_B10_min"
        ));
    }

    #[test]
    fn test_pixel_budget() {
        let region = Region::Rectangle(BoundingBox::new(0.0, 0.0, 4.0, 1.0));
        let tight = ReduceParams {
            scale_m: 1.0,
            max_pixels: 3,
        };
        assert!(matches!(
            reduce_min_max(&raster(), &region, &tight),
            Err(LstError::PixelBudgetExceeded { pixels: 4, max_pixels: 3 })
        ));
    }

    #[test]
    fn test_stats_json_with_missing_key() {
        let stats = RegionStats::from_json(r#"{"ST_B10_min": 28.4, "ST_B10_max": null}"#).unwrap();
        assert_eq!(stats.min("ST_B10").unwrap(), 28.4);
        assert!(stats.max("ST_B10").is_err());
        assert!(stats.min("ST_B11").is_err());
        assert!(RegionStats::from_json("[1, 2]").is_err());
    }
}
