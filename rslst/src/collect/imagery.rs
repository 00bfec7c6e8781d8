use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::commons::DateWindow;
use crate::geo_core::BoundingBox;
use crate::thermal::raster::{GridSpec, Raster};

/// Metadata of one scene of the archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMeta {
    pub id: String,
    pub acquired: NaiveDate,
    /// Percent of the scene obstructed by clouds
    pub cloud_cover: f64,
    /// Footprint in EPSG:4326
    pub footprint: BoundingBox,
    /// CRS of the scene rasters
    pub epsg: Option<i32>,
    pub platform: Option<String>,
    /// Asset key -> href
    pub assets: BTreeMap<String, String>,
}

/// Filter applied to the archive: date window, spatial overlap and cloud cover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneQuery {
    pub bounds: BoundingBox,
    pub window: DateWindow,
    pub max_cloud_cover: f64,
    pub band: String,
}

impl SceneQuery {
    /// Whether a scene passes every filter of the query
    pub fn matches(&self, scene: &SceneMeta) -> bool {
        self.window.contains(scene.acquired)
            && scene.footprint.intersects(&self.bounds)
            && scene.cloud_cover < self.max_cloud_cover
    }
}

/// Remote (or synthetic) imagery archive
///
/// `search` returns the candidate scenes; `load_band` resamples one band of a scene onto the
/// requested lon/lat grid by nearest neighbour, with fill values reported as nodata.
pub trait ImagerySource: Send + Sync {
    fn search(&self, query: &SceneQuery) -> anyhow::Result<Vec<SceneMeta>>;

    fn load_band(&self, scene: &SceneMeta, band: &str, grid: &GridSpec) -> anyhow::Result<Raster>;
}

impl<T: ImagerySource + ?Sized> ImagerySource for std::sync::Arc<T> {
    fn search(&self, query: &SceneQuery) -> anyhow::Result<Vec<SceneMeta>> {
        (**self).search(query)
    }

    fn load_band(&self, scene: &SceneMeta, band: &str, grid: &GridSpec) -> anyhow::Result<Raster> {
        (**self).load_band(scene, band, grid)
    }
}
