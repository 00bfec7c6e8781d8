use anyhow::Context;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::collect::global_variables::{KELVIN_OFFSET, LANDSAT_FILL_VALUE, ST_OFFSET, ST_SCALE};
use crate::collect::imagery::{ImagerySource, SceneMeta, SceneQuery};
use crate::geo_core::BoundingBox;
use crate::thermal::raster::{GridSpec, Raster};

/// Digital numbers of one band as a function of (lon, lat)
pub type BandField = Arc<dyn Fn(f64, f64) -> f64 + Send + Sync>;

struct MemoryScene {
    meta: SceneMeta,
    bands: HashMap<String, BandField>,
}

/// In-memory imagery archive
///
/// Scenes are described by analytic fields instead of downloaded rasters. It keeps count of
/// the searches and band loads it serves, which lets callers check that an action did not
/// trigger a recomputation.
#[derive(Default)]
pub struct MemoryImagery {
    scenes: Vec<MemoryScene>,
    searches: AtomicUsize,
    loads: AtomicUsize,
}

impl fmt::Debug for MemoryImagery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryImagery")
            .field("scenes", &self.scenes.iter().map(|s| &s.meta.id).collect::<Vec<_>>())
            .field("searches", &self.search_count())
            .field("loads", &self.load_count())
            .finish()
    }
}

impl MemoryImagery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scene whose `band` is given by `field`
    pub fn with_scene(mut self, meta: SceneMeta, band: &str, field: BandField) -> Self {
        let mut bands = HashMap::new();
        bands.insert(band.to_string(), field);
        self.scenes.push(MemoryScene { meta, bands });
        self
    }

    /// Add a scene with a uniform digital number
    pub fn with_constant_scene(self, meta: SceneMeta, band: &str, dn: f64) -> Self {
        self.with_scene(meta, band, Arc::new(move |_, _| dn))
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Scene metadata with a footprint covering the whole Hermosillo area
    pub fn scene_meta(id: &str, acquired: NaiveDate, cloud_cover: f64) -> SceneMeta {
        SceneMeta {
            id: id.to_string(),
            acquired,
            cloud_cover,
            footprint: BoundingBox::new(-112.0, 28.0, -109.5, 30.2),
            epsg: Some(32612),
            platform: Some("LANDSAT_8".to_string()),
            assets: BTreeMap::new(),
        }
    }

    /// Synthetic September 2020 archive over Hermosillo: an urban heat island centred on the
    /// city plus a west-east gradient, three clear scenes (one with a missing strip), one cloudy
    /// scene and one scene outside the date window.
    pub fn hermosillo_demo(band: &str) -> Self {
        let heat_island = |amplitude: f64, background: f64| -> BandField {
            Arc::new(move |lon: f64, lat: f64| {
                let d2 = ((lon + 110.85) / 0.04).powi(2) + ((lat - 29.1) / 0.04).powi(2);
                let celsius = background + amplitude * (-d2).exp() + (lon + 110.9) * 20.0;
                celsius_to_dn(celsius)
            })
        };
        let striped = {
            let field = heat_island(7.0, 36.0);
            let f: BandField = Arc::new(move |lon: f64, lat: f64| {
                if lon < -110.88 {
                    LANDSAT_FILL_VALUE
                } else {
                    field(lon, lat)
                }
            });
            f
        };

        let day = |d: u32| NaiveDate::from_ymd_opt(2020, 9, d).unwrap_or_default();
        MemoryImagery::new()
            .with_scene(
                Self::scene_meta("LC08_L2SP_035040_20200905", day(5), 1.8),
                band,
                heat_island(8.0, 38.0),
            )
            .with_scene(
                Self::scene_meta("LC08_L2SP_035040_20200921", day(21), 4.6),
                band,
                striped,
            )
            .with_scene(
                Self::scene_meta("LC08_L2SP_036040_20200912", day(12), 0.4),
                band,
                heat_island(9.0, 37.0),
            )
            .with_scene(
                Self::scene_meta("LC08_L2SP_035039_20200913", day(13), 36.2),
                band,
                heat_island(2.0, 25.0),
            )
            .with_scene(
                Self::scene_meta(
                    "LC08_L2SP_035040_20201007",
                    NaiveDate::from_ymd_opt(2020, 10, 7).unwrap_or_default(),
                    0.0,
                ),
                band,
                heat_island(5.0, 30.0),
            )
    }
}

/// Inverse of the surface temperature rescaling, rounded to a whole digital number
pub fn celsius_to_dn(celsius: f64) -> f64 {
    ((celsius + KELVIN_OFFSET - ST_OFFSET) / ST_SCALE).round()
}

impl ImagerySource for MemoryImagery {
    fn search(&self, query: &SceneQuery) -> anyhow::Result<Vec<SceneMeta>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .scenes
            .iter()
            .filter(|s| query.matches(&s.meta) && s.bands.contains_key(&query.band))
            .map(|s| s.meta.clone())
            .collect())
    }

    fn load_band(&self, scene: &SceneMeta, band: &str, grid: &GridSpec) -> anyhow::Result<Raster> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let stored = self
            .scenes
            .iter()
            .find(|s| s.meta.id == scene.id)
            .with_context(|| format!("Unknown scene: {}", scene.id))?;
        let field = stored
            .bands
            .get(band)
            .with_context(|| format!("Scene {} has no band {}", scene.id, band))?;
        let footprint = stored.meta.footprint;

        Ok(Raster::from_fn(grid.clone(), band, |lon, lat| {
            if !footprint.contains(lon, lat) {
                return None;
            }
            let dn = field(lon, lat);
            if dn == LANDSAT_FILL_VALUE {
                None
            } else {
                Some(dn)
            }
        }))
    }
}
