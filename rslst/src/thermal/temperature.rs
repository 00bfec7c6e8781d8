use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::collect::global_variables::{
    KELVIN_OFFSET, LAYER_NAME_INITIAL, LAYER_NAME_REDRAW, MAX_CLOUD_COVER, MAX_PIXELS,
    REDRAW_ADJUSTMENT, STATS_SCALE_M, ST_OFFSET, ST_SCALE, THERMAL_BAND,
};
use crate::collect::imagery::{ImagerySource, SceneQuery};
use crate::commons::DateWindow;
use crate::error::LstError;
use crate::geo_core::Region;
use crate::thermal::raster::{GridSpec, MeanAccumulator, Raster};
use crate::thermal::stats::{reduce_min_max, ReduceParams, RegionStats};

/// Linear rescaling of surface temperature digital numbers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub scale: f64,
    pub offset: f64,
    pub kelvin_offset: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration {
            scale: ST_SCALE,
            offset: ST_OFFSET,
            kelvin_offset: KELVIN_OFFSET,
        }
    }
}

impl Calibration {
    pub fn to_kelvin(&self, dn: f64) -> f64 {
        dn * self.scale + self.offset
    }

    pub fn to_celsius(&self, dn: f64) -> f64 {
        self.to_kelvin(dn) - self.kelvin_offset
    }

    /// Displayed value: °C minus the path adjustment
    pub fn display_value(&self, dn: f64, adjustment: f64) -> f64 {
        self.to_celsius(dn) - adjustment
    }
}

/// Which recomputation path produced a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineVariant {
    /// First load over the fixed region
    Initial,
    /// Recompute over a drawn region (or the fixed one after clearing), with the flat reduction
    Redraw,
}

impl PipelineVariant {
    pub fn adjustment(&self, redraw_adjustment: f64) -> f64 {
        match self {
            PipelineVariant::Initial => 0.0,
            PipelineVariant::Redraw => redraw_adjustment,
        }
    }

    pub fn layer_name(&self) -> &'static str {
        match self {
            PipelineVariant::Initial => LAYER_NAME_INITIAL,
            PipelineVariant::Redraw => LAYER_NAME_REDRAW,
        }
    }
}

/// Everything the pipeline needs besides the region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub window: DateWindow,
    pub max_cloud_cover: f64,
    pub band: String,
    pub calibration: Calibration,
    pub redraw_adjustment: f64,
    pub reduce: ReduceParams,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            window: DateWindow::month(2020, 9).unwrap_or(DateWindow {
                start: chrono::NaiveDate::MIN,
                end: chrono::NaiveDate::MAX,
            }),
            max_cloud_cover: MAX_CLOUD_COVER,
            band: THERMAL_BAND.to_string(),
            calibration: Calibration::default(),
            redraw_adjustment: REDRAW_ADJUSTMENT,
            reduce: ReduceParams {
                scale_m: STATS_SCALE_M,
                max_pixels: MAX_PIXELS,
            },
        }
    }
}

/// Deferred description of one temperature computation.
///
/// Building a plan touches no data; [`TemperaturePlan::evaluate`] runs it against an
/// imagery source.
#[derive(Debug, Clone, PartialEq)]
pub struct TemperaturePlan {
    region: Region,
    settings: PipelineSettings,
    variant: PipelineVariant,
}

/// Materialized output of a [`TemperaturePlan`]
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureResult {
    pub region: Region,
    pub variant: PipelineVariant,
    /// Display-scale temperature, clipped to the region
    pub raster: Raster,
    pub stats: RegionStats,
    pub scene_ids: Vec<String>,
}

impl TemperatureResult {
    pub fn min(&self) -> Result<f64, LstError> {
        self.stats.min(self.raster.band())
    }

    pub fn max(&self) -> Result<f64, LstError> {
        self.stats.max(self.raster.band())
    }
}

impl TemperaturePlan {
    pub fn new(region: Region, settings: PipelineSettings, variant: PipelineVariant) -> Self {
        TemperaturePlan {
            region,
            settings,
            variant,
        }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn variant(&self) -> PipelineVariant {
        self.variant
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn adjustment(&self) -> f64 {
        self.variant.adjustment(self.settings.redraw_adjustment)
    }

    /// Archive filter for this plan
    pub fn query(&self) -> Result<SceneQuery, LstError> {
        Ok(SceneQuery {
            bounds: self.region.bounds()?,
            window: self.settings.window,
            max_cloud_cover: self.settings.max_cloud_cover,
            band: self.settings.band.clone(),
        })
    }

    /// Output grid: the region's bounding box at the statistics scale
    pub fn grid(&self) -> Result<GridSpec, LstError> {
        GridSpec::for_bounds(self.region.bounds()?, self.settings.reduce.scale_m)
    }

    /// Run the plan: filter, select the band, average, calibrate, adjust and reduce
    pub fn evaluate<S: ImagerySource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<TemperatureResult, LstError> {
        self.region.validate()?;
        let grid = self.grid()?;
        let pixels = grid.len() as u64;
        if pixels > self.settings.reduce.max_pixels {
            return Err(LstError::PixelBudgetExceeded {
                pixels,
                max_pixels: self.settings.reduce.max_pixels,
            });
        }

        let query = self.query()?;
        debug!("Scene query: {:?}", query);
        let scenes: Vec<_> = source
            .search(&query)?
            .into_iter()
            .filter(|scene| query.matches(scene))
            .collect();
        if scenes.is_empty() {
            return Err(LstError::EmptyCollection {
                start: self.settings.window.start.to_string(),
                end: self.settings.window.end.to_string(),
                max_cloud_cover: self.settings.max_cloud_cover,
            });
        }
        info!(
            "{} scenes selected for {} ({}x{} grid at {} m)",
            scenes.len(),
            self.settings.window.label(),
            grid.width,
            grid.height,
            grid.scale_m
        );

        // One scene band in memory at a time
        let mut mean = MeanAccumulator::new(grid.clone(), &self.settings.band);
        for scene in &scenes {
            let band = source.load_band(scene, &self.settings.band, &grid)?;
            mean.add(&band)?;
        }
        let mean = mean.finish()?;

        let calibration = self.settings.calibration;
        let adjustment = self.adjustment();
        let temperature = mean
            .map(|dn| calibration.display_value(dn, adjustment))
            .clip(&self.region);

        let stats = reduce_min_max(&temperature, &self.region, &self.settings.reduce)?;
        info!("Temperature statistics (°C): {}", stats.to_json());

        Ok(TemperatureResult {
            region: self.region.clone(),
            variant: self.variant,
            raster: temperature,
            stats,
            scene_ids: scenes.into_iter().map(|scene| scene.id).collect(),
        })
    }
}
