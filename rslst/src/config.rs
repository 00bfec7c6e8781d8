use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::collect::global_variables::{
    get_temp_path, DATE_END, DATE_START, DEFAULT_OPACITY, DEFAULT_REGION, HIGHLIGHT_COLOR,
    INITIAL_CENTER, INITIAL_ZOOM, LEGEND_STEPS, MAX_CLOUD_COVER, MAX_PIXELS, RECENTER_POINT,
    RECENTER_ZOOM, REDRAW_ADJUSTMENT, STAC_COLLECTION, STAC_COLLECTION_CATEGORY, STAC_ENDPOINT,
    STAC_MAX_PAGES, STAC_PAGE_LIMIT, STAC_PLATFORM, STAC_THERMAL_ASSET, STATS_SCALE_M,
    THERMAL_BAND,
};
use crate::commons::DateWindow;
use crate::geo_core::{BoundingBox, Region};
use crate::map::display::{BaseMap, ControlVisibility};
use crate::thermal::legend::{default_palette, HexColor};
use crate::thermal::stats::ReduceParams;
use crate::thermal::temperature::{Calibration, PipelineSettings};

fn default_date(text: &str) -> NaiveDate {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap_or_default()
}

/// Map viewport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub initial_center: [f64; 2],
    pub initial_zoom: u8,
    pub recenter_point: [f64; 2],
    pub recenter_zoom: u8,
    pub base_map: BaseMap,
    pub controls: ControlVisibility,
}

impl Default for ViewConfig {
    fn default() -> Self {
        ViewConfig {
            initial_center: INITIAL_CENTER,
            initial_zoom: INITIAL_ZOOM,
            recenter_point: RECENTER_POINT,
            recenter_zoom: RECENTER_ZOOM,
            base_map: BaseMap::Roadmap,
            controls: ControlVisibility::default(),
        }
    }
}

/// STAC catalog client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StacConfig {
    pub endpoint: String,
    pub collection: String,
    /// `platform` property filter, e.g. LANDSAT_8
    pub platform: Option<String>,
    /// `landsat:collection_category` filter (T1, T2 or RT)
    pub collection_category: Option<String>,
    /// Band name -> STAC asset key
    pub band_assets: BTreeMap<String, String>,
    pub cache_dir: PathBuf,
    pub page_limit: usize,
    pub max_pages: usize,
    pub timeout_secs: u64,
}

impl Default for StacConfig {
    fn default() -> Self {
        let mut band_assets = BTreeMap::new();
        band_assets.insert(THERMAL_BAND.to_string(), STAC_THERMAL_ASSET.to_string());
        StacConfig {
            endpoint: STAC_ENDPOINT.to_string(),
            collection: STAC_COLLECTION.to_string(),
            platform: Some(STAC_PLATFORM.to_string()),
            collection_category: Some(STAC_COLLECTION_CATEGORY.to_string()),
            band_assets,
            cache_dir: get_temp_path(),
            page_limit: STAC_PAGE_LIMIT,
            max_pages: STAC_MAX_PAGES,
            timeout_secs: 120,
        }
    }
}

impl StacConfig {
    /// Asset key holding `band`; falls back to the band name itself
    pub fn asset_for<'a>(&'a self, band: &'a str) -> &'a str {
        self.band_assets
            .get(band)
            .map(|asset| asset.as_str())
            .unwrap_or(band)
    }
}

/// Runtime configuration. Every field defaults to the Hermosillo September 2020 setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LstConfig {
    /// [min_lon, min_lat, max_lon, max_lat]
    pub region: [f64; 4],
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    pub max_cloud_cover: f64,
    pub band: String,
    pub calibration: Calibration,
    pub redraw_adjustment: f64,
    pub stats_scale_m: f64,
    pub max_pixels: u64,
    pub palette: Vec<HexColor>,
    pub legend_steps: usize,
    pub highlight_color: HexColor,
    pub default_opacity: f64,
    pub view: ViewConfig,
    pub stac: StacConfig,
}

impl Default for LstConfig {
    fn default() -> Self {
        LstConfig {
            region: DEFAULT_REGION,
            date_start: default_date(DATE_START),
            date_end: default_date(DATE_END),
            max_cloud_cover: MAX_CLOUD_COVER,
            band: THERMAL_BAND.to_string(),
            calibration: Calibration::default(),
            redraw_adjustment: REDRAW_ADJUSTMENT,
            stats_scale_m: STATS_SCALE_M,
            max_pixels: MAX_PIXELS,
            palette: default_palette(),
            legend_steps: LEGEND_STEPS,
            highlight_color: HIGHLIGHT_COLOR.parse().unwrap_or(HexColor {
                r: 0x37,
                g: 0xFD,
                b: 0x12,
            }),
            default_opacity: DEFAULT_OPACITY,
            view: ViewConfig::default(),
            stac: StacConfig::default(),
        }
    }
}

impl LstConfig {
    /// Load and validate a TOML configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {:?}", path))?;
        let config: LstConfig =
            toml::from_str(&text).context(format!("Failed to parse config file: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn validate(&self) -> Result<()> {
        self.default_region().validate()?;
        self.date_window()?;
        if !(0.0..=100.0).contains(&self.max_cloud_cover) {
            bail!(
                "max_cloud_cover must be a percentage, got {}",
                self.max_cloud_cover
            );
        }
        if self.band.is_empty() {
            bail!("band must not be empty");
        }
        if !(self.stats_scale_m.is_finite() && self.stats_scale_m > 0.0) {
            bail!("stats_scale_m must be positive, got {}", self.stats_scale_m);
        }
        if self.max_pixels == 0 {
            bail!("max_pixels must be positive");
        }
        if self.palette.is_empty() {
            bail!("palette must have at least one color");
        }
        if self.legend_steps == 0 {
            bail!("legend_steps must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.default_opacity) {
            bail!(
                "default_opacity must be within [0, 1], got {}",
                self.default_opacity
            );
        }
        Ok(())
    }

    /// The fixed rectangle shown on load and restored by clear-all
    pub fn default_region(&self) -> Region {
        Region::Rectangle(BoundingBox::from_array(self.region))
    }

    pub fn date_window(&self) -> Result<DateWindow> {
        Ok(DateWindow::new(self.date_start, self.date_end)?)
    }

    pub fn reduce_params(&self) -> ReduceParams {
        ReduceParams {
            scale_m: self.stats_scale_m,
            max_pixels: self.max_pixels,
        }
    }

    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        Ok(PipelineSettings {
            window: self.date_window()?,
            max_cloud_cover: self.max_cloud_cover,
            band: self.band.clone(),
            calibration: self.calibration,
            redraw_adjustment: self.redraw_adjustment,
            reduce: self.reduce_params(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_hermosillo_setup() {
        let config = LstConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.region, [-110.9, 29.0, -110.7, 29.2]);
        assert_eq!(config.date_window().unwrap().label(), "September 2020");
        assert_eq!(config.palette.len(), 5);
        assert_eq!(config.highlight_color.to_string(), "#37FD12");
        assert_eq!(config.stac.asset_for("ST_B10"), "lwir11");
        assert_eq!(config.stac.asset_for("ST_QA"), "ST_QA");
        assert_eq!(config.pipeline_settings().unwrap(), PipelineSettings::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = LstConfig::default();
        let text = config.to_toml_string().unwrap();
        let parsed: LstConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r##"
max_cloud_cover = 20.0
date_start = "2021-06-01"
date_end = "2021-06-30"
palette = ["#000000", "#FFFFFF"]

[view]
recenter_zoom = 13

[stac]
platform = "LANDSAT_9"
"##
        )
        .unwrap();

        let config = LstConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_cloud_cover, 20.0);
        assert_eq!(config.date_window().unwrap().label(), "June 2021");
        assert_eq!(config.palette.len(), 2);
        assert_eq!(config.view.recenter_zoom, 13);
        assert_eq!(config.view.initial_zoom, 12);
        assert_eq!(config.stac.platform.as_deref(), Some("LANDSAT_9"));
        assert_eq!(config.stac.collection, "landsat-c2l2-st");
        assert_eq!(config.band, "ST_B10");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = LstConfig::default();
        config.date_end = NaiveDate::from_ymd_opt(2020, 8, 1).unwrap();
        assert!(config.validate().is_err());

        let mut config = LstConfig::default();
        config.region = [-110.7, 29.0, -110.9, 29.2];
        assert!(config.validate().is_err());

        let mut config = LstConfig::default();
        config.legend_steps = 0;
        assert!(config.validate().is_err());

        let mut config = LstConfig::default();
        config.default_opacity = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = LstConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
