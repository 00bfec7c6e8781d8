use std::path::PathBuf;

pub const TEMP_PATH: &str = "./temp";

pub fn get_temp_path() -> PathBuf {
    PathBuf::from(TEMP_PATH)
}

/// Area of interest over Hermosillo, Sonora: [min_lon, min_lat, max_lon, max_lat]
pub const DEFAULT_REGION: [f64; 4] = [-110.9, 29.0, -110.7, 29.2];

/// Map center and zoom applied once the first layer is displayed
pub const INITIAL_CENTER: [f64; 2] = [-110.972471, 29.092477];
pub const INITIAL_ZOOM: u8 = 12;

/// Target of the "center map" button
pub const RECENTER_POINT: [f64; 2] = [-110.9613, 29.0729];
pub const RECENTER_ZOOM: u8 = 15;

/// September 2020
pub const DATE_START: &str = "2020-09-01";
pub const DATE_END: &str = "2020-09-30";

/// Scenes must have strictly less cloud cover than this (percent)
pub const MAX_CLOUD_COVER: f64 = 10.0;

/// Landsat Collection 2 Level-2 surface temperature band
pub const THERMAL_BAND: &str = "ST_B10";

/// Landsat C2 L2 surface temperature rescaling: K = DN * scale + offset
pub const ST_SCALE: f64 = 0.00341802;
pub const ST_OFFSET: f64 = 149.0;
pub const KELVIN_OFFSET: f64 = 273.15;

/// Flat reduction applied on the redraw path (°C)
pub const REDRAW_ADJUSTMENT: f64 = 10.0;

/// Statistics resolution (metres) and pixel budget
pub const STATS_SCALE_M: f64 = 30.0;
pub const MAX_PIXELS: u64 = 1_000_000_000;

/// Sensor fill value of the Level-2 products
pub const LANDSAT_FILL_VALUE: f64 = 0.0;

pub const PALETTE: [&str; 5] = ["#FFFF00", "#FFC000", "#FF7401", "#C00000", "#540000"];
pub const LEGEND_STEPS: usize = 10;

/// Color given to polygons as soon as they are drawn
pub const HIGHLIGHT_COLOR: &str = "#37FD12";

pub const DEFAULT_OPACITY: f64 = 0.5;
pub const OPACITY_STEP: f64 = 0.01;

pub const LAYER_NAME_INITIAL: &str = "Surface temperature (°C)";
pub const LAYER_NAME_REDRAW: &str = "Reduced temperature (°C)";

/// USGS LandsatLook STAC server
pub const STAC_ENDPOINT: &str = "https://landsatlook.usgs.gov/stac-server";
pub const STAC_COLLECTION: &str = "landsat-c2l2-st";
pub const STAC_PLATFORM: &str = "LANDSAT_8";
/// Tier 1 scenes only; the collection also serves Tier 2
pub const STAC_COLLECTION_CATEGORY: &str = "T1";
/// Asset holding ST_B10 in the STAC item
pub const STAC_THERMAL_ASSET: &str = "lwir11";
pub const STAC_PAGE_LIMIT: usize = 100;
pub const STAC_MAX_PAGES: usize = 10;
