use serde::Serialize;
use wasm_bindgen::prelude::*;

use rslst::commons::basic_functions::format_celsius;
use rslst::commons::DateWindow;
use rslst::map::controller::{ActiveView, PendingRequest};
use rslst::map::{DrawingTool, OpacitySlider, RedrawController, RedrawState};
use rslst::thermal::{Legend, PipelineVariant, RegionStats};
use rslst::{LstConfig, LstError};

/// Initialize the WASM module with panic hook
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

fn js_error<E: std::fmt::Display>(err: E) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Largest integer a JS number holds exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Request generations cross the boundary as plain JS numbers, the way `ComputeRequest` is
/// serialized
fn generation_from_js(value: f64) -> Result<u64, String> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= MAX_SAFE_INTEGER {
        Ok(value as u64)
    } else {
        Err(format!("request generation must be a whole number, got {}", value))
    }
}

/// Everything the host needs to run one temperature computation
#[derive(Debug, Clone, Serialize)]
pub struct ComputeRequest {
    pub generation: u64,
    pub region: geojson::Geometry,
    pub variant: PipelineVariant,
    pub layer_name: String,
    pub band: String,
    pub window: DateWindow,
    pub max_cloud_cover: f64,
    pub scale_m: f64,
    pub max_pixels: u64,
    /// Linear rescale to apply to the band: value * scale + offset
    pub scale: f64,
    pub offset: f64,
}

/// What the host should display after a resolution
#[derive(Debug, Clone, Serialize)]
pub struct ViewUpdate {
    pub generation: u64,
    pub layer: u32,
    pub layer_name: String,
    pub legend: Legend,
    pub stats: RegionStats,
    pub opacity: f64,
}

/// Redraw cycle driven from JS. The host evaluates the temperature statistics and renders
/// the layers; this side sequences requests, holds the drawn shapes and builds the legend.
pub struct RedrawSession {
    config: LstConfig,
    drawing: DrawingTool,
    controller: RedrawController<u32>,
    slider: OpacitySlider,
}

impl RedrawSession {
    pub fn new(config: LstConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let controller = RedrawController::new(
            config.default_region(),
            &config.band,
            config.palette.clone(),
            config.legend_steps,
        );
        let slider = OpacitySlider::new(config.default_opacity)?;
        let drawing = DrawingTool::new(config.highlight_color);
        Ok(RedrawSession {
            config,
            drawing,
            controller,
            slider,
        })
    }

    pub fn from_json(config_json: Option<&str>) -> anyhow::Result<Self> {
        let config = match config_json {
            Some(json) => serde_json::from_str(json)?,
            None => LstConfig::default(),
        };
        Self::new(config)
    }

    fn describe(&self, request: PendingRequest) -> ComputeRequest {
        let calibration = self.config.calibration;
        // Celsius on the redraw path: dn * scale + offset - 273.15 - adjustment
        let adjustment = request.variant.adjustment(self.config.redraw_adjustment);
        ComputeRequest {
            generation: request.generation,
            region: request.region.to_geojson(),
            variant: request.variant,
            layer_name: request.variant.layer_name().to_string(),
            band: self.config.band.clone(),
            window: DateWindow {
                start: self.config.date_start,
                end: self.config.date_end,
            },
            max_cloud_cover: self.config.max_cloud_cover,
            scale_m: self.config.stats_scale_m,
            max_pixels: self.config.max_pixels,
            scale: calibration.scale,
            offset: calibration.offset - calibration.kelvin_offset - adjustment,
        }
    }

    pub fn initial_request(&mut self) -> ComputeRequest {
        let request = self.controller.request_initial();
        self.describe(request)
    }

    pub fn start_drawing(&mut self) -> Result<(), LstError> {
        self.drawing.set_shown(true);
        self.drawing.set_shape(Some(rslst::map::ShapeKind::Polygon));
        self.drawing.draw()?;
        self.controller.start_drawing();
        Ok(())
    }

    pub fn on_draw(&mut self, geojson: &str) -> Result<usize, LstError> {
        self.drawing.complete_geojson(geojson)
    }

    pub fn finalize(&mut self) -> Result<ComputeRequest, LstError> {
        let geometry = self
            .drawing
            .first_geometry()
            .cloned()
            .ok_or(LstError::NoDrawnShape)?;
        let region = rslst::Region::drawn(geometry)?;
        self.drawing.stop();
        let request = self.controller.request_redraw(region)?;
        Ok(self.describe(request))
    }

    pub fn clear_all(&mut self) -> ComputeRequest {
        self.drawing.clear();
        self.drawing.stop();
        let request = self.controller.request_clear();
        self.describe(request)
    }

    pub fn resolve(
        &mut self,
        generation: u64,
        stats_json: &str,
        layer: u32,
    ) -> Result<ViewUpdate, LstError> {
        let outcome = RegionStats::from_json(stats_json)
            .map(|stats| (stats, layer))
            .map_err(LstError::from);
        let opacity = self.slider.value();
        let view: &ActiveView<u32> = self.controller.resolve(generation, outcome)?;
        Ok(ViewUpdate {
            generation: view.generation,
            layer: view.layer,
            layer_name: view.legend.title.clone(),
            legend: view.legend.clone(),
            stats: view.stats.clone(),
            opacity,
        })
    }

    /// Snapped slider value to apply to the current layer
    pub fn set_opacity(&mut self, value: f64) -> Result<f64, LstError> {
        self.slider.set(value)
    }

    pub fn active_region_geojson(&self) -> String {
        self.controller.active_region().to_geojson().to_string()
    }

    pub fn state(&self) -> RedrawState {
        self.controller.state()
    }

    pub fn drawn_count(&self) -> usize {
        self.drawing.layers().len()
    }
}

/// Redraw session wrapper for WASM
#[wasm_bindgen]
pub struct WasmRedrawSession {
    inner: RedrawSession,
}

#[wasm_bindgen]
impl WasmRedrawSession {
    /// Create a session from an optional JSON configuration
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<WasmRedrawSession, JsValue> {
        RedrawSession::from_json(config_json.as_deref())
            .map(|inner| WasmRedrawSession { inner })
            .map_err(js_error)
    }

    /// Request for the first load over the fixed region
    #[wasm_bindgen]
    pub fn initial_request(&mut self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.inner.initial_request()).map_err(js_error)
    }

    #[wasm_bindgen]
    pub fn start_drawing(&mut self) -> Result<(), JsValue> {
        self.inner.start_drawing().map_err(js_error)
    }

    /// Draw-completion event with the drawn GeoJSON; returns the shape index
    #[wasm_bindgen]
    pub fn on_draw(&mut self, geojson: &str) -> Result<usize, JsValue> {
        self.inner.on_draw(geojson).map_err(js_error)
    }

    #[wasm_bindgen]
    pub fn finalize(&mut self) -> Result<JsValue, JsValue> {
        let request = self.inner.finalize().map_err(js_error)?;
        serde_wasm_bindgen::to_value(&request).map_err(js_error)
    }

    #[wasm_bindgen]
    pub fn clear_all(&mut self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.inner.clear_all()).map_err(js_error)
    }

    /// Hand back the statistics of request `generation` together with the host's layer handle
    #[wasm_bindgen]
    pub fn resolve(
        &mut self,
        generation: f64,
        stats_json: &str,
        layer: u32,
    ) -> Result<JsValue, JsValue> {
        let generation = generation_from_js(generation).map_err(js_error)?;
        let update = self
            .inner
            .resolve(generation, stats_json, layer)
            .map_err(js_error)?;
        serde_wasm_bindgen::to_value(&update).map_err(js_error)
    }

    #[wasm_bindgen]
    pub fn set_opacity(&mut self, value: f64) -> Result<f64, JsValue> {
        self.inner.set_opacity(value).map_err(js_error)
    }

    #[wasm_bindgen]
    pub fn active_region_geojson(&self) -> String {
        self.inner.active_region_geojson()
    }

    #[wasm_bindgen]
    pub fn state(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.inner.state()).map_err(js_error)
    }
}

/// Legend for a temperature range with the default palette
#[wasm_bindgen]
pub fn build_legend(title: &str, min: f64, max: f64, steps: usize) -> Result<JsValue, JsValue> {
    let legend = Legend::build(title, min, max, &LstConfig::default().palette, steps)
        .map_err(js_error)?;
    serde_wasm_bindgen::to_value(&legend).map_err(js_error)
}

/// Display temperature (°C) of a surface temperature digital number
#[wasm_bindgen]
pub fn celsius_from_dn(dn: f64, redraw: bool) -> f64 {
    let config = LstConfig::default();
    let variant = if redraw {
        PipelineVariant::Redraw
    } else {
        PipelineVariant::Initial
    };
    config
        .calibration
        .display_value(dn, variant.adjustment(config.redraw_adjustment))
}

#[wasm_bindgen]
pub fn format_temperature(value: f64) -> String {
    format_celsius(value)
}

/// Wait for a statistics promise from the host and return it as JSON, ready for `resolve`
#[wasm_bindgen]
pub async fn await_statistics(promise: js_sys::Promise) -> Result<String, JsValue> {
    let value = wasm_bindgen_futures::JsFuture::from(promise).await?;
    let json = js_sys::JSON::stringify(&value)?;
    json.as_string()
        .ok_or_else(|| JsValue::from_str("Statistics are not serializable"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRAWN: &str = r#"{"type":"Polygon","coordinates":[[[-110.87,29.08],[-110.82,29.08],[-110.82,29.13],[-110.87,29.08]]]}"#;

    fn session() -> RedrawSession {
        RedrawSession::from_json(None).unwrap()
    }

    #[test]
    fn test_initial_request() {
        let mut session = session();
        let request = session.initial_request();
        assert_eq!(request.generation, 1);
        assert_eq!(request.variant, PipelineVariant::Initial);
        assert_eq!(request.layer_name, "Surface temperature (°C)");
        assert!((request.offset - (149.0 - 273.15)).abs() < 1e-9);
    }

    #[test]
    fn test_redraw_request_carries_adjustment() {
        let mut session = session();
        session.start_drawing().unwrap();
        session.on_draw(DRAWN).unwrap();
        let request = session.finalize().unwrap();
        assert_eq!(request.variant, PipelineVariant::Redraw);
        assert!((request.offset - (149.0 - 273.15 - 10.0)).abs() < 1e-9);
        assert_eq!(session.state(), RedrawState::Finalized);
    }

    #[test]
    fn test_finalize_without_shape() {
        let mut session = session();
        session.start_drawing().unwrap();
        assert!(matches!(session.finalize(), Err(LstError::NoDrawnShape)));
    }

    #[test]
    fn test_resolve_builds_legend() {
        let mut session = session();
        let request = session.initial_request();
        let update = session
            .resolve(
                request.generation,
                r#"{"ST_B10_min": 25.0, "ST_B10_max": 45.0}"#,
                7,
            )
            .unwrap();
        assert_eq!(update.layer, 7);
        assert_eq!(update.legend.entries.len(), 11);
        assert_eq!(update.legend.entries[0].label, "25.0°C");
        assert_eq!(update.opacity, 0.5);
    }

    #[test]
    fn test_stale_and_null_statistics() {
        let mut session = session();
        let first = session.initial_request();
        session.start_drawing().unwrap();
        session.on_draw(DRAWN).unwrap();
        let second = session.finalize().unwrap();

        assert!(matches!(
            session.resolve(first.generation, r#"{"ST_B10_min": 1.0, "ST_B10_max": 2.0}"#, 1),
            Err(LstError::StaleResult { .. })
        ));
        assert!(matches!(
            session.resolve(second.generation, r#"{"ST_B10_min": 1.0, "ST_B10_max": null}"#, 2),
            Err(LstError::MissingStatistic { .. })
        ));
        assert!(session.controller.view().is_none());
    }

    #[test]
    fn test_clear_all_reverts_region() {
        let mut session = session();
        let fixed = session.active_region_geojson();
        session.start_drawing().unwrap();
        session.on_draw(DRAWN).unwrap();
        let request = session.finalize().unwrap();
        session
            .resolve(request.generation, r#"{"ST_B10_min": 1.0, "ST_B10_max": 2.0}"#, 1)
            .unwrap();
        assert_ne!(session.active_region_geojson(), fixed);

        let request = session.clear_all();
        session
            .resolve(request.generation, r#"{"ST_B10_min": 1.0, "ST_B10_max": 2.0}"#, 2)
            .unwrap();
        assert_eq!(session.active_region_geojson(), fixed);
        assert_eq!(session.drawn_count(), 0);
    }

    #[test]
    fn test_generation_round_trips_as_number() {
        let mut session = session();
        let request = session.initial_request();
        let json = serde_json::to_value(&request).unwrap();
        let generation = json["generation"].as_f64().unwrap();
        let generation = generation_from_js(generation).unwrap();
        assert_eq!(generation, request.generation);
        assert!(session
            .resolve(generation, r#"{"ST_B10_min": 1.0, "ST_B10_max": 2.0}"#, 1)
            .is_ok());
    }

    #[test]
    fn test_generation_rejects_non_integers() {
        assert!(generation_from_js(1.5).is_err());
        assert!(generation_from_js(-1.0).is_err());
        assert!(generation_from_js(f64::NAN).is_err());
        assert!(generation_from_js(1e300).is_err());
        assert_eq!(generation_from_js(3.0), Ok(3));
    }

    #[test]
    fn test_celsius_from_dn() {
        assert!((celsius_from_dn(44000.0, false) - 26.2428800).abs() < 1e-6);
        assert!((celsius_from_dn(44000.0, true) - 16.2428800).abs() < 1e-6);
    }
}
