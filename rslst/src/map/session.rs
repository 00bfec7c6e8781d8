use log::{info, warn};
use std::sync::Arc;

use crate::collect::global_variables::{DEFAULT_OPACITY, OPACITY_STEP};
use crate::collect::imagery::ImagerySource;
use crate::config::LstConfig;
use crate::error::LstError;
use crate::geo_core::Region;
use crate::map::controller::{ActiveView, PendingRequest, RedrawController, RedrawState};
use crate::map::display::{DisplaySurface, LayerId, MapLayer};
use crate::map::drawing::{DrawingTool, ShapeKind};
use crate::thermal::raster::Raster;
use crate::thermal::temperature::{PipelineSettings, TemperaturePlan, TemperatureResult};
use geo::Polygon;

/// Continuous opacity control over [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpacitySlider {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    value: f64,
}

impl Default for OpacitySlider {
    fn default() -> Self {
        OpacitySlider {
            min: 0.0,
            max: 1.0,
            step: OPACITY_STEP,
            value: DEFAULT_OPACITY,
        }
    }
}

impl OpacitySlider {
    pub fn new(value: f64) -> Result<Self, LstError> {
        let mut slider = Self::default();
        slider.set(value)?;
        Ok(slider)
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Move the slider, snapping to the nearest step. Returns the value actually taken.
    pub fn set(&mut self, value: f64) -> Result<f64, LstError> {
        if !value.is_finite() || value < self.min || value > self.max {
            return Err(LstError::InvalidOpacity(value));
        }
        let snapped = ((value - self.min) / self.step).round() * self.step + self.min;
        self.value = snapped.clamp(self.min, self.max);
        Ok(self.value)
    }
}

/// One user's map session: imagery source, display, drawing tool, redraw controller and
/// opacity slider.
///
/// Every action evaluates synchronously. Hosts that evaluate elsewhere use
/// [`ThermalSession::prepare_finalize`] / [`ThermalSession::prepare_clear`], run
/// [`ThermalSession::plan_for`] themselves and hand the outcome back to
/// [`ThermalSession::apply`].
pub struct ThermalSession<S: ImagerySource, D: DisplaySurface> {
    config: LstConfig,
    settings: PipelineSettings,
    source: S,
    display: D,
    drawing: DrawingTool,
    controller: RedrawController<Arc<Raster>>,
    slider: OpacitySlider,
    current_layer: Option<LayerId>,
}

impl<S: ImagerySource, D: DisplaySurface> ThermalSession<S, D> {
    pub fn new(config: LstConfig, source: S, display: D) -> anyhow::Result<Self> {
        config.validate()?;
        let settings = config.pipeline_settings()?;
        let controller = RedrawController::new(
            config.default_region(),
            &config.band,
            config.palette.clone(),
            config.legend_steps,
        );
        let slider = OpacitySlider::new(config.default_opacity)?;
        let drawing = DrawingTool::new(config.highlight_color);
        Ok(ThermalSession {
            config,
            settings,
            source,
            display,
            drawing,
            controller,
            slider,
            current_layer: None,
        })
    }

    pub fn config(&self) -> &LstConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn drawing(&self) -> &DrawingTool {
        &self.drawing
    }

    pub fn controller(&self) -> &RedrawController<Arc<Raster>> {
        &self.controller
    }

    pub fn slider(&self) -> &OpacitySlider {
        &self.slider
    }

    pub fn state(&self) -> RedrawState {
        self.controller.state()
    }

    pub fn active_region(&self) -> &Region {
        self.controller.active_region()
    }

    pub fn view(&self) -> Option<&ActiveView<Arc<Raster>>> {
        self.controller.view()
    }

    fn current_view(&self) -> Result<&ActiveView<Arc<Raster>>, LstError> {
        self.controller.view().ok_or(LstError::NoLayer)
    }

    /// Compute over the fixed region and set up the map viewport
    pub fn initial_load(&mut self) -> Result<&ActiveView<Arc<Raster>>, LstError> {
        let request = self.controller.request_initial();
        self.run(request)?;

        let view = &self.config.view;
        self.display.set_center(
            view.initial_center[0],
            view.initial_center[1],
            view.initial_zoom,
        );
        self.display.set_base_map(view.base_map);
        self.display.set_control_visibility(view.controls);
        self.current_view()
    }

    /// "Center map" button
    pub fn recenter(&mut self) {
        let view = &self.config.view;
        self.display.set_center(
            view.recenter_point[0],
            view.recenter_point[1],
            view.recenter_zoom,
        );
    }

    /// "Draw" button: show the tool in polygon mode and listen for completed shapes
    pub fn start_drawing(&mut self) -> Result<(), LstError> {
        self.drawing.set_shown(true);
        self.drawing.set_shape(Some(ShapeKind::Polygon));
        self.drawing.draw()?;
        self.controller.start_drawing();
        Ok(())
    }

    pub fn complete_shape(&mut self, geometry: Polygon<f64>) -> Result<usize, LstError> {
        self.drawing.complete_shape(geometry)
    }

    pub fn complete_geojson(&mut self, geojson: &str) -> Result<usize, LstError> {
        self.drawing.complete_geojson(geojson)
    }

    /// Take the first drawn shape, hide the tool and issue a redraw request
    pub fn prepare_finalize(&mut self) -> Result<PendingRequest, LstError> {
        let region = self
            .drawing
            .layers()
            .first()
            .ok_or(LstError::NoDrawnShape)?
            .to_region()?;
        let ignored = self.drawing.layers().len() - 1;
        if ignored > 0 {
            warn!(
                "{} drawn shape(s) ignored: only the first one is used",
                ignored
            );
        }
        if let Some(center) = region.centroid() {
            info!(
                "Redraw requested over polygon centred at ({:.4}, {:.4})",
                center.x(),
                center.y()
            );
        }
        self.drawing.stop();
        self.controller.request_redraw(region)
    }

    /// "Finalize" button: recompute over the first drawn shape on the redraw path
    pub fn finalize(&mut self) -> Result<&ActiveView<Arc<Raster>>, LstError> {
        let request = match self.prepare_finalize() {
            Ok(request) => request,
            Err(err) => {
                self.display.notify(&err.to_string());
                return Err(err);
            }
        };
        self.run(request)?;
        self.current_view()
    }

    /// Remove every drawn shape and issue a request for the fixed region
    pub fn prepare_clear(&mut self) -> PendingRequest {
        let removed = self.drawing.clear();
        self.drawing.stop();
        info!("Cleared {} drawn shape(s)", removed);
        self.controller.request_clear()
    }

    /// "Clear all" button
    pub fn clear_all(&mut self) -> Result<&ActiveView<Arc<Raster>>, LstError> {
        let request = self.prepare_clear();
        self.run(request)?;
        self.current_view()
    }

    /// Opacity slider: restyles the current layer, nothing is recomputed
    pub fn set_opacity(&mut self, value: f64) -> Result<f64, LstError> {
        let value = self.slider.set(value)?;
        if let Some(id) = self.current_layer {
            self.display.set_layer_opacity(id, value)?;
        }
        Ok(value)
    }

    /// Deferred computation for `request`
    pub fn plan_for(&self, request: &PendingRequest) -> TemperaturePlan {
        TemperaturePlan::new(
            request.region.clone(),
            self.settings.clone(),
            request.variant,
        )
    }

    /// Evaluate `request` against the session's source and apply the outcome
    pub fn run(&mut self, request: PendingRequest) -> Result<&ActiveView<Arc<Raster>>, LstError> {
        let outcome = self.plan_for(&request).evaluate(&self.source);
        self.apply(request.generation, outcome)
    }

    /// Apply the outcome of request `generation`: replace every layer with the new one and
    /// rebuild the legend. Failures are reported on the display; stale outcomes only in the log.
    pub fn apply(
        &mut self,
        generation: u64,
        outcome: Result<TemperatureResult, LstError>,
    ) -> Result<&ActiveView<Arc<Raster>>, LstError> {
        let outcome = outcome.map(|result| (result.stats, Arc::new(result.raster)));
        match self.controller.resolve(generation, outcome) {
            Ok(view) => {
                self.display.reset_layers();
                let id = self.display.add_layer(MapLayer {
                    name: view.legend.title.clone(),
                    raster: Arc::clone(&view.layer),
                    vis: view.legend.vis.clone(),
                    opacity: self.slider.value(),
                });
                self.display.set_legend(view.legend.clone());
                self.current_layer = Some(id);
                Ok(view)
            }
            Err(err) => {
                if !matches!(err, LstError::StaleResult { .. }) {
                    self.display.notify(&err.to_string());
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::global_variables::{LAYER_NAME_INITIAL, LAYER_NAME_REDRAW};
    use crate::collect::memory::MemoryImagery;
    use crate::geo_core::BoundingBox;
    use crate::map::display::{BaseMap, ControlVisibility, MapView};
    use crate::thermal::temperature::PipelineVariant;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use geo::polygon;

    fn test_config() -> LstConfig {
        LstConfig {
            stats_scale_m: 300.0,
            ..LstConfig::default()
        }
    }

    fn session() -> ThermalSession<MemoryImagery, MapView> {
        ThermalSession::new(
            test_config(),
            MemoryImagery::hermosillo_demo("ST_B10"),
            MapView::new(),
        )
        .unwrap()
    }

    fn downtown() -> Polygon<f64> {
        polygon![
            (x: -110.87, y: 29.08),
            (x: -110.82, y: 29.08),
            (x: -110.82, y: 29.13),
            (x: -110.87, y: 29.13),
        ]
    }

    fn outskirts() -> Polygon<f64> {
        polygon![
            (x: -110.78, y: 29.02),
            (x: -110.72, y: 29.02),
            (x: -110.72, y: 29.06),
        ]
    }

    #[test]
    fn test_opacity_slider() {
        let mut slider = OpacitySlider::default();
        assert_eq!(slider.value(), 0.5);
        assert_relative_eq!(slider.set(0.333).unwrap(), 0.33, epsilon = 1e-12);
        assert!(slider.set(1.2).is_err());
        assert!(slider.set(f64::NAN).is_err());
        assert!(slider.set(-0.01).is_err());
        assert_relative_eq!(slider.value(), 0.33, epsilon = 1e-12);
        assert_eq!(slider.set(1.0).unwrap(), 1.0);
    }

    #[test]
    fn test_initial_load() {
        let mut session = session();
        let view = session.initial_load().unwrap();
        assert_eq!(view.variant, PipelineVariant::Initial);
        assert_eq!(view.legend.title, LAYER_NAME_INITIAL);
        assert_eq!(view.legend.entries.len(), 11);

        let display = session.display();
        assert_eq!(display.layer_count(), 1);
        let layer = display.top_layer().unwrap();
        assert_eq!(layer.name, LAYER_NAME_INITIAL);
        assert_eq!(layer.opacity, 0.5);
        assert_eq!(display.center(), Some((-110.972471, 29.092477, 12)));
        assert_eq!(display.base_map(), Some(BaseMap::Roadmap));
        assert_eq!(display.controls(), Some(ControlVisibility::default()));
        assert!(display.legend().is_some());
        assert_eq!(
            session.active_region(),
            &Region::Rectangle(BoundingBox::new(-110.9, 29.0, -110.7, 29.2))
        );
    }

    #[test]
    fn test_recenter() {
        let mut session = session();
        session.recenter();
        assert_eq!(session.display().center(), Some((-110.9613, 29.0729, 15)));
    }

    #[test]
    fn test_empty_collection_adds_no_layer() {
        let config = LstConfig {
            date_start: NaiveDate::from_ymd_opt(2019, 9, 1).unwrap(),
            date_end: NaiveDate::from_ymd_opt(2019, 9, 30).unwrap(),
            ..test_config()
        };
        let mut session = ThermalSession::new(
            config,
            MemoryImagery::hermosillo_demo("ST_B10"),
            MapView::new(),
        )
        .unwrap();

        let err = session.initial_load().unwrap_err();
        assert!(matches!(err, LstError::EmptyCollection { .. }));
        assert_eq!(session.display().layer_count(), 0);
        assert!(session.display().legend().is_none());
        assert_eq!(session.display().last_message(), Some(err.to_string().as_str()));
    }

    #[test]
    fn test_finalize_without_shape_is_rejected() {
        let mut session = session();
        session.initial_load().unwrap();
        session.start_drawing().unwrap();

        let err = session.finalize().unwrap_err();
        assert!(matches!(err, LstError::NoDrawnShape));
        assert_eq!(session.display().last_message(), Some(err.to_string().as_str()));
        assert_eq!(session.display().layer_count(), 1);
        assert_eq!(session.state(), RedrawState::Drawing);
    }

    #[test]
    fn test_shapes_require_drawing_mode() {
        let mut session = session();
        assert!(matches!(
            session.complete_shape(downtown()),
            Err(LstError::DrawingInactive)
        ));
        session.start_drawing().unwrap();
        assert_eq!(session.complete_shape(downtown()).unwrap(), 0);
        assert!(session.drawing().is_drawing());
    }

    #[test]
    fn test_redraw_cycle() {
        let mut session = session();
        session.initial_load().unwrap();
        session.start_drawing().unwrap();
        assert_eq!(session.state(), RedrawState::Drawing);
        session.complete_shape(downtown()).unwrap();

        let view = session.finalize().unwrap();
        assert_eq!(view.variant, PipelineVariant::Redraw);
        assert_eq!(view.legend.title, LAYER_NAME_REDRAW);
        assert_eq!(session.state(), RedrawState::Idle);
        assert!(!session.drawing().is_shown());
        assert_eq!(session.drawing().layers().len(), 1);
        assert!(session.active_region().is_drawn());

        let display = session.display();
        assert_eq!(display.layer_count(), 1);
        assert_eq!(display.top_layer().unwrap().name, LAYER_NAME_REDRAW);
    }

    #[test]
    fn test_redraw_range_matches_unadjusted_range() {
        let mut session = session();
        session.start_drawing().unwrap();
        session.complete_shape(downtown()).unwrap();
        let (redraw_min, redraw_max) = {
            let view = session.finalize().unwrap();
            view.stats.range("ST_B10").unwrap()
        };

        let region = Region::drawn(downtown()).unwrap();
        let settings = session.config().pipeline_settings().unwrap();
        let plain = TemperaturePlan::new(region, settings, PipelineVariant::Initial)
            .evaluate(session.source())
            .unwrap();
        let (min, max) = plain.stats.range("ST_B10").unwrap();

        assert_relative_eq!(redraw_max - redraw_min, max - min, epsilon = 1e-9);
        assert_relative_eq!(redraw_min, min - 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_finalize_uses_first_shape_only() {
        let mut session = session();
        session.start_drawing().unwrap();
        session.complete_shape(downtown()).unwrap();
        session.complete_shape(outskirts()).unwrap();
        session.finalize().unwrap();
        assert_eq!(session.active_region(), &Region::drawn(downtown()).unwrap());
    }

    #[test]
    fn test_clear_all_restores_fixed_rectangle() {
        let mut session = session();
        session.initial_load().unwrap();
        for shape in [downtown(), outskirts()] {
            session.start_drawing().unwrap();
            session.complete_shape(shape).unwrap();
            session.finalize().unwrap();
        }
        assert!(session.active_region().is_drawn());

        let view = session.clear_all().unwrap();
        assert_eq!(view.variant, PipelineVariant::Redraw);
        assert_eq!(
            session.active_region(),
            &Region::Rectangle(BoundingBox::new(-110.9, 29.0, -110.7, 29.2))
        );
        assert!(session.drawing().layers().is_empty());
        assert_eq!(session.state(), RedrawState::Idle);
        assert_eq!(session.display().layer_count(), 1);
    }

    #[test]
    fn test_opacity_does_not_recompute() {
        let mut session = session();
        session.initial_load().unwrap();
        let searches = session.source().search_count();
        let loads = session.source().load_count();

        assert_relative_eq!(session.set_opacity(0.8).unwrap(), 0.8, epsilon = 1e-12);
        assert_relative_eq!(
            session.display().top_layer().unwrap().opacity,
            0.8,
            epsilon = 1e-12
        );
        assert!(matches!(
            session.set_opacity(2.0),
            Err(LstError::InvalidOpacity(_))
        ));
        assert_eq!(session.source().search_count(), searches);
        assert_eq!(session.source().load_count(), loads);
    }

    #[test]
    fn test_new_layer_takes_slider_value() {
        let mut session = session();
        session.set_opacity(0.25).unwrap();
        session.initial_load().unwrap();
        assert_relative_eq!(
            session.display().top_layer().unwrap().opacity,
            0.25,
            epsilon = 1e-12
        );

        session.start_drawing().unwrap();
        session.complete_shape(downtown()).unwrap();
        session.finalize().unwrap();
        session.set_opacity(0.9).unwrap();
        assert_relative_eq!(
            session.display().top_layer().unwrap().opacity,
            0.9,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_stale_outcome_is_not_displayed() {
        let mut session = session();
        session.initial_load().unwrap();
        session.start_drawing().unwrap();
        session.complete_shape(downtown()).unwrap();

        let slow = session.prepare_finalize().unwrap();
        let fast = session.prepare_clear();
        let slow_outcome = session.plan_for(&slow).evaluate(session.source());
        let fast_outcome = session.plan_for(&fast).evaluate(session.source());

        session.apply(fast.generation, fast_outcome).unwrap();
        let messages = session.display().messages().len();
        let err = session.apply(slow.generation, slow_outcome).unwrap_err();

        assert!(matches!(err, LstError::StaleResult { .. }));
        assert_eq!(session.display().messages().len(), messages);
        assert_eq!(
            session.active_region(),
            &Region::Rectangle(BoundingBox::new(-110.9, 29.0, -110.7, 29.2))
        );
    }

    #[test]
    fn test_failed_redraw_keeps_previous_display() {
        let mut session = session();
        session.initial_load().unwrap();
        let before = session.display().top_layer().unwrap().raster.clone();

        session.start_drawing().unwrap();
        session.complete_shape(downtown()).unwrap();
        let request = session.prepare_finalize().unwrap();
        let outcome = Err(LstError::MissingStatistic {
            key: "ST_B10_max".to_string(),
        });
        assert!(session.apply(request.generation, outcome).is_err());

        assert!(Arc::ptr_eq(
            &session.display().top_layer().unwrap().raster,
            &before
        ));
        assert!(!session.active_region().is_drawn());
        assert!(session.display().last_message().is_some());
    }
}
