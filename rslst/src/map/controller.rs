use log::{info, warn};
use serde::Serialize;

use crate::error::LstError;
use crate::geo_core::Region;
use crate::thermal::legend::{HexColor, Legend};
use crate::thermal::stats::RegionStats;
use crate::thermal::temperature::PipelineVariant;

/// Redraw cycle: Idle -> Drawing -> Finalized -> Idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedrawState {
    /// Drawing tool hidden
    Idle,
    /// Drawing tool shown, waiting for shapes
    Drawing,
    /// Drawn region submitted, result pending
    Finalized,
}

/// Monotonic request counter. Only the latest request may update the display.
#[derive(Debug, Clone, Default)]
pub struct RequestSequencer {
    latest: u64,
}

impl RequestSequencer {
    pub fn next(&mut self) -> u64 {
        self.latest += 1;
        self.latest
    }

    pub fn latest(&self) -> u64 {
        self.latest
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation != 0 && generation == self.latest
    }
}

/// One outstanding computation request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingRequest {
    pub generation: u64,
    pub region: Region,
    pub variant: PipelineVariant,
}

/// What is currently displayed. Region, statistics, legend and layer always come from the
/// same request.
#[derive(Debug, Clone)]
pub struct ActiveView<L> {
    pub generation: u64,
    pub region: Region,
    pub variant: PipelineVariant,
    pub stats: RegionStats,
    pub legend: Legend,
    pub layer: L,
}

/// Host-agnostic redraw state machine.
///
/// `L` is whatever the host keeps per displayed layer: a raster natively, an opaque handle
/// when the pixels live elsewhere.
#[derive(Debug, Clone)]
pub struct RedrawController<L> {
    state: RedrawState,
    default_region: Region,
    sequencer: RequestSequencer,
    pending: Option<PendingRequest>,
    view: Option<ActiveView<L>>,
    band: String,
    palette: Vec<HexColor>,
    legend_steps: usize,
}

impl<L> RedrawController<L> {
    pub fn new(
        default_region: Region,
        band: &str,
        palette: Vec<HexColor>,
        legend_steps: usize,
    ) -> Self {
        RedrawController {
            state: RedrawState::Idle,
            default_region,
            sequencer: RequestSequencer::default(),
            pending: None,
            view: None,
            band: band.to_string(),
            palette,
            legend_steps,
        }
    }

    pub fn state(&self) -> RedrawState {
        self.state
    }

    pub fn default_region(&self) -> &Region {
        &self.default_region
    }

    pub fn view(&self) -> Option<&ActiveView<L>> {
        self.view.as_ref()
    }

    /// Region of the displayed view, or the fixed region before anything is displayed
    pub fn active_region(&self) -> &Region {
        self.view
            .as_ref()
            .map(|view| &view.region)
            .unwrap_or(&self.default_region)
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    pub fn latest_generation(&self) -> u64 {
        self.sequencer.latest()
    }

    fn issue(&mut self, region: Region, variant: PipelineVariant) -> PendingRequest {
        let request = PendingRequest {
            generation: self.sequencer.next(),
            region,
            variant,
        };
        self.pending = Some(request.clone());
        request
    }

    /// First load over the fixed region
    pub fn request_initial(&mut self) -> PendingRequest {
        self.issue(self.default_region.clone(), PipelineVariant::Initial)
    }

    pub fn start_drawing(&mut self) {
        self.state = RedrawState::Drawing;
    }

    /// Submit a drawn region for recomputation on the redraw path
    pub fn request_redraw(&mut self, region: Region) -> Result<PendingRequest, LstError> {
        region.validate()?;
        self.state = RedrawState::Finalized;
        Ok(self.issue(region, PipelineVariant::Redraw))
    }

    /// Drop back to the fixed region, recomputed on the redraw path
    pub fn request_clear(&mut self) -> PendingRequest {
        self.state = RedrawState::Idle;
        self.issue(self.default_region.clone(), PipelineVariant::Redraw)
    }

    /// Apply the outcome of request `generation`.
    ///
    /// Outcomes of superseded requests are rejected with [`LstError::StaleResult`]. A failed
    /// outcome, or one whose statistics lack min/max, leaves the current view untouched. On
    /// success the region, statistics, legend and layer are replaced together.
    pub fn resolve(
        &mut self,
        generation: u64,
        outcome: Result<(RegionStats, L), LstError>,
    ) -> Result<&ActiveView<L>, LstError> {
        let latest = self.sequencer.latest();
        let request = match self.pending.take() {
            Some(request)
                if self.sequencer.is_current(generation) && request.generation == generation =>
            {
                request
            }
            other => {
                self.pending = other;
                warn!(
                    "Discarding result of request #{} (latest is #{})",
                    generation, latest
                );
                return Err(LstError::StaleResult { generation, latest });
            }
        };

        if self.state == RedrawState::Finalized {
            self.state = RedrawState::Idle;
        }

        let (stats, layer) = outcome?;
        let legend = Legend::from_stats(
            request.variant.layer_name(),
            &stats,
            &self.band,
            &self.palette,
            self.legend_steps,
        )?;
        info!(
            "Request #{} resolved: {} to {}",
            generation,
            legend.entries.first().map(|e| e.label.as_str()).unwrap_or("?"),
            legend.entries.last().map(|e| e.label.as_str()).unwrap_or("?"),
        );

        let view = ActiveView {
            generation,
            region: request.region,
            variant: request.variant,
            stats,
            legend,
            layer,
        };
        Ok(&*self.view.insert(view))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_core::BoundingBox;
    use crate::thermal::legend::default_palette;
    use geo::polygon;

    fn controller() -> RedrawController<&'static str> {
        RedrawController::new(
            Region::Rectangle(BoundingBox::new(-110.9, 29.0, -110.7, 29.2)),
            "ST_B10",
            default_palette(),
            10,
        )
    }

    fn stats(min: f64, max: f64) -> RegionStats {
        let mut stats = RegionStats::new();
        stats.insert("ST_B10_min", Some(min));
        stats.insert("ST_B10_max", Some(max));
        stats
    }

    fn drawn() -> Region {
        Region::drawn(polygon![
            (x: -110.85, y: 29.05),
            (x: -110.80, y: 29.05),
            (x: -110.80, y: 29.10),
        ])
        .unwrap()
    }

    #[test]
    fn test_sequencer() {
        let mut sequencer = RequestSequencer::default();
        assert!(!sequencer.is_current(0));
        let first = sequencer.next();
        let second = sequencer.next();
        assert!(second > first);
        assert!(sequencer.is_current(second));
        assert!(!sequencer.is_current(first));
    }

    #[test]
    fn test_initial_resolution() {
        let mut controller = controller();
        let request = controller.request_initial();
        assert_eq!(request.variant, PipelineVariant::Initial);
        let view = controller
            .resolve(request.generation, Ok((stats(25.0, 45.0), "initial")))
            .unwrap();
        assert_eq!(view.legend.entries.len(), 11);
        assert_eq!(view.layer, "initial");
        assert_eq!(controller.active_region(), controller.default_region());
        assert!(controller.pending().is_none());
    }

    #[test]
    fn test_redraw_cycle_states() {
        let mut controller = controller();
        controller.start_drawing();
        assert_eq!(controller.state(), RedrawState::Drawing);
        let request = controller.request_redraw(drawn()).unwrap();
        assert_eq!(controller.state(), RedrawState::Finalized);
        controller
            .resolve(request.generation, Ok((stats(15.0, 30.0), "drawn")))
            .unwrap();
        assert_eq!(controller.state(), RedrawState::Idle);
        assert_eq!(controller.active_region(), &drawn());
    }

    #[test]
    fn test_stale_result_does_not_overwrite() {
        let mut controller = controller();
        let slow = controller.request_redraw(drawn()).unwrap();
        let fast = controller.request_clear();
        controller
            .resolve(fast.generation, Ok((stats(20.0, 40.0), "fast")))
            .unwrap();

        let err = controller
            .resolve(slow.generation, Ok((stats(0.0, 1.0), "slow")))
            .unwrap_err();
        assert!(matches!(
            err,
            LstError::StaleResult { generation, latest }
                if generation == slow.generation && latest == fast.generation
        ));

        let view = controller.view().unwrap();
        assert_eq!(view.layer, "fast");
        assert_eq!(view.generation, fast.generation);
        assert_eq!(controller.active_region(), controller.default_region());
    }

    #[test]
    fn test_stale_before_latest_keeps_pending() {
        let mut controller = controller();
        let slow = controller.request_initial();
        let fast = controller.request_redraw(drawn()).unwrap();
        assert!(controller.resolve(slow.generation, Ok((stats(0.0, 1.0), "slow"))).is_err());
        assert_eq!(controller.pending().map(|p| p.generation), Some(fast.generation));
        assert!(controller
            .resolve(fast.generation, Ok((stats(1.0, 2.0), "fast")))
            .is_ok());
    }

    #[test]
    fn test_duplicate_resolution_is_stale() {
        let mut controller = controller();
        let request = controller.request_initial();
        controller
            .resolve(request.generation, Ok((stats(1.0, 2.0), "a")))
            .unwrap();
        assert!(matches!(
            controller.resolve(request.generation, Ok((stats(3.0, 4.0), "b"))),
            Err(LstError::StaleResult { .. })
        ));
        assert_eq!(controller.view().unwrap().layer, "a");
    }

    #[test]
    fn test_missing_statistics_keep_previous_view() {
        let mut controller = controller();
        let first = controller.request_initial();
        controller
            .resolve(first.generation, Ok((stats(25.0, 45.0), "initial")))
            .unwrap();

        let request = controller.request_redraw(drawn()).unwrap();
        let mut partial = RegionStats::new();
        partial.insert("ST_B10_min", Some(12.0));
        assert!(matches!(
            controller.resolve(request.generation, Ok((partial, "broken"))),
            Err(LstError::MissingStatistic { .. })
        ));

        let view = controller.view().unwrap();
        assert_eq!(view.layer, "initial");
        assert_eq!(controller.active_region(), controller.default_region());
        assert_eq!(controller.state(), RedrawState::Idle);
    }

    #[test]
    fn test_failed_outcome_keeps_previous_view() {
        let mut controller = controller();
        let first = controller.request_initial();
        controller
            .resolve(first.generation, Ok((stats(25.0, 45.0), "initial")))
            .unwrap();
        let request = controller.request_redraw(drawn()).unwrap();
        let outcome = Err(LstError::EmptyCollection {
            start: "2020-09-01".to_string(),
            end: "2020-09-30".to_string(),
            max_cloud_cover: 10.0,
        });
        assert!(controller.resolve(request.generation, outcome).is_err());
        assert_eq!(controller.view().unwrap().layer, "initial");
    }

    #[test]
    fn test_clear_reverts_to_fixed_region() {
        let mut controller = controller();
        for _ in 0..3 {
            let request = controller.request_redraw(drawn()).unwrap();
            controller
                .resolve(request.generation, Ok((stats(10.0, 20.0), "drawn")))
                .unwrap();
        }
        let clear = controller.request_clear();
        assert_eq!(clear.region, *controller.default_region());
        controller
            .resolve(clear.generation, Ok((stats(10.0, 20.0), "cleared")))
            .unwrap();
        assert_eq!(
            controller.active_region(),
            &Region::Rectangle(BoundingBox::new(-110.9, 29.0, -110.7, 29.2))
        );
    }

    #[test]
    fn test_invalid_redraw_region_rejected() {
        let mut controller = controller();
        let bad = Region::Rectangle(BoundingBox::new(1.0, 1.0, 0.0, 0.0));
        assert!(controller.request_redraw(bad).is_err());
        assert_eq!(controller.latest_generation(), 0);
    }
}
