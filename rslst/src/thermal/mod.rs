pub mod legend;
pub mod raster;
pub mod stats;
pub mod temperature;

pub use legend::{HexColor, Legend, LegendEntry, VisParams};
pub use raster::{GridSpec, MeanAccumulator, Raster};
pub use stats::{ReduceParams, RegionStats};
pub use temperature::{
    Calibration, PipelineSettings, PipelineVariant, TemperaturePlan, TemperatureResult,
};
