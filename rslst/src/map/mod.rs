pub mod controller;
pub mod display;
pub mod drawing;
pub mod session;

pub use controller::{ActiveView, PendingRequest, RedrawController, RedrawState, RequestSequencer};
pub use display::{BaseMap, ControlVisibility, DisplaySurface, LayerId, MapLayer, MapView};
pub use drawing::{DrawingTool, DrawnShape, ShapeKind};
pub use session::{OpacitySlider, ThermalSession};
