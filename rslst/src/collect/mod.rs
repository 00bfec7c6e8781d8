pub mod global_variables;
pub mod imagery;
pub mod memory;
#[cfg(feature = "stac")]
pub mod stac;

pub use imagery::{ImagerySource, SceneMeta, SceneQuery};
pub use memory::MemoryImagery;
