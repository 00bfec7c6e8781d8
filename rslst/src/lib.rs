pub mod collect;
pub mod commons;
pub mod config;
pub mod error;
pub mod geo_core;
pub mod map;
pub mod thermal;

pub use config::LstConfig;
pub use error::LstError;
pub use geo_core::{BoundingBox, Region};
