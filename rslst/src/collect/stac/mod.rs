pub mod geotiff;
pub mod stac_collect;

pub use geotiff::GeoTiffBand;
pub use stac_collect::StacCollect;
