use anyhow::bail;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::LstError;
use crate::geo_core::{BoundingBox, Region};

/// Lon/lat grid covering a bounding box at a metric cell size.
/// Row 0 is the northern edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub bounds: BoundingBox,
    pub width: usize,
    pub height: usize,
    /// Nominal cell size in metres
    pub scale_m: f64,
}

impl GridSpec {
    /// Build the grid covering `bounds` with cells of roughly `scale_m` metres
    pub fn for_bounds(bounds: BoundingBox, scale_m: f64) -> Result<Self, LstError> {
        bounds.validate()?;
        if !(scale_m.is_finite() && scale_m > 0.0) {
            return Err(LstError::InvalidRegion(format!(
                "grid scale must be positive, got {}",
                scale_m
            )));
        }

        // Float to int casts saturate, so an absurd scale shows up as an overflowing product
        let width = (bounds.width_m() / scale_m).ceil().max(1.0) as usize;
        let height = (bounds.height_m() / scale_m).ceil().max(1.0) as usize;
        if width.checked_mul(height).is_none() {
            return Err(LstError::InvalidRegion(format!(
                "a {} m grid over {:?} has too many cells",
                scale_m,
                bounds.to_array()
            )));
        }

        Ok(GridSpec {
            bounds,
            width,
            height,
            scale_m,
        })
    }

    pub fn len(&self) -> usize {
        self.width.saturating_mul(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell size in degrees (lon, lat)
    pub fn cell_size(&self) -> (f64, f64) {
        (
            (self.bounds.max_x - self.bounds.min_x) / self.width as f64,
            (self.bounds.max_y - self.bounds.min_y) / self.height as f64,
        )
    }

    /// Lon/lat of the center of cell (col, row)
    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        let (dx, dy) = self.cell_size();
        (
            self.bounds.min_x + (col as f64 + 0.5) * dx,
            self.bounds.max_y - (row as f64 + 0.5) * dy,
        )
    }

    /// Lon/lat of the center of the cell at a flat row-major index
    pub fn index_center(&self, index: usize) -> (f64, f64) {
        self.cell_center(index % self.width, index / self.width)
    }
}

/// Single-band raster on a [`GridSpec`], row-major. `None` marks nodata.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    grid: GridSpec,
    band: String,
    data: Vec<Option<f64>>,
}

impl Raster {
    pub fn new(grid: GridSpec, band: &str, data: Vec<Option<f64>>) -> anyhow::Result<Self> {
        if data.len() != grid.len() {
            bail!(
                "raster '{}' has {} values for a {}x{} grid",
                band,
                data.len(),
                grid.width,
                grid.height
            );
        }
        Ok(Raster {
            grid,
            band: band.to_string(),
            data,
        })
    }

    /// Evaluate `f` at every cell center
    pub fn from_fn<F>(grid: GridSpec, band: &str, f: F) -> Self
    where
        F: Fn(f64, f64) -> Option<f64> + Sync,
    {
        let len = grid.len();
        #[cfg(feature = "rayon")]
        let data = (0..len)
            .into_par_iter()
            .map(|i| {
                let (lon, lat) = grid.index_center(i);
                f(lon, lat)
            })
            .collect();
        #[cfg(not(feature = "rayon"))]
        let data = (0..len)
            .map(|i| {
                let (lon, lat) = grid.index_center(i);
                f(lon, lat)
            })
            .collect();

        Raster {
            grid,
            band: band.to_string(),
            data,
        }
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn band(&self) -> &str {
        &self.band
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.data
    }

    pub fn get(&self, col: usize, row: usize) -> Option<f64> {
        if col >= self.grid.width || row >= self.grid.height {
            return None;
        }
        self.data[row * self.grid.width + col]
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_some()).count()
    }

    /// Apply `f` to every valid pixel
    pub fn map<F>(&self, f: F) -> Raster
    where
        F: Fn(f64) -> f64 + Sync + Send,
    {
        #[cfg(feature = "rayon")]
        let data = self.data.par_iter().map(|v| v.map(&f)).collect();
        #[cfg(not(feature = "rayon"))]
        let data = self.data.iter().map(|v| v.map(&f)).collect();

        Raster {
            grid: self.grid.clone(),
            band: self.band.clone(),
            data,
        }
    }

    /// Set every pixel whose center falls outside `region` to nodata
    pub fn clip(&self, region: &Region) -> Raster {
        let data = self
            .data
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let (lon, lat) = self.grid.index_center(i);
                if region.contains(lon, lat) {
                    *v
                } else {
                    None
                }
            })
            .collect();

        Raster {
            grid: self.grid.clone(),
            band: self.band.clone(),
            data,
        }
    }
}

/// Running pixel-wise mean of rasters sharing one grid.
///
/// Bands are folded in one at a time, so a caller can drop each scene before loading the next.
/// Nodata pixels are skipped; a pixel with no valid sample anywhere stays nodata.
#[derive(Debug, Clone)]
pub struct MeanAccumulator {
    grid: GridSpec,
    band: String,
    sums: Vec<f64>,
    counts: Vec<u32>,
    rasters: usize,
}

impl MeanAccumulator {
    pub fn new(grid: GridSpec, band: &str) -> Self {
        let len = grid.len();
        MeanAccumulator {
            grid,
            band: band.to_string(),
            sums: vec![0.0; len],
            counts: vec![0; len],
            rasters: 0,
        }
    }

    pub fn add(&mut self, raster: &Raster) -> anyhow::Result<()> {
        if raster.grid != self.grid {
            bail!(
                "raster '{}' is not on the same grid as '{}'",
                raster.band,
                self.band
            );
        }

        #[cfg(feature = "rayon")]
        self.sums
            .par_iter_mut()
            .zip(self.counts.par_iter_mut())
            .zip(raster.data.par_iter())
            .for_each(|((sum, count), value)| {
                if let Some(v) = *value {
                    *sum += v;
                    *count += 1;
                }
            });
        #[cfg(not(feature = "rayon"))]
        self.sums
            .iter_mut()
            .zip(self.counts.iter_mut())
            .zip(raster.data.iter())
            .for_each(|((sum, count), value)| {
                if let Some(v) = *value {
                    *sum += v;
                    *count += 1;
                }
            });

        self.rasters += 1;
        Ok(())
    }

    /// Number of rasters folded in so far
    pub fn count(&self) -> usize {
        self.rasters
    }

    pub fn finish(self) -> anyhow::Result<Raster> {
        if self.rasters == 0 {
            bail!("cannot average an empty set of rasters");
        }
        let data = self
            .sums
            .into_iter()
            .zip(self.counts)
            .map(|(sum, count)| {
                if count == 0 {
                    None
                } else {
                    Some(sum / count as f64)
                }
            })
            .collect();

        Ok(Raster {
            grid: self.grid,
            band: self.band,
            data,
        })
    }
}
