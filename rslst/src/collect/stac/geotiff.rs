use anyhow::{bail, Context, Result};
use std::io::Cursor;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

use crate::collect::global_variables::LANDSAT_FILL_VALUE;

/// Decoded samples in the file's own type
#[derive(Debug, Clone)]
pub enum Samples {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl Samples {
    fn from_decoded(result: DecodingResult) -> Result<Self> {
        Ok(match result {
            DecodingResult::U8(v) => Samples::U8(v),
            DecodingResult::U16(v) => Samples::U16(v),
            DecodingResult::U32(v) => Samples::U32(v),
            DecodingResult::I16(v) => Samples::I16(v),
            DecodingResult::I32(v) => Samples::I32(v),
            DecodingResult::F32(v) => Samples::F32(v),
            DecodingResult::F64(v) => Samples::F64(v),
            _ => bail!("Unsupported TIFF sample format"),
        })
    }

    fn len(&self) -> usize {
        match self {
            Samples::U8(v) => v.len(),
            Samples::U16(v) => v.len(),
            Samples::U32(v) => v.len(),
            Samples::I16(v) => v.len(),
            Samples::I32(v) => v.len(),
            Samples::F32(v) => v.len(),
            Samples::F64(v) => v.len(),
        }
    }

    /// Sample at a flat index, widened to f64
    fn value(&self, index: usize) -> f64 {
        match self {
            Samples::U8(v) => f64::from(v[index]),
            Samples::U16(v) => f64::from(v[index]),
            Samples::U32(v) => f64::from(v[index]),
            Samples::I16(v) => f64::from(v[index]),
            Samples::I32(v) => f64::from(v[index]),
            Samples::F32(v) => f64::from(v[index]),
            Samples::F64(v) => v[index],
        }
    }
}

/// Single-band GeoTIFF held in memory with its affine georeferencing.
///
/// Only north-up rasters described by ModelPixelScale + ModelTiepoint are supported, which is
/// what the Landsat Collection 2 COGs carry.
#[derive(Debug, Clone)]
pub struct GeoTiffBand {
    pub width: usize,
    pub height: usize,
    /// Model coordinates of the upper-left corner of pixel (0, 0)
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub data: Samples,
    pub nodata: Option<f64>,
}

impl GeoTiffBand {
    /// Decode the first image of a GeoTIFF
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let mut decoder = Decoder::new(Cursor::new(bytes)).context("Failed to read TIFF")?;
        let (width, height) = decoder
            .dimensions()
            .context("Failed to get TIFF dimensions")?;

        let scale = decoder
            .get_tag_f64_vec(Tag::ModelPixelScaleTag)
            .context("GeoTIFF has no ModelPixelScale tag")?;
        let tiepoint = decoder
            .get_tag_f64_vec(Tag::ModelTiepointTag)
            .context("GeoTIFF has no ModelTiepoint tag")?;
        if scale.len() < 2 || tiepoint.len() < 6 {
            bail!(
                "Malformed georeferencing: scale {:?}, tiepoint {:?}",
                scale,
                tiepoint
            );
        }
        let (pixel_width, pixel_height) = (scale[0], scale[1]);
        if pixel_width <= 0.0 || pixel_height <= 0.0 {
            bail!("Invalid pixel size {} x {}", pixel_width, pixel_height);
        }
        // Tiepoint: raster (i, j, k) -> model (x, y, z)
        let origin_x = tiepoint[3] - tiepoint[0] * pixel_width;
        let origin_y = tiepoint[4] + tiepoint[1] * pixel_height;

        let decoded = decoder.read_image().context("Failed to decode TIFF")?;
        let data = Samples::from_decoded(decoded)?;
        let (width, height) = (width as usize, height as usize);
        if data.len() != width * height {
            bail!(
                "Expected a single band of {}x{} samples, got {}",
                width,
                height,
                data.len()
            );
        }

        Ok(GeoTiffBand {
            width,
            height,
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            data,
            nodata: Some(LANDSAT_FILL_VALUE),
        })
    }

    /// Nearest pixel value at model coordinates (x, y). None outside the raster or on nodata.
    pub fn sample(&self, x: f64, y: f64) -> Option<f64> {
        let col = ((x - self.origin_x) / self.pixel_width).floor();
        let row = ((self.origin_y - y) / self.pixel_height).floor();
        if !(col >= 0.0 && row >= 0.0) || col >= self.width as f64 || row >= self.height as f64
        {
            return None;
        }
        let value = self.data.value(row as usize * self.width + col as usize);
        match self.nodata {
            Some(nodata) if value == nodata => None,
            _ if value.is_nan() => None,
            _ => Some(value),
        }
    }
}
