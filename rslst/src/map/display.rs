#[cfg(feature = "image")]
use anyhow::Context;
use serde::{Deserialize, Serialize};
#[cfg(feature = "image")]
use std::path::Path;
use std::sync::Arc;

use crate::error::LstError;
use crate::thermal::legend::{Legend, VisParams};
use crate::thermal::raster::Raster;

pub type LayerId = usize;

/// Base map style under the temperature layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BaseMap {
    Roadmap,
    Satellite,
    Hybrid,
    Terrain,
}

/// Which standard map controls are visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlVisibility {
    pub zoom_control: bool,
    pub scale_control: bool,
    pub fullscreen_control: bool,
    pub map_type_control: bool,
    pub layer_list: bool,
}

impl Default for ControlVisibility {
    fn default() -> Self {
        ControlVisibility {
            zoom_control: true,
            scale_control: true,
            fullscreen_control: false,
            map_type_control: false,
            layer_list: true,
        }
    }
}

/// A rendered temperature layer
#[derive(Debug, Clone)]
pub struct MapLayer {
    pub name: String,
    pub raster: Arc<Raster>,
    pub vis: VisParams,
    pub opacity: f64,
}

/// Surface the temperature layers are displayed on
pub trait DisplaySurface {
    /// Remove every layer
    fn reset_layers(&mut self);

    fn add_layer(&mut self, layer: MapLayer) -> LayerId;

    /// Change a layer's opacity in place
    fn set_layer_opacity(&mut self, id: LayerId, opacity: f64) -> Result<(), LstError>;

    fn set_center(&mut self, lon: f64, lat: f64, zoom: u8);

    fn set_base_map(&mut self, base_map: BaseMap);

    fn set_control_visibility(&mut self, controls: ControlVisibility);

    fn set_legend(&mut self, legend: Legend);

    /// User-visible message
    fn notify(&mut self, message: &str);
}

/// In-memory display surface. Keeps the layer stack, legend, viewport and messages.
#[derive(Debug, Default)]
pub struct MapView {
    layers: Vec<(LayerId, MapLayer)>,
    next_id: LayerId,
    legend: Option<Legend>,
    center: Option<(f64, f64, u8)>,
    base_map: Option<BaseMap>,
    controls: Option<ControlVisibility>,
    messages: Vec<String>,
}

impl MapView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layers(&self) -> impl Iterator<Item = &MapLayer> {
        self.layers.iter().map(|(_, layer)| layer)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, id: LayerId) -> Option<&MapLayer> {
        self.layers
            .iter()
            .find(|(layer_id, _)| *layer_id == id)
            .map(|(_, layer)| layer)
    }

    /// Layer drawn last (on top)
    pub fn top_layer(&self) -> Option<&MapLayer> {
        self.layers.last().map(|(_, layer)| layer)
    }

    pub fn legend(&self) -> Option<&Legend> {
        self.legend.as_ref()
    }

    pub fn center(&self) -> Option<(f64, f64, u8)> {
        self.center
    }

    pub fn base_map(&self) -> Option<BaseMap> {
        self.base_map
    }

    pub fn controls(&self) -> Option<ControlVisibility> {
        self.controls
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&str> {
        self.messages.last().map(|m| m.as_str())
    }

    /// RGBA pixels of the top layer: palette color with alpha from the layer opacity, nodata
    /// fully transparent
    pub fn render_rgba(&self) -> Option<(u32, u32, Vec<u8>)> {
        let layer = self.top_layer()?;
        let grid = layer.raster.grid();
        let alpha = (layer.opacity.clamp(0.0, 1.0) * 255.0).round() as u8;

        let mut buffer = Vec::with_capacity(grid.len() * 4);
        for value in layer.raster.values() {
            match value.and_then(|v| layer.vis.color_at(v)) {
                Some(color) => {
                    buffer.extend_from_slice(&color.rgb());
                    buffer.push(alpha);
                }
                None => buffer.extend_from_slice(&[0, 0, 0, 0]),
            }
        }
        Some((grid.width as u32, grid.height as u32, buffer))
    }

    /// Write the top layer as a PNG
    #[cfg(feature = "image")]
    pub fn render_png(&self, path: &Path) -> anyhow::Result<()> {
        let (width, height, buffer) = self
            .render_rgba()
            .context("No temperature layer to render")?;
        let image = image::RgbaImage::from_raw(width, height, buffer)
            .context("Layer buffer does not match its dimensions")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create output directory: {:?}", parent))?;
        }
        image
            .save(path)
            .context(format!("Failed to write PNG: {:?}", path))?;
        Ok(())
    }
}

impl DisplaySurface for MapView {
    fn reset_layers(&mut self) {
        self.layers.clear();
    }

    fn add_layer(&mut self, layer: MapLayer) -> LayerId {
        let id = self.next_id;
        self.next_id += 1;
        self.layers.push((id, layer));
        id
    }

    fn set_layer_opacity(&mut self, id: LayerId, opacity: f64) -> Result<(), LstError> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(LstError::InvalidOpacity(opacity));
        }
        let (_, layer) = self
            .layers
            .iter_mut()
            .find(|(layer_id, _)| *layer_id == id)
            .ok_or(LstError::NoLayer)?;
        layer.opacity = opacity;
        Ok(())
    }

    fn set_center(&mut self, lon: f64, lat: f64, zoom: u8) {
        self.center = Some((lon, lat, zoom));
    }

    fn set_base_map(&mut self, base_map: BaseMap) {
        self.base_map = Some(base_map);
    }

    fn set_control_visibility(&mut self, controls: ControlVisibility) {
        self.controls = Some(controls);
    }

    fn set_legend(&mut self, legend: Legend) {
        self.legend = Some(legend);
    }

    fn notify(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }
}
