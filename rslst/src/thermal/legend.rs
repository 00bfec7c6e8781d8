use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::collect::global_variables::PALETTE;
use crate::commons::basic_functions::format_celsius;
use crate::error::LstError;
use crate::thermal::stats::RegionStats;

/// `#RRGGBB` color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl HexColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        HexColor { r, g, b }
    }

    pub fn rgb(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// Linear blend between `self` (t = 0) and `other` (t = 1)
    pub fn lerp(&self, other: &HexColor, t: f64) -> HexColor {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        HexColor::new(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
        )
    }
}

impl FromStr for HexColor {
    type Err = LstError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        let invalid = || LstError::InvalidLegend(format!("'{}' is not a #RRGGBB color", s));
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        Ok(HexColor::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl TryFrom<String> for HexColor {
    type Error = LstError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HexColor> for String {
    fn from(color: HexColor) -> Self {
        color.to_string()
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Yellow to dark red temperature ramp
pub fn default_palette() -> Vec<HexColor> {
    PALETTE.iter().filter_map(|c| c.parse().ok()).collect()
}

/// Visualization parameters of a temperature layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisParams {
    pub min: f64,
    pub max: f64,
    pub palette: Vec<HexColor>,
}

impl VisParams {
    /// Continuous color of `value`: the palette is stretched over [min, max] and values
    /// outside are clamped. A flat range maps everything to the first color.
    pub fn color_at(&self, value: f64) -> Option<HexColor> {
        let first = *self.palette.first()?;
        if !value.is_finite() {
            return None;
        }
        let span = self.max - self.min;
        if self.palette.len() == 1 || span <= 0.0 {
            return Some(first);
        }
        let t = ((value - self.min) / span).clamp(0.0, 1.0);
        let position = t * (self.palette.len() - 1) as f64;
        let lower = position.floor() as usize;
        let upper = (lower + 1).min(self.palette.len() - 1);
        Some(self.palette[lower].lerp(&self.palette[upper], position - lower as f64))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub value: f64,
    pub color: HexColor,
    pub label: String,
}

/// Discrete color ramp shown next to the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Legend {
    pub title: String,
    pub entries: Vec<LegendEntry>,
    pub vis: VisParams,
}

/// Palette index of legend step `step` out of `steps`: floor(step * (len - 1) / steps)
pub fn palette_index(step: usize, steps: usize, palette_len: usize) -> usize {
    step * palette_len.saturating_sub(1) / steps
}

impl Legend {
    /// Build `steps + 1` entries evenly spaced between `min` and `max`.
    ///
    /// When `min == max` every entry repeats the same value; the entries are kept so the
    /// panel keeps its shape.
    pub fn build(
        title: &str,
        min: f64,
        max: f64,
        palette: &[HexColor],
        steps: usize,
    ) -> Result<Self, LstError> {
        if steps == 0 {
            return Err(LstError::InvalidLegend(
                "at least one step is required".to_string(),
            ));
        }
        if palette.is_empty() {
            return Err(LstError::InvalidLegend("palette is empty".to_string()));
        }
        if !min.is_finite() || !max.is_finite() {
            return Err(LstError::InvalidLegend(format!(
                "range must be finite, got [{}, {}]",
                min, max
            )));
        }

        let entries = (0..=steps)
            .map(|i| {
                let value = min + (max - min) * (i as f64 / steps as f64);
                LegendEntry {
                    value,
                    color: palette[palette_index(i, steps, palette.len())],
                    label: format_celsius(value),
                }
            })
            .collect();

        Ok(Legend {
            title: title.to_string(),
            entries,
            vis: VisParams {
                min,
                max,
                palette: palette.to_vec(),
            },
        })
    }

    /// Legend keyed off the min/max statistics of `band`
    pub fn from_stats(
        title: &str,
        stats: &RegionStats,
        band: &str,
        palette: &[HexColor],
        steps: usize,
    ) -> Result<Self, LstError> {
        let (min, max) = stats.range(band)?;
        Self::build(title, min, max, palette, steps)
    }

    pub fn min(&self) -> f64 {
        self.vis.min
    }

    pub fn max(&self) -> f64 {
        self.vis.max
    }

    pub fn color_at(&self, value: f64) -> Option<HexColor> {
        self.vis.color_at(value)
    }

    /// Plain-text rendering of the legend panel
    pub fn to_text(&self) -> String {
        let mut text = self.title.clone();
        for entry in &self.entries {
            text.push_str(&format!("\n  {:>8}  {}", entry.label, entry.color));
        }
        text
    }
}
