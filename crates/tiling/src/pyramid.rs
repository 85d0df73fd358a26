//! Pyramid level table and coordinate mapping between magnifications.
//!
//! Every level carries a scale factor relative to the level-0 (finest)
//! coordinate system. Mapping between two magnifications multiplies all
//! coordinates and sizes by `scale_to / scale_from` and rounds half-up, so
//! mapping the same input twice always gives the same pixels.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, TilingError},
    types::{PixelRect, TileAnchor},
};

/// Relative tolerance used when no explicit one is configured.
pub const DEFAULT_MAGNIFICATION_TOLERANCE: f64 = 0.01;

/// Round half-up to the nearest integer pixel.
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PyramidLevel {
    pub magnification: f64,
    /// Pixels per level-0 pixel
    pub scale: f64,
}

impl PyramidLevel {
    pub fn new(magnification: f64, scale: f64) -> Self {
        Self { magnification, scale }
    }
}

/// Validated level table of one whole-slide image, sorted by magnification.
#[derive(Debug, Clone, PartialEq)]
pub struct Pyramid {
    levels: Vec<PyramidLevel>,
    tolerance: f64,
}

impl Pyramid {
    pub fn new(mut levels: Vec<PyramidLevel>) -> Result<Self> {
        if levels.is_empty() {
            return Err(TilingError::InvalidPyramid("no levels".to_string()));
        }
        if let Some(level) = levels.iter().find(|l| {
            !(l.magnification.is_finite() && l.magnification > 0.0 && l.scale.is_finite() && l.scale > 0.0)
        }) {
            return Err(TilingError::InvalidPyramid(format!(
                "level {}x has non-positive magnification or scale {}",
                level.magnification, level.scale
            )));
        }

        levels.sort_by(|a, b| a.magnification.total_cmp(&b.magnification));
        for pair in levels.windows(2) {
            if pair[1].magnification == pair[0].magnification || pair[1].scale <= pair[0].scale {
                return Err(TilingError::InvalidPyramid(format!(
                    "scale must strictly increase with magnification ({}x -> {}, {}x -> {})",
                    pair[0].magnification, pair[0].scale, pair[1].magnification, pair[1].scale
                )));
            }
        }

        Ok(Self {
            levels,
            tolerance: DEFAULT_MAGNIFICATION_TOLERANCE,
        })
    }

    /// Build the level table from a base magnification and per-level downsample factors.
    pub fn from_downsamples(base_magnification: f64, downsamples: &[f64]) -> Result<Self> {
        if downsamples.iter().any(|d| !(d.is_finite() && *d > 0.0)) {
            return Err(TilingError::InvalidPyramid(format!(
                "downsample factors must be positive: {:?}",
                downsamples
            )));
        }
        let levels = downsamples
            .iter()
            .map(|d| PyramidLevel::new(base_magnification / d, 1.0 / d))
            .collect();
        Self::new(levels)
    }

    /// Relative tolerance for matching a requested magnification to a level.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn levels(&self) -> &[PyramidLevel] {
        &self.levels
    }

    pub fn magnifications(&self) -> Vec<f64> {
        self.levels.iter().map(|l| l.magnification).collect()
    }

    /// Scale factor for a magnification.
    ///
    /// An existing level within tolerance is used as is. Otherwise the scale is
    /// derived from the nearest finer level, which can always be downsampled.
    /// Nothing can be derived above the finest level.
    pub fn scale_for(&self, magnification: f64) -> Result<f64> {
        if !(magnification.is_finite() && magnification > 0.0) {
            return Err(self.unsupported(magnification));
        }

        if let Some(level) = self
            .levels
            .iter()
            .find(|l| (l.magnification - magnification).abs() <= self.tolerance * magnification)
        {
            return Ok(level.scale);
        }

        self.levels
            .iter()
            .find(|l| l.magnification > magnification)
            .map(|finer| finer.scale * magnification / finer.magnification)
            .ok_or_else(|| self.unsupported(magnification))
    }

    /// Mapper from coordinates at `from` to coordinates at `to`.
    pub fn mapper(&self, from: f64, to: f64) -> Result<CoordinateMapper> {
        let scale_from = self.scale_for(from)?;
        let scale_to = self.scale_for(to)?;
        Ok(CoordinateMapper {
            from,
            to,
            ratio: scale_to / scale_from,
        })
    }

    fn unsupported(&self, magnification: f64) -> TilingError {
        TilingError::UnsupportedMagnification {
            magnification,
            available: self.magnifications(),
        }
    }
}

/// Converts points and rectangles between two magnifications of one pyramid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    from: f64,
    to: f64,
    ratio: f64,
}

impl CoordinateMapper {
    pub fn identity(magnification: f64) -> Self {
        Self {
            from: magnification,
            to: magnification,
            ratio: 1.0,
        }
    }

    pub fn from_magnification(&self) -> f64 {
        self.from
    }

    pub fn to_magnification(&self) -> f64 {
        self.to
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn inverse(&self) -> Self {
        Self {
            from: self.to,
            to: self.from,
            ratio: 1.0 / self.ratio,
        }
    }

    pub fn map_coord(&self, value: i64) -> i64 {
        round_half_up(value as f64 * self.ratio)
    }

    pub fn map_length(&self, value: u32) -> u32 {
        round_half_up(f64::from(value) * self.ratio).clamp(0, i64::from(u32::MAX)) as u32
    }

    pub fn map_point(&self, x: i64, y: i64) -> (i64, i64) {
        (self.map_coord(x), self.map_coord(y))
    }

    pub fn map_rect(&self, rect: &PixelRect) -> PixelRect {
        PixelRect::new(
            self.map_coord(rect.x),
            self.map_coord(rect.y),
            self.map_length(rect.width),
            self.map_length(rect.height),
        )
    }

    pub fn map_anchor(&self, anchor: &TileAnchor) -> TileAnchor {
        TileAnchor::new(
            self.map_coord(anchor.x),
            self.map_coord(anchor.y),
            self.map_length(anchor.size),
        )
    }
}
