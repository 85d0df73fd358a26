use crate::{
    config::ProjectionMode,
    error::Result,
    pyramid::{CoordinateMapper, Pyramid, round_half_up},
    types::{PixelRect, TileAnchor},
};

/// Geometry of one accepted tile at one magnification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedTile {
    pub magnification: f64,
    pub rect: PixelRect,
}

/// Expresses reference-magnification tiles at every target magnification.
///
/// Coverage is never re-measured here; callers attach the reference
/// measurement to every projection of the same tile.
#[derive(Debug, Clone)]
pub struct MultiMagnificationProjector {
    mappers: Vec<CoordinateMapper>,
    mode: ProjectionMode,
}

impl MultiMagnificationProjector {
    /// Resolves every target up front so unsupported magnifications fail
    /// before any tile is produced. Repeated targets are kept once.
    pub fn new(pyramid: &Pyramid, reference: f64, targets: &[f64], mode: ProjectionMode) -> Result<Self> {
        let mut mappers: Vec<CoordinateMapper> = Vec::with_capacity(targets.len());
        for &target in targets {
            if mappers.iter().any(|m| m.to_magnification() == target) {
                continue;
            }
            mappers.push(pyramid.mapper(reference, target)?);
        }
        Ok(Self::from_mappers(mappers, mode))
    }

    pub fn from_mappers(mappers: Vec<CoordinateMapper>, mode: ProjectionMode) -> Self {
        Self { mappers, mode }
    }

    pub fn magnifications(&self) -> Vec<f64> {
        self.mappers.iter().map(CoordinateMapper::to_magnification).collect()
    }

    /// One projection per target, in target order.
    pub fn project(&self, anchor: &TileAnchor) -> Vec<ProjectedTile> {
        self.mappers
            .iter()
            .map(|mapper| ProjectedTile {
                magnification: mapper.to_magnification(),
                rect: self.project_one(mapper, anchor),
            })
            .collect()
    }

    fn project_one(&self, mapper: &CoordinateMapper, anchor: &TileAnchor) -> PixelRect {
        match self.mode {
            ProjectionMode::ScaleRegion => mapper.map_anchor(anchor).rect(),
            ProjectionMode::FixedSizeCentered => {
                // sub-pixel centre, so odd sizes map onto themselves at ratio 1
                let half = f64::from(anchor.size) / 2.0;
                let ratio = mapper.ratio();
                let x = round_half_up((anchor.x as f64 + half) * ratio - half);
                let y = round_half_up((anchor.y as f64 + half) * ratio - half);
                PixelRect::square(x, y, anchor.size)
            }
        }
    }
}
