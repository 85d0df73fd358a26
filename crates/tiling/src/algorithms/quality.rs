use crate::{
    mask::CoverageIndex,
    pyramid::CoordinateMapper,
    types::{AcceptReason, PixelRect, TileAnchor},
};

// Absorbs float noise in `ratio * 100` for thresholds like 29 %
const THRESHOLD_EPSILON: f64 = 1e-9;

/// Below-threshold tiles one source may still accept.
///
/// Created per source and passed by reference; never shared across sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadTileBudget {
    limit: u32,
    remaining: u32,
}

impl BadTileBudget {
    pub fn new(limit: u32) -> Self {
        Self { limit, remaining: limit }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn used(&self) -> u32 {
        self.limit - self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Take one unit if any is left.
    pub fn try_consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept(AcceptReason),
    Reject,
}

/// Measures tile coverage against the mask and applies the accept policy.
#[derive(Debug, Clone, Copy)]
pub struct QualityFilter<'a> {
    index: &'a CoverageIndex,
    to_mask: CoordinateMapper,
    threshold: f64,
}

impl<'a> QualityFilter<'a> {
    /// `to_mask` maps reference-magnification coordinates onto the mask;
    /// `threshold` is a percentage.
    pub fn new(index: &'a CoverageIndex, to_mask: CoordinateMapper, threshold: f64) -> Self {
        Self { index, to_mask, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Window of the tile on the mask grid, at least one mask pixel wide.
    pub fn mask_window(&self, anchor: &TileAnchor) -> PixelRect {
        let mut window = self.to_mask.map_rect(&anchor.rect());
        window.width = window.width.max(1);
        window.height = window.height.max(1);
        window
    }

    /// Foreground fraction of the tile, in [0, 1].
    pub fn coverage(&self, anchor: &TileAnchor) -> f64 {
        self.index.ratio(&self.mask_window(anchor))
    }

    pub fn is_good(&self, coverage: f64) -> bool {
        coverage * 100.0 + THRESHOLD_EPSILON >= self.threshold
    }

    /// Good tiles always pass; bad ones pass while the budget lasts.
    pub fn decide(&self, coverage: f64, budget: &mut BadTileBudget) -> Decision {
        if self.is_good(coverage) {
            Decision::Accept(AcceptReason::Good)
        } else if budget.try_consume() {
            Decision::Accept(AcceptReason::Bad)
        } else {
            Decision::Reject
        }
    }

    pub fn evaluate(&self, anchor: &TileAnchor, budget: &mut BadTileBudget) -> (f64, Decision) {
        let coverage = self.coverage(anchor);
        (coverage, self.decide(coverage, budget))
    }
}
