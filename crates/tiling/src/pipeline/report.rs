use serde::Serialize;

use crate::{
    error::TilingError,
    types::{BoundingBox, TileRecord},
};

/// Counters of one source's run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TileStats {
    /// Anchors generated over all boxes, duplicates included
    pub candidates: usize,
    pub good: usize,
    pub bad: usize,
    pub rejected: usize,
    pub duplicates: usize,
}

impl TileStats {
    pub fn accepted(&self) -> usize {
        self.good + self.bad
    }
}

/// Ordered output of one source
#[derive(Debug, Clone, Serialize)]
pub struct SourceTiles {
    pub source: String,
    pub boxes: Vec<BoundingBox>,
    pub records: Vec<TileRecord>,
    /// Boxes skipped because a tile did not fit them
    pub skipped_boxes: usize,
    pub stats: TileStats,
}

impl SourceTiles {
    pub fn empty(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            boxes: Vec::new(),
            records: Vec::new(),
            skipped_boxes: 0,
            stats: TileStats::default(),
        }
    }

    pub fn tile_count(&self) -> usize {
        self.stats.accepted()
    }

    /// Records at one magnification, in output order
    pub fn records_at(&self, magnification: f64) -> impl Iterator<Item = &TileRecord> {
        self.records.iter().filter(move |r| r.magnification == magnification)
    }
}

/// Result of one source within a run
#[derive(Debug)]
pub struct SourceOutcome {
    pub source: String,
    pub result: Result<SourceTiles, TilingError>,
}

/// Per-source outcomes of a run, in input order
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<SourceOutcome>,
}

impl RunReport {
    pub fn successes(&self) -> impl Iterator<Item = &SourceTiles> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &TilingError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.source.as_str(), e)))
    }

    pub fn total_records(&self) -> usize {
        self.successes().map(|s| s.records.len()).sum()
    }

    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| o.result.is_err())
    }
}
