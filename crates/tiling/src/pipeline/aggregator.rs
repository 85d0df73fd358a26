use crate::{
    algorithms::ProjectedTile,
    types::{AcceptReason, TileRecord},
};

/// Collects one record per (tile, magnification) for a single source, in
/// the order tiles are pushed.
#[derive(Debug, Clone)]
pub struct TileRecordAggregator {
    source: String,
    records: Vec<TileRecord>,
    tiles: usize,
}

impl TileRecordAggregator {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            records: Vec::new(),
            tiles: 0,
        }
    }

    /// Append every projection of one accepted tile; returns its tile index.
    pub fn push(
        &mut self,
        box_index: usize,
        label: u8,
        foreground_ratio: f64,
        reason: AcceptReason,
        projections: &[ProjectedTile],
    ) -> usize {
        let tile_index = self.tiles;
        self.tiles += 1;
        self.records.extend(projections.iter().map(|p| TileRecord {
            source: self.source.clone(),
            magnification: p.magnification,
            x: p.rect.x,
            y: p.rect.y,
            size: p.rect.width,
            foreground_ratio,
            reason,
            tile_index,
            box_index,
            label,
        }));
        tile_index
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tile_count(&self) -> usize {
        self.tiles
    }

    pub fn records(&self) -> &[TileRecord] {
        &self.records
    }

    pub fn finish(self) -> Vec<TileRecord> {
        self.records
    }
}
