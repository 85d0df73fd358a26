use crate::{
    error::Result,
    mask::LabelMask,
    pyramid::Pyramid,
    types::{BoundingBox, TileRecord},
};

/// Trait for turning a label mask into bounding boxes
pub trait BoxRasterizer: Send + Sync {
    /// Boxes covering the foreground, in a deterministic order
    fn rasterize(&self, mask: &LabelMask) -> Result<Vec<BoundingBox>>;
}

/// Supplies the quality mask of a source
pub trait MaskProvider: Send + Sync {
    fn mask(&self, source: &str) -> Result<LabelMask>;
}

/// Supplies the pyramid level table of a source
pub trait PyramidProvider: Send + Sync {
    fn pyramid(&self, source: &str) -> Result<Pyramid>;
}

/// Receives the ordered tile records of one source
pub trait TileRecordSink {
    fn write_source(&mut self, source: &str, records: &[TileRecord]) -> Result<()>;
}
