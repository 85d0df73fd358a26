use geo_types::{Coord, Polygon, Rect};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

/// Axis-aligned pixel rectangle in the coordinate system of one magnification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct PixelRect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn square(x: i64, y: i64, size: u32) -> Self {
        Self::new(x, y, size, size)
    }

    /// Exclusive right edge
    pub fn right(&self) -> i64 {
        self.x + i64::from(self.width)
    }

    /// Exclusive bottom edge
    pub fn bottom(&self) -> i64 {
        self.y + i64::from(self.height)
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains_point(&self, x: i64, y: i64) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Convert to a geo-types polygon for overlay export
    pub fn to_geo_polygon(&self) -> Polygon<f64> {
        Rect::new(
            Coord { x: self.x as f64, y: self.y as f64 },
            Coord { x: self.right() as f64, y: self.bottom() as f64 },
        )
        .to_polygon()
    }
}

/// Bounding box of one mask region, in mask-magnification pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Opaque class id carried over from the mask
    pub label: u8,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32, label: u8) -> Self {
        Self { x, y, width, height, label }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn rect(&self) -> PixelRect {
        PixelRect::new(i64::from(self.x), i64::from(self.y), self.width, self.height)
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    /// Deterministic ordering key: top-left y, then x, then size and label.
    pub(crate) fn sort_key(&self) -> (u32, u32, u32, u32, u8) {
        (self.y, self.x, self.height, self.width, self.label)
    }
}

/// Top-left corner of a candidate square tile at the reference magnification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct TileAnchor {
    pub x: i64,
    pub y: i64,
    pub size: u32,
}

impl TileAnchor {
    pub fn new(x: i64, y: i64, size: u32) -> Self {
        Self { x, y, size }
    }

    pub fn rect(&self) -> PixelRect {
        PixelRect::square(self.x, self.y, self.size)
    }
}

#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq, Hash
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AcceptReason {
    /// Coverage reached the foreground threshold
    Good,
    /// Below threshold, let through by the per-source bad-tile budget
    Bad,
}

/// One accepted tile at one magnification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TileRecord {
    pub source: String,
    pub magnification: f64,
    pub x: i64,
    pub y: i64,
    pub size: u32,
    /// Foreground fraction in [0, 1], measured once at the reference magnification
    pub foreground_ratio: f64,
    pub reason: AcceptReason,
    /// Logical tile identity shared by all magnifications of the same tile
    pub tile_index: usize,
    /// Index of the bounding box whose grid produced the tile
    pub box_index: usize,
    pub label: u8,
}

impl TileRecord {
    pub fn rect(&self) -> PixelRect {
        PixelRect::square(self.x, self.y, self.size)
    }
}
