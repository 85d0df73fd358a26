use crate::{
    error::{Result, TilingError},
    types::{PixelRect, TileAnchor},
};

/// Regular anchor grid over one region at the reference magnification.
///
/// Anchors sit at `(x + i * stride, y + j * stride)` for every `i`, `j` whose
/// tile stays within the region extended by `tile_size - stride` pixels past
/// its right and bottom edges. With zero overlap the tiles partition the
/// region's top-left `floor(w / size) x floor(h / size)` cells exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    origin_x: i64,
    origin_y: i64,
    columns: u32,
    rows: u32,
    stride: u32,
    tile_size: u32,
}

impl TileGrid {
    pub fn new(region: &PixelRect, tile_size: u32, stride: u32, allow_oversized: bool) -> Result<Self> {
        if tile_size == 0 || stride == 0 || stride > tile_size {
            return Err(TilingError::InvalidConfiguration(format!(
                "grid needs 0 < stride <= tile_size, got stride {stride} and tile_size {tile_size}"
            )));
        }

        if tile_size > region.width || tile_size > region.height {
            if !allow_oversized {
                return Err(TilingError::TileLargerThanRegion {
                    tile_size,
                    width: region.width,
                    height: region.height,
                });
            }
            return Ok(Self {
                origin_x: region.x,
                origin_y: region.y,
                columns: 1,
                rows: 1,
                stride,
                tile_size,
            });
        }

        Ok(Self {
            origin_x: region.x,
            origin_y: region.y,
            columns: region.width / stride,
            rows: region.height / stride,
            stride,
            tile_size,
        })
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn len(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn anchor(&self, column: u32, row: u32) -> TileAnchor {
        TileAnchor::new(
            self.origin_x + i64::from(column) * i64::from(self.stride),
            self.origin_y + i64::from(row) * i64::from(self.stride),
            self.tile_size,
        )
    }

    /// Row-major anchors; each call starts over from the first one.
    pub fn iter(&self) -> TileGridIter {
        TileGridIter {
            grid: *self,
            next: 0,
        }
    }
}

impl<'a> IntoIterator for &'a TileGrid {
    type Item = TileAnchor;
    type IntoIter = TileGridIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct TileGridIter {
    grid: TileGrid,
    next: usize,
}

impl Iterator for TileGridIter {
    type Item = TileAnchor;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.grid.len() {
            return None;
        }
        let columns = self.grid.columns as usize;
        let anchor = self.grid.anchor((self.next % columns) as u32, (self.next / columns) as u32);
        self.next += 1;
        Some(anchor)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for TileGridIter {}
