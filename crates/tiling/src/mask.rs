use std::collections::BTreeSet;

use image::{GrayImage, Luma, imageops::FilterType};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, TilingError},
    types::PixelRect,
};

/// Label grid aligned to one magnification; 0 is background.
#[derive(Debug, Clone)]
pub struct LabelMask {
    image: GrayImage,
    magnification: f64,
}

impl LabelMask {
    pub fn new(image: GrayImage, magnification: f64) -> Result<Self> {
        if !(magnification.is_finite() && magnification > 0.0) {
            return Err(TilingError::InvalidMask(format!(
                "mask magnification must be positive, got {magnification}"
            )));
        }
        Ok(Self { image, magnification })
    }

    /// Load a mask image from file, keeping the first channel as the label.
    pub fn open<P: AsRef<std::path::Path>>(path: P, magnification: f64) -> Result<Self> {
        let image = image::open(path)?.to_luma8();
        Self::new(image, magnification)
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn magnification(&self) -> f64 {
        self.magnification
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn label(&self, x: u32, y: u32) -> u8 {
        self.image.get_pixel(x, y).0[0]
    }

    pub fn is_empty(&self, selector: &ForegroundSelector) -> bool {
        !self.image.pixels().any(|p| selector.matches(p.0[0]))
    }
}

/// Which mask labels count as foreground.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", content = "labels", rename_all = "snake_case")]
pub enum ForegroundSelector {
    /// Any label greater than zero
    #[default]
    Any,
    /// Only the listed labels
    Labels(BTreeSet<u8>),
}

impl ForegroundSelector {
    pub fn labels<I: IntoIterator<Item = u8>>(labels: I) -> Self {
        Self::Labels(labels.into_iter().collect())
    }

    pub fn matches(&self, label: u8) -> bool {
        match self {
            Self::Any => label > 0,
            Self::Labels(labels) => label > 0 && labels.contains(&label),
        }
    }
}

/// Summed-area table over the foreground predicate of a mask.
///
/// Answers "how many foreground pixels fall in this rectangle" in constant
/// time. Pixels outside the mask count as background.
#[derive(Debug, Clone)]
pub struct CoverageIndex {
    width: u32,
    height: u32,
    // (width + 1) * (height + 1), row-major, first row and column are zero
    sums: Vec<u64>,
}

impl CoverageIndex {
    pub fn new(mask: &LabelMask, selector: &ForegroundSelector) -> Self {
        let width = mask.width();
        let height = mask.height();
        let stride = width as usize + 1;
        let mut sums = vec![0u64; stride * (height as usize + 1)];

        for y in 0..height as usize {
            let mut row = 0u64;
            for x in 0..width as usize {
                if selector.matches(mask.label(x as u32, y as u32)) {
                    row += 1;
                }
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }

        Self { width, height, sums }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Foreground pixels of the whole mask.
    pub fn total(&self) -> u64 {
        self.sums[self.sums.len() - 1]
    }

    /// Foreground pixels inside `rect`, clipped to the mask.
    pub fn count(&self, rect: &PixelRect) -> u64 {
        let x0 = rect.x.clamp(0, i64::from(self.width)) as usize;
        let y0 = rect.y.clamp(0, i64::from(self.height)) as usize;
        let x1 = rect.right().clamp(0, i64::from(self.width)) as usize;
        let y1 = rect.bottom().clamp(0, i64::from(self.height)) as usize;
        if x1 <= x0 || y1 <= y0 {
            return 0;
        }

        let stride = self.width as usize + 1;
        let at = |x: usize, y: usize| self.sums[y * stride + x];
        at(x1, y1) + at(x0, y0) - at(x0, y1) - at(x1, y0)
    }

    /// Foreground fraction of `rect`; the full rectangle area is the denominator.
    pub fn ratio(&self, rect: &PixelRect) -> f64 {
        if rect.is_empty() {
            return 0.0;
        }
        self.count(rect) as f64 / rect.area() as f64
    }
}

/// Merge a tissue foreground mask with an annotation mask.
///
/// Pixels that are foreground in both keep the annotation label, every other
/// pixel becomes background. An annotation mask of a different shape is
/// resampled to the foreground shape with nearest-neighbour interpolation.
pub fn merge_masks(foreground: &LabelMask, annotations: &LabelMask) -> Result<LabelMask> {
    let (width, height) = (foreground.width(), foreground.height());
    let resized;
    let annotation_image = if annotations.image().dimensions() != (width, height) {
        resized = image::imageops::resize(annotations.image(), width, height, FilterType::Nearest);
        &resized
    } else {
        annotations.image()
    };

    let merged = GrayImage::from_fn(width, height, |x, y| {
        let fg = foreground.label(x, y);
        let ann = annotation_image.get_pixel(x, y).0[0];
        if fg != 0 && ann != 0 { Luma([ann]) } else { Luma([0]) }
    });

    LabelMask::new(merged, foreground.magnification())
}
