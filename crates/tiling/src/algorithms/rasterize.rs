use std::collections::BTreeMap;

use image::{GrayImage, Luma};
use imageproc::region_labelling::connected_components;

use crate::{
    config::{Connectivity, StripeConfig, TilingConfig},
    error::{Result, TilingError},
    mask::{ForegroundSelector, LabelMask},
    traits::BoxRasterizer,
    types::BoundingBox,
};

/// Inclusive pixel extent of one connected component
#[derive(Debug, Clone, Copy)]
struct Extent {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    label: u8,
}

impl Extent {
    fn new(x: u32, y: u32, label: u8) -> Self {
        Self { min_x: x, min_y: y, max_x: x, max_y: y, label }
    }

    fn include(&mut self, x: u32, y: u32, label: u8) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.label = self.label.max(label);
    }

    fn to_box(self) -> BoundingBox {
        BoundingBox::new(
            self.min_x,
            self.min_y,
            self.max_x - self.min_x + 1,
            self.max_y - self.min_y + 1,
            self.label,
        )
    }
}

/// Connected-component rasterizer.
///
/// Labels the foreground with the configured connectivity, takes each
/// component's minimal bounding rectangle and drops rectangles whose area is
/// below `min_area`. Pixels of dropped components are not covered by any box.
/// Optionally splits the surviving rectangles into horizontal stripes.
/// Output is sorted by top-left y, then x.
#[derive(Debug, Clone)]
pub struct ComponentRasterizer {
    pub connectivity: Connectivity,
    pub min_area: u64,
    pub selector: ForegroundSelector,
    /// Pixels of different labels never join the same component
    pub split_by_label: bool,
    pub stripe: Option<StripeConfig>,
}

impl Default for ComponentRasterizer {
    fn default() -> Self {
        Self::new(Connectivity::Eight)
    }
}

impl ComponentRasterizer {
    pub fn new(connectivity: Connectivity) -> Self {
        Self {
            connectivity,
            min_area: 0,
            selector: ForegroundSelector::Any,
            split_by_label: false,
            stripe: None,
        }
    }

    pub fn from_config(config: &TilingConfig) -> Self {
        Self {
            connectivity: config.connectivity,
            min_area: config.min_box_area,
            selector: config.foreground.clone(),
            split_by_label: config.split_by_label,
            stripe: config.stripe,
        }
    }

    pub fn with_min_area(mut self, min_area: u64) -> Self {
        self.min_area = min_area;
        self
    }

    pub fn with_stripes(mut self, stripe: StripeConfig) -> Self {
        self.stripe = Some(stripe);
        self
    }

    pub fn with_selector(mut self, selector: ForegroundSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Component extents keyed by component id, plus the component id image.
    fn label_components(&self, mask: &LabelMask) -> (image::ImageBuffer<Luma<u32>, Vec<u32>>, BTreeMap<u32, Extent>) {
        // Step 1: reduce the mask to the foreground predicate
        let foreground = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
            let label = mask.label(x, y);
            if !self.selector.matches(label) {
                Luma([0])
            } else if self.split_by_label {
                Luma([label])
            } else {
                Luma([255])
            }
        });

        // Step 2: connected components, equal values only join each other
        let components = connected_components(&foreground, self.connectivity.into(), Luma([0u8]));

        // Step 3: extents
        let mut extents: BTreeMap<u32, Extent> = BTreeMap::new();
        for (x, y, pixel) in components.enumerate_pixels() {
            let id = pixel.0[0];
            if id == 0 {
                continue;
            }
            let label = mask.label(x, y);
            extents
                .entry(id)
                .and_modify(|e| e.include(x, y, label))
                .or_insert_with(|| Extent::new(x, y, label));
        }

        (components, extents)
    }

    /// Minimal bounding boxes of every component, without area filtering or striping.
    pub fn component_boxes(&self, mask: &LabelMask) -> Vec<BoundingBox> {
        let (_, extents) = self.label_components(mask);
        let mut boxes: Vec<BoundingBox> = extents.into_values().map(Extent::to_box).collect();
        boxes.sort_by_key(BoundingBox::sort_key);
        boxes
    }

    fn stripes(
        &self,
        stripe: StripeConfig,
        mask: &LabelMask,
        components: &image::ImageBuffer<Luma<u32>, Vec<u32>>,
        extents: &BTreeMap<u32, Extent>,
    ) -> Vec<BoundingBox> {
        // x-extent of every (component, stripe) pair that holds component pixels
        let mut spans: BTreeMap<(u32, u32), (u32, u32)> = BTreeMap::new();
        for (x, y, pixel) in components.enumerate_pixels() {
            let Some(extent) = extents.get(&pixel.0[0]) else {
                continue;
            };
            let stripe_index = (y - extent.min_y) / stripe.height;
            spans
                .entry((pixel.0[0], stripe_index))
                .and_modify(|(lo, hi)| {
                    *lo = (*lo).min(x);
                    *hi = (*hi).max(x);
                })
                .or_insert((x, x));
        }

        spans
            .into_iter()
            .map(|((id, stripe_index), (lo, hi))| {
                let extent = &extents[&id];
                let top = extent.min_y + stripe_index * stripe.height;
                let bottom = (top + stripe.height).min(extent.max_y + 1);
                let left = lo.saturating_sub(stripe.buffer);
                let right = (hi + 1).saturating_add(stripe.buffer).min(mask.width());
                BoundingBox::new(left, top, right - left, bottom - top, extent.label)
            })
            .collect()
    }
}

impl BoxRasterizer for ComponentRasterizer {
    fn rasterize(&self, mask: &LabelMask) -> Result<Vec<BoundingBox>> {
        if let Some(StripeConfig { height: 0, .. }) = self.stripe {
            return Err(TilingError::InvalidConfiguration("stripe height must be positive".to_string()));
        }

        let (components, mut extents) = self.label_components(mask);

        let before = extents.len();
        extents.retain(|_, extent| extent.to_box().area() >= self.min_area);
        if extents.len() < before {
            tracing::debug!(
                dropped = before - extents.len(),
                min_area = self.min_area,
                "dropped small components"
            );
        }

        let mut boxes = match self.stripe {
            Some(stripe) => self.stripes(stripe, mask, &components, &extents),
            None => extents.into_values().map(Extent::to_box).collect(),
        };
        boxes.sort_by_key(BoundingBox::sort_key);
        Ok(boxes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from_rows(rows: &[&str]) -> LabelMask {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        let img = GrayImage::from_fn(width, height, |x, y| {
            let c = rows[y as usize].as_bytes()[x as usize];
            Luma([if c == b'.' { 0 } else { c - b'0' }])
        });
        LabelMask::new(img, 1.25).unwrap()
    }

    /// Deterministic pseudo-random mask
    fn speckled_mask(width: u32, height: u32, seed: u64) -> LabelMask {
        let mut state = seed;
        let img = GrayImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            Luma([if (state >> 33) % 3 == 0 { ((state >> 40) % 3 + 1) as u8 } else { 0 }])
        });
        LabelMask::new(img, 1.25).unwrap()
    }

    fn covered(boxes: &[BoundingBox], x: u32, y: u32) -> bool {
        boxes.iter().any(|b| b.contains(x, y))
    }

    #[test]
    fn test_empty_mask_yields_no_boxes() {
        let mask = LabelMask::new(GrayImage::new(64, 64), 1.25).unwrap();
        let boxes = ComponentRasterizer::default().rasterize(&mask).unwrap();
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_single_component_box() {
        let mask = mask_from_rows(&[
            "......",
            "..11..",
            ".111..",
            "......",
        ]);
        let boxes = ComponentRasterizer::default().rasterize(&mask).unwrap();
        assert_eq!(boxes, vec![BoundingBox::new(1, 1, 3, 2, 1)]);
    }

    #[test]
    fn test_connectivity_controls_diagonal_merge() {
        let mask = mask_from_rows(&[
            "1...",
            ".1..",
            "..1.",
        ]);
        let eight = ComponentRasterizer::new(Connectivity::Eight).rasterize(&mask).unwrap();
        assert_eq!(eight, vec![BoundingBox::new(0, 0, 3, 3, 1)]);

        let four = ComponentRasterizer::new(Connectivity::Four).rasterize(&mask).unwrap();
        assert_eq!(
            four,
            vec![
                BoundingBox::new(0, 0, 1, 1, 1),
                BoundingBox::new(1, 1, 1, 1, 1),
                BoundingBox::new(2, 2, 1, 1, 1),
            ]
        );
    }

    #[test]
    fn test_boxes_sorted_by_y_then_x() {
        let mask = mask_from_rows(&[
            "....11",
            "11....",
            "......",
            "..1...",
        ]);
        let boxes = ComponentRasterizer::new(Connectivity::Four).rasterize(&mask).unwrap();
        let origins: Vec<(u32, u32)> = boxes.iter().map(|b| (b.x, b.y)).collect();
        assert_eq!(origins, vec![(4, 0), (0, 1), (2, 3)]);
    }

    #[test]
    fn test_min_area_drops_small_components_entirely() {
        let mask = mask_from_rows(&[
            "111.....",
            "111....2",
            "111.....",
        ]);
        let boxes = ComponentRasterizer::default().with_min_area(4).rasterize(&mask).unwrap();
        assert_eq!(boxes, vec![BoundingBox::new(0, 0, 3, 3, 1)]);
        assert!(!covered(&boxes, 7, 1));
    }

    #[test]
    fn test_split_by_label_separates_touching_classes() {
        let mask = mask_from_rows(&[
            "1122",
            "1122",
        ]);
        let merged = ComponentRasterizer::default().rasterize(&mask).unwrap();
        assert_eq!(merged, vec![BoundingBox::new(0, 0, 4, 2, 2)]);

        let mut split = ComponentRasterizer::default();
        split.split_by_label = true;
        let boxes = split.rasterize(&mask).unwrap();
        assert_eq!(
            boxes,
            vec![BoundingBox::new(0, 0, 2, 2, 1), BoundingBox::new(2, 0, 2, 2, 2)]
        );
    }

    #[test]
    fn test_selector_restricts_foreground() {
        let mask = mask_from_rows(&[
            "11..3",
            "11..3",
        ]);
        let boxes = ComponentRasterizer::default()
            .with_selector(ForegroundSelector::labels([3]))
            .rasterize(&mask)
            .unwrap();
        assert_eq!(boxes, vec![BoundingBox::new(4, 0, 1, 2, 3)]);
    }

    #[test]
    fn test_stripes_hug_each_band() {
        let mask = mask_from_rows(&[
            "1.......",
            "11......",
            "..111...",
            "....1111",
        ]);
        let boxes = ComponentRasterizer::default()
            .with_stripes(StripeConfig { height: 2, buffer: 1 })
            .rasterize(&mask)
            .unwrap();
        assert_eq!(
            boxes,
            vec![BoundingBox::new(0, 0, 3, 2, 1), BoundingBox::new(1, 2, 7, 2, 1)]
        );
    }

    #[test]
    fn test_zero_stripe_height_is_rejected() {
        let mask = mask_from_rows(&["11", "11"]);
        let err = ComponentRasterizer::default()
            .with_stripes(StripeConfig { height: 0, buffer: 0 })
            .rasterize(&mask)
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_every_foreground_pixel_is_covered() {
        for seed in 1..6 {
            let mask = speckled_mask(48, 37, seed);
            for connectivity in [Connectivity::Four, Connectivity::Eight] {
                let plain = ComponentRasterizer::new(connectivity);
                let striped = ComponentRasterizer::new(connectivity)
                    .with_stripes(StripeConfig { height: 5, buffer: 2 });
                for rasterizer in [plain, striped] {
                    let boxes = rasterizer.rasterize(&mask).unwrap();
                    assert!(boxes.iter().all(|b| b.area() > 0));
                    assert!(boxes.iter().all(|b| b.x + b.width <= 48 && b.y + b.height <= 37));
                    for (x, y, p) in mask.image().enumerate_pixels() {
                        if p.0[0] > 0 {
                            assert!(covered(&boxes, x, y), "seed {seed}: ({x}, {y}) uncovered");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_component_boxes_ignore_area_filter() {
        let mask = mask_from_rows(&["1.1"]);
        let rasterizer = ComponentRasterizer::new(Connectivity::Four).with_min_area(5);
        assert_eq!(rasterizer.component_boxes(&mask).len(), 2);
        assert!(rasterizer.rasterize(&mask).unwrap().is_empty());
    }
}
