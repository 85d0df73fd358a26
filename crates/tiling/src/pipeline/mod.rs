pub mod aggregator;
pub mod builder;
pub mod report;

use std::collections::HashSet;

use rayon::prelude::*;
use tracing::{debug, info, info_span, warn};

use crate::{
    algorithms::{Decision, MultiMagnificationProjector, QualityFilter, BadTileBudget, TileGrid},
    config::TilingConfig,
    error::{Result, TilingError},
    mask::{CoverageIndex, LabelMask},
    pyramid::{CoordinateMapper, Pyramid},
    traits::{BoxRasterizer, MaskProvider, PyramidProvider},
    types::{AcceptReason, BoundingBox, TileAnchor},
};

pub use aggregator::TileRecordAggregator;
pub use report::{RunReport, SourceOutcome, SourceTiles, TileStats};

/// Anchor with its coverage measured at the reference magnification
#[derive(Debug, Clone, Copy)]
struct Candidate {
    anchor: TileAnchor,
    coverage: f64,
}

/// Mask-driven tile extraction for whole-slide images.
///
/// Stages per source: rasterize the mask into boxes, lay a tile grid over
/// each box at the reference magnification, measure coverage, apply the
/// bad-tile budget, project accepted tiles to every target magnification.
/// Boxes are measured in parallel; the budget is applied afterwards in box
/// order, so the output never depends on scheduling.
pub struct TileExtractor {
    config: TilingConfig,
    rasterizer: Box<dyn BoxRasterizer>,
}

impl TileExtractor {
    /// Create a new extractor builder
    pub fn builder(config: TilingConfig) -> builder::TileExtractorBuilder {
        builder::TileExtractorBuilder::new(config)
    }

    /// Validates the configuration; an invalid one aborts before any work.
    pub fn new(config: TilingConfig, rasterizer: Box<dyn BoxRasterizer>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, rasterizer })
    }

    pub fn config(&self) -> &TilingConfig {
        &self.config
    }

    pub fn rasterizer(&self) -> &dyn BoxRasterizer {
        self.rasterizer.as_ref()
    }

    /// Run every source independently. Failures stay with their source.
    pub fn extract_all<S, M, P>(&self, sources: &[S], masks: &M, pyramids: &P) -> RunReport
    where
        S: AsRef<str> + Sync,
        M: MaskProvider + ?Sized,
        P: PyramidProvider + ?Sized,
    {
        let outcomes = sources
            .par_iter()
            .map(|source| {
                let source = source.as_ref();
                let result = self.extract_source(source, masks, pyramids);
                if let Err(err) = &result {
                    warn!(source, error = %err, "source failed");
                }
                SourceOutcome {
                    source: source.to_string(),
                    result,
                }
            })
            .collect();

        RunReport { outcomes }
    }

    /// Fetch the mask and pyramid of one source and extract its tiles.
    pub fn extract_source<M, P>(&self, source: &str, masks: &M, pyramids: &P) -> Result<SourceTiles>
    where
        M: MaskProvider + ?Sized,
        P: PyramidProvider + ?Sized,
    {
        let pyramid = pyramids.pyramid(source)?;
        let mask = masks.mask(source)?;
        self.extract(source, &mask, &pyramid)
    }

    /// Extract the ordered tile records of one source.
    pub fn extract(&self, source: &str, mask: &LabelMask, pyramid: &Pyramid) -> Result<SourceTiles> {
        let span = info_span!("source", source);
        let _enter = span.enter();
        let config = &self.config;

        // Step 1: resolve every magnification before doing any work
        let pyramid = pyramid.clone().with_tolerance(config.magnification_tolerance);
        let reference = config.reference_magnification;
        let mask_to_reference = pyramid.mapper(mask.magnification(), reference)?;
        let reference_to_mask = pyramid.mapper(reference, mask.magnification())?;
        let projector =
            MultiMagnificationProjector::new(&pyramid, reference, &config.target_magnifications, config.projection)?;

        // Step 2: rasterize
        let boxes = self.rasterizer.rasterize(mask)?;
        if boxes.is_empty() {
            info!("mask has no foreground, no tiles");
            return Ok(SourceTiles::empty(source));
        }
        debug!(boxes = boxes.len(), "rasterized mask");

        // Step 3: grid and coverage per box, in parallel; collect keeps box order
        let index = CoverageIndex::new(mask, &config.foreground);
        let filter = QualityFilter::new(&index, reference_to_mask, config.foreground_threshold);
        let evaluated: Vec<Result<Vec<Candidate>>> = boxes
            .par_iter()
            .map(|bbox| self.measure_box(bbox, &mask_to_reference, &filter))
            .collect();

        // Step 4: budget and projection, sequentially in traversal order
        let mut budget = BadTileBudget::new(config.bad_tile_budget);
        let mut aggregator = TileRecordAggregator::new(source);
        let mut stats = TileStats::default();
        let mut skipped_boxes = 0;
        let mut seen = HashSet::new();

        for (box_index, (bbox, evaluation)) in boxes.iter().zip(evaluated).enumerate() {
            let candidates = match evaluation {
                Ok(candidates) => candidates,
                Err(err @ TilingError::TileLargerThanRegion { .. }) => {
                    warn!(box_index, error = %err, "skipping box");
                    skipped_boxes += 1;
                    continue;
                }
                Err(err) => return Err(err),
            };

            for candidate in candidates {
                stats.candidates += 1;
                if config.deduplicate && !seen.insert((candidate.anchor.x, candidate.anchor.y)) {
                    stats.duplicates += 1;
                    continue;
                }

                match filter.decide(candidate.coverage, &mut budget) {
                    Decision::Accept(reason) => {
                        match reason {
                            AcceptReason::Good => stats.good += 1,
                            AcceptReason::Bad => stats.bad += 1,
                        }
                        let projections = projector.project(&candidate.anchor);
                        aggregator.push(box_index, bbox.label, candidate.coverage, reason, &projections);
                    }
                    Decision::Reject => stats.rejected += 1,
                }
            }
        }

        info!(
            boxes = boxes.len(),
            skipped_boxes,
            good = stats.good,
            bad = stats.bad,
            rejected = stats.rejected,
            records = aggregator.records().len(),
            "extracted tiles"
        );

        Ok(SourceTiles {
            source: source.to_string(),
            boxes,
            records: aggregator.finish(),
            skipped_boxes,
            stats,
        })
    }

    fn measure_box(
        &self,
        bbox: &BoundingBox,
        mask_to_reference: &CoordinateMapper,
        filter: &QualityFilter<'_>,
    ) -> Result<Vec<Candidate>> {
        let region = mask_to_reference.map_rect(&bbox.rect());
        let grid = TileGrid::new(
            &region,
            self.config.tile_size,
            self.config.stride(),
            self.config.allow_oversized,
        )?;
        debug!(x = bbox.x, y = bbox.y, anchors = grid.len(), "laid out grid");

        Ok(grid
            .iter()
            .map(|anchor| Candidate {
                anchor,
                coverage: filter.coverage(&anchor),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use image::{GrayImage, Luma};

    use super::*;
    use crate::{
        algorithms::ComponentRasterizer,
        config::{Connectivity, ProjectionMode},
        pyramid::PyramidLevel,
    };

    fn config(tile_size: u32, threshold: f64, budget: u32) -> TilingConfig {
        TilingConfig::new(tile_size, 1.0, vec![1.0], threshold, 0.0, budget, 0, Connectivity::Eight)
    }

    fn one_two() -> Pyramid {
        Pyramid::new(vec![PyramidLevel::new(1.0, 0.5), PyramidLevel::new(2.0, 1.0)]).unwrap()
    }

    fn full_mask(size: u32) -> LabelMask {
        LabelMask::new(GrayImage::from_pixel(size, size, Luma([1])), 1.0).unwrap()
    }

    /// Foreground where `x < limit`, everything else background
    fn left_band(width: u32, height: u32, limit: u32) -> LabelMask {
        LabelMask::new(
            GrayImage::from_fn(width, height, |x, _| Luma([u8::from(x < limit)])),
            1.0,
        )
        .unwrap()
    }

    struct InMemorySlides(HashMap<String, (LabelMask, Pyramid)>);

    impl MaskProvider for InMemorySlides {
        fn mask(&self, source: &str) -> Result<LabelMask> {
            self.0
                .get(source)
                .map(|(mask, _)| mask.clone())
                .ok_or_else(|| TilingError::SourceNotFound(source.to_string()))
        }
    }

    impl PyramidProvider for InMemorySlides {
        fn pyramid(&self, source: &str) -> Result<Pyramid> {
            self.0
                .get(source)
                .map(|(_, pyramid)| pyramid.clone())
                .ok_or_else(|| TilingError::SourceNotFound(source.to_string()))
        }
    }

    #[test]
    fn test_full_mask_yields_four_good_tiles() {
        let extractor = TileExtractor::builder(config(50, 0.0, 0)).build().unwrap();
        let tiles = extractor.extract("wsi", &full_mask(100), &one_two()).unwrap();

        assert_eq!(tiles.records.len(), 4);
        assert!(tiles.records.iter().all(|r| r.reason == AcceptReason::Good));
        assert!(tiles.records.iter().all(|r| r.foreground_ratio == 1.0));
        let origins: Vec<_> = tiles.records.iter().map(|r| (r.x, r.y)).collect();
        assert_eq!(origins, vec![(0, 0), (50, 0), (0, 50), (50, 50)]);
    }

    #[test]
    fn test_full_mask_with_strict_threshold_needs_no_budget() {
        let extractor = TileExtractor::builder(config(50, 100.0, 1)).build().unwrap();
        let tiles = extractor.extract("wsi", &full_mask(100), &one_two()).unwrap();
        assert_eq!(tiles.stats.good, 4);
        assert_eq!(tiles.stats.bad, 0);
    }

    #[test]
    fn test_empty_mask_skips_grid_and_filter() {
        let extractor = TileExtractor::builder(config(50, 0.0, 5)).build().unwrap();
        let mask = LabelMask::new(GrayImage::new(100, 100), 1.0).unwrap();
        let tiles = extractor.extract("wsi", &mask, &one_two()).unwrap();
        assert!(tiles.boxes.is_empty());
        assert!(tiles.records.is_empty());
        assert_eq!(tiles.stats, TileStats::default());
    }

    #[test]
    fn test_bad_tiles_never_exceed_budget() {
        // one box over the whole mask, only the first column of tiles is tissue
        let mask = left_band(200, 200, 20);
        for budget in 0..6 {
            let extractor = TileExtractor::builder(config(20, 50.0, budget))
                .set_rasterizer(FixedBoxes(vec![BoundingBox::new(0, 0, 200, 200, 1)]))
                .build()
                .unwrap();
            let tiles = extractor.extract("wsi", &mask, &one_two()).unwrap();
            let bad = tiles.records.iter().filter(|r| r.reason == AcceptReason::Bad).count();
            assert_eq!(bad, budget as usize);
            assert_eq!(tiles.stats.good, 10);
            assert_eq!(tiles.stats.rejected, 90 - budget as usize);
        }
    }

    #[test]
    fn test_bad_tiles_are_the_first_in_traversal_order() {
        let extractor = TileExtractor::builder(config(20, 50.0, 1))
            .set_rasterizer(FixedBoxes(vec![BoundingBox::new(0, 0, 60, 20, 1)]))
            .build()
            .unwrap();
        let tiles = extractor.extract("wsi", &left_band(60, 20, 20), &one_two()).unwrap();

        let reasons: Vec<_> = tiles.records.iter().map(|r| (r.x, r.reason)).collect();
        assert_eq!(reasons, vec![(0, AcceptReason::Good), (20, AcceptReason::Bad)]);
        assert_eq!(tiles.stats.rejected, 1);
    }

    #[test]
    fn test_projection_to_double_magnification() {
        let mut cfg = config(50, 0.0, 0);
        cfg.target_magnifications = vec![1.0, 2.0];
        let extractor = TileExtractor::builder(cfg).build().unwrap();
        let tiles = extractor.extract("wsi", &full_mask(100), &one_two()).unwrap();

        assert_eq!(tiles.records.len(), 8);
        for pair in tiles.records.chunks(2) {
            let (reference, doubled) = (&pair[0], &pair[1]);
            assert_eq!(reference.tile_index, doubled.tile_index);
            assert_eq!((reference.magnification, doubled.magnification), (1.0, 2.0));
            assert_eq!((doubled.x, doubled.y, doubled.size), (reference.x * 2, reference.y * 2, reference.size * 2));
            assert_eq!(reference.foreground_ratio, doubled.foreground_ratio);
        }
    }

    #[test]
    fn test_mask_at_lower_magnification_is_mapped() {
        // mask at 1x, grid at 2x: each 50 px mask region becomes 100 px
        let mut cfg = config(100, 50.0, 0);
        cfg.reference_magnification = 2.0;
        cfg.target_magnifications = vec![2.0];
        let extractor = TileExtractor::builder(cfg).build().unwrap();
        let tiles = extractor.extract("wsi", &left_band(100, 100, 50), &one_two()).unwrap();

        assert_eq!(tiles.boxes, vec![BoundingBox::new(0, 0, 50, 100, 1)]);
        let origins: Vec<_> = tiles.records.iter().map(|r| (r.x, r.y, r.size)).collect();
        assert_eq!(origins, vec![(0, 0, 100), (0, 100, 100)]);
        assert!(tiles.records.iter().all(|r| r.foreground_ratio == 1.0));
    }

    #[test]
    fn test_oversized_boxes_are_skipped_and_counted() {
        let mut image = GrayImage::new(200, 200);
        for y in 0..100 {
            for x in 0..100 {
                image.put_pixel(x, y, Luma([1]));
            }
        }
        image.put_pixel(180, 180, Luma([1]));
        let mask = LabelMask::new(image, 1.0).unwrap();

        let extractor = TileExtractor::builder(config(50, 0.0, 0)).build().unwrap();
        let tiles = extractor.extract("wsi", &mask, &one_two()).unwrap();
        assert_eq!(tiles.skipped_boxes, 1);
        assert_eq!(tiles.tile_count(), 4);

        let mut cfg = config(50, 0.0, 0);
        cfg.allow_oversized = true;
        let extractor = TileExtractor::builder(cfg).build().unwrap();
        let tiles = extractor.extract("wsi", &mask, &one_two()).unwrap();
        assert_eq!(tiles.skipped_boxes, 0);
        assert_eq!(tiles.tile_count(), 5);
        assert_eq!(tiles.records.last().map(|r| (r.x, r.y, r.box_index)), Some((180, 180, 1)));
    }

    #[test]
    fn test_overlapping_boxes_do_not_duplicate_tiles() {
        // two boxes over the same region yield the same anchors
        let mask = full_mask(100);
        let mut cfg = config(50, 0.0, 0);
        cfg.overlap = 0.5;
        let extractor = TileExtractor::builder(cfg.clone())
            .set_rasterizer(FixedBoxes(vec![
                BoundingBox::new(0, 0, 100, 100, 1),
                BoundingBox::new(0, 0, 100, 100, 1),
            ]))
            .build()
            .unwrap();
        let tiles = extractor.extract("wsi", &mask, &one_two()).unwrap();
        assert_eq!(tiles.tile_count(), 16);
        assert_eq!(tiles.stats.duplicates, 16);

        cfg.deduplicate = false;
        let extractor = TileExtractor::builder(cfg)
            .set_rasterizer(FixedBoxes(vec![
                BoundingBox::new(0, 0, 100, 100, 1),
                BoundingBox::new(0, 0, 100, 100, 1),
            ]))
            .build()
            .unwrap();
        assert_eq!(extractor.extract("wsi", &mask, &one_two()).unwrap().tile_count(), 32);
    }

    struct FixedBoxes(Vec<BoundingBox>);

    impl BoxRasterizer for FixedBoxes {
        fn rasterize(&self, _mask: &LabelMask) -> Result<Vec<BoundingBox>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_output_is_deterministic() {
        let mut image = GrayImage::new(300, 300);
        let mut state = 7u64;
        for y in 0..300 {
            for x in 0..300 {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                if (x / 40 + y / 60) % 3 != 0 || (state >> 60) == 0 {
                    image.put_pixel(x, y, Luma([1 + (x / 100) as u8]));
                }
            }
        }
        let mask = LabelMask::new(image, 1.0).unwrap();
        let mut cfg = config(16, 70.0, 7);
        cfg.overlap = 0.25;
        cfg.min_box_area = 9;
        cfg.target_magnifications = vec![1.0, 2.0];
        let extractor = TileExtractor::builder(cfg).build().unwrap();

        let first = extractor.extract("wsi", &mask, &one_two()).unwrap();
        for _ in 0..5 {
            let again = extractor.extract("wsi", &mask, &one_two()).unwrap();
            assert_eq!(first.records, again.records);
        }
        assert!(first.stats.bad <= 7);
    }

    #[test]
    fn test_unsupported_reference_aborts_source() {
        let mut cfg = config(50, 0.0, 0);
        cfg.target_magnifications = vec![1.0, 8.0];
        let extractor = TileExtractor::builder(cfg).build().unwrap();
        let err = extractor.extract("wsi", &full_mask(100), &one_two()).unwrap_err();
        assert!(matches!(err, TilingError::UnsupportedMagnification { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_invalid_configuration_fails_before_processing() {
        let err = TileExtractor::builder(config(50, 120.0, 0)).build().err().unwrap();
        assert!(err.is_fatal());
        let err = TileExtractor::new(config(0, 10.0, 0), Box::new(ComponentRasterizer::default())).err().unwrap();
        assert!(matches!(err, TilingError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_sources_fail_independently() {
        let mut slides = HashMap::new();
        slides.insert("good".to_string(), (full_mask(100), one_two()));
        slides.insert(
            "coarse".to_string(),
            (full_mask(100), Pyramid::new(vec![PyramidLevel::new(0.5, 1.0)]).unwrap()),
        );
        slides.insert("blank".to_string(), (LabelMask::new(GrayImage::new(10, 10), 1.0).unwrap(), one_two()));
        let slides = InMemorySlides(slides);

        let extractor = TileExtractor::builder(config(50, 0.0, 2)).build().unwrap();
        let report = extractor.extract_all(&["good", "missing", "coarse", "blank"], &slides, &slides);

        let order: Vec<_> = report.outcomes.iter().map(|o| o.source.as_str()).collect();
        assert_eq!(order, vec!["good", "missing", "coarse", "blank"]);
        assert_eq!(report.successes().count(), 2);
        assert_eq!(report.total_records(), 4);
        let failures: Vec<_> = report.failures().map(|(s, _)| s).collect();
        assert_eq!(failures, vec!["missing", "coarse"]);
        assert!(!report.all_failed());
    }

    #[test]
    fn test_fixed_size_projection_through_pipeline() {
        let mut cfg = config(50, 0.0, 0);
        cfg.reference_magnification = 2.0;
        cfg.target_magnifications = vec![2.0, 1.0];
        cfg.projection = ProjectionMode::FixedSizeCentered;
        let extractor = TileExtractor::builder(cfg).build().unwrap();
        let mask = LabelMask::new(GrayImage::from_pixel(50, 50, Luma([1])), 1.0).unwrap();
        let tiles = extractor.extract("wsi", &mask, &one_two()).unwrap();

        // 100 px region at 2x, four 50 px tiles, each also 50 px at 1x
        assert_eq!(tiles.tile_count(), 4);
        assert!(tiles.records.iter().all(|r| r.size == 50));
        let first_low = tiles.records_at(1.0).next().unwrap();
        assert_eq!((first_low.x, first_low.y), (-12, -12));
    }
}
