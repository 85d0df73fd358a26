//! # Mask-Driven Tile Extraction for Whole-Slide Images
//!
//! Turns a low-resolution quality mask of a whole-slide image into an ordered
//! list of square tiles at one or more magnifications.
//!
//! ## Core Features
//!
//! - **Pyramid mapping**: convert coordinates between any two magnifications
//!   of a slide with deterministic half-up rounding
//! - **Mask rasterization**: connected components, area filtering, optional
//!   per-label and stripe splitting
//! - **Tile grid**: regular anchors with configurable overlap per region
//! - **Quality filter**: foreground coverage threshold plus a per-source
//!   bad-tile budget
//! - **Multi-magnification projection**: every accepted tile at every target
//!   magnification, sharing one coverage measurement
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tiling::{Connectivity, LabelMask, Pyramid, TileExtractor, TilingConfig};
//!
//! let config = TilingConfig::new(224, 5.0, vec![5.0, 20.0], 20.0, 0.0, 10, 16, Connectivity::Eight);
//! let extractor = TileExtractor::builder(config).build()?;
//!
//! let pyramid = Pyramid::from_downsamples(40.0, &[1.0, 4.0, 16.0, 32.0])?;
//! let mask = LabelMask::open("slide.mask.png", 1.25)?;
//! let tiles = extractor.extract("slide", &mask, &pyramid)?;
//!
//! for record in &tiles.records {
//!     println!("{} {}x ({}, {}) {}", record.source, record.magnification, record.x, record.y, record.size);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Many Sources
//!
//! ```rust,no_run
//! use tiling::{SlideManifest, TileExtractor, TilingConfig};
//!
//! let config = TilingConfig::from_file("tiling.toml")?;
//! let manifest = SlideManifest::from_file("slides.toml")?;
//! let extractor = TileExtractor::builder(config).build()?;
//!
//! let report = extractor.extract_all(&manifest.ids(), &manifest, &manifest);
//! for (source, err) in report.failures() {
//!     eprintln!("{source}: {err}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules
pub mod error;
pub mod types;
pub mod config;
pub mod pyramid;
pub mod mask;
pub mod traits;
pub mod algorithms;
pub mod pipeline;
pub mod io;

// Re-exports for convenience
pub use error::{Result, TilingError};
pub use types::{AcceptReason, BoundingBox, PixelRect, TileAnchor, TileRecord};
pub use config::{Connectivity, ProjectionMode, StripeConfig, TilingConfig};
pub use pyramid::{CoordinateMapper, Pyramid, PyramidLevel};
pub use mask::{CoverageIndex, ForegroundSelector, LabelMask, merge_masks};
pub use traits::*;
pub use algorithms::*;
pub use pipeline::{
    RunReport, SourceOutcome, SourceTiles, TileExtractor, TileRecordAggregator, TileStats,
    builder::TileExtractorBuilder,
};
pub use io::{
    JsonLinesSink, PyramidSpec, SlideEntry, SlideManifest, boxes_to_geojson, read_records_jsonl, save_geojson,
    tiles_to_geojson, write_records_json,
};
