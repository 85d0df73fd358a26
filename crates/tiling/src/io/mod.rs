//! File-backed collaborators: slide manifests, record export and overlays.

pub mod geojson;
pub mod manifest;
pub mod records;

pub use self::geojson::{boxes_to_geojson, save_geojson, tiles_to_geojson};
pub use manifest::{PyramidSpec, SlideEntry, SlideManifest};
pub use records::{JsonLinesSink, read_records_jsonl, write_records_json};
