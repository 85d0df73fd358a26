use std::{fs, path::Path};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

use crate::{
    error::{Result, TilingError},
    mask::ForegroundSelector,
    pyramid::{DEFAULT_MAGNIFICATION_TOLERANCE, round_half_up},
};

/// Pixel adjacency used for connected-component labelling.
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Connectivity {
    /// Edge neighbours only
    Four,
    /// Edge and corner neighbours; joins diagonally touching fragments
    Eight,
}

impl From<Connectivity> for imageproc::region_labelling::Connectivity {
    fn from(value: Connectivity) -> Self {
        match value {
            Connectivity::Four => imageproc::region_labelling::Connectivity::Four,
            Connectivity::Eight => imageproc::region_labelling::Connectivity::Eight,
        }
    }
}

/// How an accepted tile is expressed at the other magnifications.
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProjectionMode {
    /// Scale the whole rectangle; the edge length follows the magnification
    #[default]
    ScaleRegion,
    /// Keep the pixel size and centre the tile on the mapped centre
    FixedSizeCentered,
}

/// Split each component box into horizontal stripes hugging the tissue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StripeConfig {
    /// Stripe height in mask pixels
    #[schemars(range(min = 1))]
    pub height: u32,
    /// Background margin added left and right of each stripe, in mask pixels
    #[serde(default)]
    pub buffer: u32,
}

/// Parameters of one tiling run.
///
/// The first eight fields are required in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TilingConfig {
    /// Edge length of the square tiles at the reference magnification
    #[schemars(range(min = 1))]
    pub tile_size: u32,
    /// Magnification the grid is laid out at and coverage is measured for
    pub reference_magnification: f64,
    /// Magnifications every accepted tile is projected to
    pub target_magnifications: Vec<f64>,
    /// Minimum foreground percentage for a good tile
    #[schemars(range(min = 0.0, max = 100.0))]
    pub foreground_threshold: f64,
    /// Fraction of the tile shared by neighbouring tiles, in [0, 1)
    #[schemars(range(min = 0.0, max = 1.0))]
    pub overlap: f64,
    /// Below-threshold tiles accepted per source
    pub bad_tile_budget: u32,
    /// Boxes with a smaller area (mask pixels) are dropped
    pub min_box_area: u64,
    pub connectivity: Connectivity,

    #[serde(default)]
    pub foreground: ForegroundSelector,
    /// Label components per class instead of over the merged foreground
    #[serde(default)]
    pub split_by_label: bool,
    #[serde(default)]
    pub stripe: Option<StripeConfig>,
    /// Emit a single anchor for boxes smaller than a tile instead of skipping them
    #[serde(default)]
    pub allow_oversized: bool,
    #[serde(default)]
    pub projection: ProjectionMode,
    /// Evaluate each reference anchor at most once per source
    #[serde(default = "default_deduplicate")]
    pub deduplicate: bool,
    /// Relative tolerance when matching magnifications to pyramid levels
    #[serde(default = "default_magnification_tolerance")]
    pub magnification_tolerance: f64,
}

fn default_deduplicate() -> bool {
    true
}

fn default_magnification_tolerance() -> f64 {
    DEFAULT_MAGNIFICATION_TOLERANCE
}

impl TilingConfig {
    /// Configuration with the required parameters; optional ones take their defaults.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tile_size: u32,
        reference_magnification: f64,
        target_magnifications: Vec<f64>,
        foreground_threshold: f64,
        overlap: f64,
        bad_tile_budget: u32,
        min_box_area: u64,
        connectivity: Connectivity,
    ) -> Self {
        Self {
            tile_size,
            reference_magnification,
            target_magnifications,
            foreground_threshold,
            overlap,
            bad_tile_budget,
            min_box_area,
            connectivity,
            foreground: ForegroundSelector::default(),
            split_by_label: false,
            stripe: None,
            allow_oversized: false,
            projection: ProjectionMode::default(),
            deduplicate: default_deduplicate(),
            magnification_tolerance: default_magnification_tolerance(),
        }
    }

    /// Grid stride: `round(tile_size * (1 - overlap))`, half-up.
    pub fn stride(&self) -> u32 {
        round_half_up(f64::from(self.tile_size) * (1.0 - self.overlap)).max(0) as u32
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TilingError::InvalidConfiguration(msg));

        if self.tile_size == 0 {
            return invalid("tile_size must be positive".to_string());
        }
        if !(0.0..=100.0).contains(&self.foreground_threshold) {
            return invalid(format!(
                "foreground_threshold must be within [0, 100], got {}",
                self.foreground_threshold
            ));
        }
        if !(0.0..1.0).contains(&self.overlap) {
            return invalid(format!("overlap must be within [0, 1), got {}", self.overlap));
        }
        if self.stride() == 0 {
            return invalid(format!(
                "overlap {} leaves no stride for tile_size {}",
                self.overlap, self.tile_size
            ));
        }
        if !(self.reference_magnification.is_finite() && self.reference_magnification > 0.0) {
            return invalid(format!(
                "reference_magnification must be positive, got {}",
                self.reference_magnification
            ));
        }
        if self.target_magnifications.is_empty() {
            return invalid("target_magnifications must not be empty".to_string());
        }
        if let Some(m) = self
            .target_magnifications
            .iter()
            .find(|m| !(m.is_finite() && **m > 0.0))
        {
            return invalid(format!("target magnification must be positive, got {m}"));
        }
        if !(0.0..1.0).contains(&self.magnification_tolerance) {
            return invalid(format!(
                "magnification_tolerance must be within [0, 1), got {}",
                self.magnification_tolerance
            ));
        }
        if let Some(stripe) = &self.stripe {
            if stripe.height == 0 {
                return invalid("stripe height must be positive".to_string());
            }
        }
        if let ForegroundSelector::Labels(labels) = &self.foreground {
            if labels.is_empty() || labels.contains(&0) {
                return invalid("foreground labels must be non-empty and exclude 0".to_string());
            }
        }
        Ok(())
    }

    /// Get the JSON schema of the configuration file
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(TilingConfig)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Auto-detect file format and load configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&content),
            Some("json") => Self::from_json(&content),
            _ => Err(TilingError::UnsupportedFileFormat(path.display().to_string())),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
