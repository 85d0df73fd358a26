use thiserror::Error;

#[derive(Error, Debug)]
pub enum TilingError {
    #[error("Unsupported magnification {magnification}x (available levels: {available:?})")]
    UnsupportedMagnification {
        magnification: f64,
        available: Vec<f64>,
    },

    #[error("Tile of size {tile_size} does not fit a {width}x{height} region")]
    TileLargerThanRegion {
        tile_size: u32,
        width: u32,
        height: u32,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid pyramid metadata: {0}")]
    InvalidPyramid(String),

    #[error("Invalid mask: {0}")]
    InvalidMask(String),

    #[error("Unknown source: {0}")]
    SourceNotFound(String),

    #[error("Failed to load image: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cancelled before completion")]
    Cancelled,

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFileFormat(String),
}

impl TilingError {
    /// Whether the error must abort the whole run rather than a single source.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidConfiguration(_))
    }
}

pub type Result<T> = std::result::Result<T, TilingError>;
