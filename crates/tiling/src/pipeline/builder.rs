use crate::{
    algorithms::ComponentRasterizer,
    config::{ProjectionMode, StripeConfig, TilingConfig},
    error::Result,
    mask::ForegroundSelector,
    pipeline::TileExtractor,
    traits::BoxRasterizer,
};

/// Builder for creating tile extractors with a fluent API
pub struct TileExtractorBuilder {
    config: TilingConfig,
    rasterizer: Option<Box<dyn BoxRasterizer>>,
}

impl TileExtractorBuilder {
    pub fn new(config: TilingConfig) -> Self {
        Self {
            config,
            rasterizer: None,
        }
    }

    /// Set the rasterizer (replaces the component rasterizer built from the config)
    pub fn set_rasterizer<R>(mut self, rasterizer: R) -> Self
    where
        R: BoxRasterizer + 'static,
    {
        self.rasterizer = Some(Box::new(rasterizer));
        self
    }

    /// Split component boxes into horizontal stripes
    pub fn with_stripes(mut self, height: u32, buffer: u32) -> Self {
        self.config.stripe = Some(StripeConfig { height, buffer });
        self
    }

    pub fn with_projection(mut self, mode: ProjectionMode) -> Self {
        self.config.projection = mode;
        self
    }

    /// Restrict foreground to a subset of mask labels
    pub fn with_foreground(mut self, selector: ForegroundSelector) -> Self {
        self.config.foreground = selector;
        self
    }

    pub fn split_by_label(mut self, split: bool) -> Self {
        self.config.split_by_label = split;
        self
    }

    /// Emit one tile for boxes smaller than the tile size
    pub fn allow_oversized(mut self, allow: bool) -> Self {
        self.config.allow_oversized = allow;
        self
    }

    /// Validate the configuration and build the extractor
    pub fn build(self) -> Result<TileExtractor> {
        let rasterizer = match self.rasterizer {
            Some(rasterizer) => rasterizer,
            None => Box::new(ComponentRasterizer::from_config(&self.config)),
        };
        TileExtractor::new(self.config, rasterizer)
    }
}
