use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, TilingError},
    mask::{LabelMask, merge_masks},
    pyramid::{Pyramid, PyramidLevel},
    traits::{MaskProvider, PyramidProvider},
};

/// Level table of one slide as stored in a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum PyramidSpec {
    /// Scanner metadata: objective power plus per-level downsample factors
    Downsamples {
        base_magnification: f64,
        downsamples: Vec<f64>,
    },
    Levels { levels: Vec<PyramidLevel> },
}

impl PyramidSpec {
    pub fn to_pyramid(&self) -> Result<Pyramid> {
        match self {
            Self::Downsamples {
                base_magnification,
                downsamples,
            } => Pyramid::from_downsamples(*base_magnification, downsamples),
            Self::Levels { levels } => Pyramid::new(levels.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SlideEntry {
    pub id: String,
    /// Quality mask image, one label per pixel
    pub mask: PathBuf,
    pub mask_magnification: f64,
    /// Annotation mask merged into the quality mask when present
    #[serde(default)]
    pub annotations: Option<PathBuf>,
    pub pyramid: PyramidSpec,
}

/// Sources of one run with their masks and level tables.
///
/// Relative paths resolve against the directory holding the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SlideManifest {
    pub sources: Vec<SlideEntry>,
    #[serde(skip)]
    root: PathBuf,
}

impl SlideManifest {
    pub fn new(sources: Vec<SlideEntry>, root: impl Into<PathBuf>) -> Result<Self> {
        let manifest = Self {
            sources,
            root: root.into(),
        };
        manifest.check_ids()?;
        Ok(manifest)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(content)?;
        manifest.check_ids()?;
        Ok(manifest)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(content)?;
        manifest.check_ids()?;
        Ok(manifest)
    }

    /// Auto-detect file format and load the manifest
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let manifest = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&content)?,
            Some("json") => Self::from_json(&content)?,
            _ => return Err(TilingError::UnsupportedFileFormat(path.display().to_string())),
        };
        Ok(manifest.with_root(path.parent().unwrap_or_else(|| Path::new("."))))
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn entry(&self, id: &str) -> Result<&SlideEntry> {
        self.sources
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| TilingError::SourceNotFound(id.to_string()))
    }

    /// Resolve a manifest path against the manifest directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn check_ids(&self) -> Result<()> {
        let mut seen = HashSet::new();
        match self.sources.iter().find(|s| !seen.insert(s.id.as_str())) {
            Some(dup) => Err(TilingError::InvalidConfiguration(format!(
                "duplicate source id '{}' in manifest",
                dup.id
            ))),
            None => Ok(()),
        }
    }
}

impl MaskProvider for SlideManifest {
    fn mask(&self, source: &str) -> Result<LabelMask> {
        let entry = self.entry(source)?;
        let mask = LabelMask::open(self.resolve(&entry.mask), entry.mask_magnification)?;
        match &entry.annotations {
            Some(annotations) => {
                let annotations = LabelMask::open(self.resolve(annotations), entry.mask_magnification)?;
                merge_masks(&mask, &annotations)
            }
            None => Ok(mask),
        }
    }
}

impl PyramidProvider for SlideManifest {
    fn pyramid(&self, source: &str) -> Result<Pyramid> {
        self.entry(source)?.pyramid.to_pyramid()
    }
}
