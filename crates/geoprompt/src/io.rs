//! JSON configuration for the export pipeline and for interactive prompting.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use geoprompt_core::Crs;
use geoprompt_prompt::{ModelLoader, ModelSlot, ModelSpec, PromptError};
use geoprompt_raster::SamplingParams;
use geoprompt_tiling::TilingParams;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn load<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write<T: Serialize>(value: &T, path: &Path) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Where the export takes its label tiles from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LabelConfig {
    /// World-file raster of class ids aligned with the image grid.
    Raster { path: PathBuf },
    /// GeoJSON polygons rasterized per ROI by their `class` property.
    Features { path: PathBuf },
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dataset")
}

/// Configuration for `geoprompt export`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Image with a sidecar world file.
    pub raster: PathBuf,
    /// CRS of the raster's world coordinates.
    pub crs: Crs,
    /// JSON-lines ROI store.
    pub rois: PathBuf,
    pub labels: LabelConfig,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub tiling: TilingParams,
}

impl ExportConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load(path.as_ref())
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        write(self, path.as_ref())
    }
}

/// Settings an interactive host needs to drive a
/// [`PromptBridge`](geoprompt_prompt::PromptBridge).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub model: ModelSpec,
    #[serde(default)]
    pub sampling: SamplingParams,
    /// CRS of produced polygons; `"project"` follows the host's project CRS.
    #[serde(default = "Crs::project")]
    pub output_crs: Crs,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            model: ModelSpec::default(),
            sampling: SamplingParams::default(),
            output_crs: Crs::project(),
        }
    }
}

impl PromptConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load(path.as_ref())
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        write(self, path.as_ref())
    }

    /// Output CRS with the project placeholder replaced by `project_crs`.
    pub fn resolved_output_crs(&self, project_crs: &Crs) -> Crs {
        self.output_crs.clone().resolve_project(project_crs)
    }

    /// Fresh model slot with the configured model loaded.
    pub fn load_model(&self, loader: &dyn ModelLoader) -> Result<Arc<ModelSlot>, PromptError> {
        let slot = Arc::new(ModelSlot::new());
        slot.load(self.model.clone(), loader)?;
        Ok(slot)
    }
}
