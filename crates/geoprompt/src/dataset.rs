//! Config-driven dataset export: world-file rasters in, `.npy` tiles out.

use geoprompt_core::ProjReprojector;
use geoprompt_raster::RasterError;
use geoprompt_tiling::{export_dataset, JsonlRoiStore, LabelSource, Manifest, RoiStore, TilingError};
use geoprompt_vector::{read_geojson_features, VectorError};
use log::info;

use crate::io::{ConfigError, ExportConfig, LabelConfig};
use crate::worldfile::load_world_file_raster;

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("raster: {0}")]
    Raster(#[from] RasterError),
    #[error("labels: {0}")]
    Vector(#[from] VectorError),
    #[error(transparent)]
    Tiling(#[from] TilingError),
}

/// Run the export described by `config`.
///
/// ROIs come from the JSON-lines store at `config.rois`; an absent store
/// yields an empty dataset. ROIs in other CRSs are reprojected with
/// [`ProjReprojector`].
pub fn run_export(config: &ExportConfig) -> Result<Manifest, ExportError> {
    let raster = load_world_file_raster(&config.raster, config.crs.clone())?;
    let rois = JsonlRoiStore::open(&config.rois)?.list()?;
    info!(
        "exporting {} roi(s) from {} to {}",
        rois.len(),
        config.raster.display(),
        config.output_dir.display()
    );

    let manifest = match &config.labels {
        LabelConfig::Raster { path } => {
            let labels = load_world_file_raster(path, config.crs.clone())?;
            export_dataset(
                &raster,
                LabelSource::Raster(&labels),
                &rois,
                &ProjReprojector,
                &config.tiling,
                &config.output_dir,
            )?
        }
        LabelConfig::Features { path } => {
            let features = read_geojson_features(path, &config.crs)?;
            export_dataset(
                &raster,
                LabelSource::Rasterize(&features),
                &rois,
                &ProjReprojector,
                &config.tiling,
                &config.output_dir,
            )?
        }
    };
    Ok(manifest)
}

/// Read and run an export config file.
pub fn run_export_file(path: impl AsRef<std::path::Path>) -> Result<Manifest, ExportError> {
    let config = ExportConfig::load_json(path)?;
    run_export(&config)
}
