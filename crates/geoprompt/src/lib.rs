//! High-level facade crate for the `geoprompt-*` workspace.
//!
//! This crate provides:
//! - stable, convenient re-exports of the underlying crates
//! - JSON configuration for prompting sessions and dataset export
//! - (feature-gated) world-file raster loading and a config-driven export
//!   pipeline on top of it
//!
//! ## Quickstart
//!
//! ```no_run
//! use geoprompt::dataset::run_export_file;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manifest = run_export_file("export.json")?;
//! println!("wrote {} tiles", manifest.tiles.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `geoprompt::core`: affine transforms, CRS-tagged boxes, reprojection, pixel buffers.
//! - `geoprompt::raster`: raster sources and model-input sampling.
//! - `geoprompt::vector`: mask vectorization, rasterization and feature sinks.
//! - `geoprompt::prompt`: the prompt bridge and model slot.
//! - `geoprompt::tiling`: ROI stores, tile planning and `.npy` export.
//! - `geoprompt::worldfile` (feature `image`): images with ESRI world files.

pub use geoprompt_core as core;
pub use geoprompt_prompt as prompt;
pub use geoprompt_raster as raster;
pub use geoprompt_tiling as tiling;
pub use geoprompt_vector as vector;

pub use geoprompt_core::{
    AffineTransform, BoundingBox, BuiltinReprojector, Crs, ProjReprojector, Reprojector,
};
pub use geoprompt_prompt::{ModelSlot, PromptBridge, PromptPoint, SegmentationModel};
pub use geoprompt_raster::{ImageContext, MemoryRaster, RasterSource, SamplingParams};
pub use geoprompt_tiling::{export_dataset, Manifest, TilingParams};
pub use geoprompt_vector::{extract_polygons, Feature, Polygon, VectorSink};

pub mod io;

#[cfg(feature = "image")]
pub mod dataset;
#[cfg(feature = "image")]
pub mod worldfile;
