//! Raster access and model-input sampling.
//!
//! - [`RasterSource`]: band/window reads from any georeferenced raster,
//!   with [`MemoryRaster`] as the in-process implementation.
//! - [`sample_image`]: reproject a requested bbox, resample to a capped long
//!   side and min-max stretch each band into an RGB image.
//! - [`ImageContext`]: the resulting image plus everything needed to map
//!   world coordinates into it and back.

mod context;
mod error;
mod sampling;
mod source;

pub use context::ImageContext;
pub use error::{RasterError, SamplingError};
pub use sampling::{normalize_band_u8, normalize_band_unit, sample_image, SamplingParams};
pub use source::{MemoryRaster, PixelWindow, RasterSource};
