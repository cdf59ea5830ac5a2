use geoprompt_core::{InvalidInput, ReprojectError, SingularTransformError};

/// Errors raised by a [`crate::RasterSource`].
#[derive(thiserror::Error, Debug)]
pub enum RasterError {
    #[error("band {band} out of range (raster has {count} bands)")]
    BandOutOfRange { band: usize, count: usize },
    #[error(transparent)]
    Invalid(#[from] InvalidInput),
    #[error(transparent)]
    Singular(#[from] SingularTransformError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("unsupported raster data: {0}")]
    Format(String),
}

/// Errors returned by [`crate::sample_image`].
#[derive(thiserror::Error, Debug)]
pub enum SamplingError {
    #[error("sampling window is empty ({width}x{height} pixels)")]
    EmptyWindow { width: usize, height: usize },
    #[error("raster has no bands")]
    NoBands,
    #[error(transparent)]
    Invalid(#[from] InvalidInput),
    #[error(transparent)]
    Reproject(#[from] ReprojectError),
    #[error(transparent)]
    Raster(#[from] RasterError),
}
