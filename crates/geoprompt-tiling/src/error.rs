use geoprompt_core::{InvalidInput, ReprojectError, SingularTransformError};
use geoprompt_raster::RasterError;
use geoprompt_vector::VectorError;

#[derive(thiserror::Error, Debug)]
pub enum TilingError {
    #[error(transparent)]
    Invalid(#[from] InvalidInput),
    #[error(transparent)]
    Singular(#[from] SingularTransformError),
    #[error("roi covers no pixels ({width}x{height})")]
    EmptyWindow { width: usize, height: usize },
    #[error("label grid {label:?} does not match raster grid {raster:?}")]
    GridMismatch {
        raster: (f64, f64),
        label: (f64, f64),
    },
    #[error(transparent)]
    Reproject(#[from] ReprojectError),
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error(transparent)]
    Vector(#[from] VectorError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TilingError {
    /// Errors that only disqualify one ROI; the export carries on without it.
    pub fn is_roi_local(&self) -> bool {
        matches!(
            self,
            TilingError::Invalid(_)
                | TilingError::EmptyWindow { .. }
                | TilingError::Reproject(_)
        )
    }
}
