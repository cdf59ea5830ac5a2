use geoprompt_core::{InvalidInput, ReprojectError, SingularTransformError};
use geoprompt_vector::VectorError;

use crate::ModelError;

#[derive(thiserror::Error, Debug)]
pub enum PromptError {
    #[error("no image context is active")]
    NoActiveContext,
    #[error("no segmentation model is loaded")]
    ModelUnavailable,
    #[error("a model switch is already in progress")]
    SwitchInProgress,
    #[error("model changed while the prompt was running (generation {started} -> {current})")]
    Superseded { started: u64, current: u64 },
    #[error("segmentation model failed: {0}")]
    Model(String),
    #[error(transparent)]
    Invalid(#[from] InvalidInput),
    #[error(transparent)]
    Reproject(#[from] ReprojectError),
    #[error(transparent)]
    Singular(#[from] SingularTransformError),
    #[error(transparent)]
    Sink(#[from] VectorError),
}

impl From<ModelError> for PromptError {
    fn from(e: ModelError) -> Self {
        PromptError::Model(e.0)
    }
}
