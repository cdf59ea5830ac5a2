use geoprompt_core::{InvalidInput, SingularTransformError};

#[derive(thiserror::Error, Debug)]
pub enum VectorError {
    #[error(transparent)]
    Invalid(#[from] InvalidInput),
    #[error(transparent)]
    Singular(#[from] SingularTransformError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("could not persist {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed GeoJSON: {0}")]
    Format(String),
}
