use crate::Crs;

/// Inputs rejected before any expensive work starts.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InvalidInput {
    #[error("degenerate bounding box [{x_min}, {y_min}, {x_max}, {y_max}]")]
    DegenerateBox {
        x_min: f64,
        y_min: f64,
        x_max: f64,
        y_max: f64,
    },
    #[error("crs `{0}` is a placeholder and must be resolved before reprojection")]
    UnresolvedCrs(String),
    #[error("no prompt points supplied")]
    NoPoints,
    #[error("`{name}` must be positive")]
    NonPositive { name: &'static str },
    #[error("crs mismatch (expected {expected}, got {got})")]
    CrsMismatch { expected: Crs, got: Crs },
    #[error("invalid buffer length (expected {expected} values, got {got})")]
    BufferSize { expected: usize, got: usize },
    #[error("mask is {}x{} but the image is {}x{}", got.0, got.1, expected.0, expected.1)]
    MaskSize {
        expected: (usize, usize),
        got: (usize, usize),
    },
}

/// The affine transform cannot be inverted.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
#[error("singular affine transform (determinant {det:e})")]
pub struct SingularTransformError {
    pub det: f64,
}

/// Errors returned by a [`crate::Reprojector`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ReprojectError {
    #[error(transparent)]
    Invalid(#[from] InvalidInput),
    #[error("no transformation available from {src} to {dst}")]
    Unsupported { src: Crs, dst: Crs },
    #[error("point ({x}, {y}) lies outside the valid domain of {crs}")]
    OutOfDomain { x: f64, y: f64, crs: Crs },
}
