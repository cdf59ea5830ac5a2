//! Core types for georeferenced prompt segmentation.
//!
//! This crate is intentionally small and purely geometric: affine pixel/world
//! transforms, CRS-tagged bounding boxes, the reprojection seam, and plain
//! pixel buffers. It does *not* read rasters or run any model.

mod affine;
mod bbox;
mod error;
mod image;
mod logger;
mod proj;
mod reproject;

pub use affine::{AffineTransform, SINGULAR_EPS};
pub use bbox::{BoundingBox, Crs};
pub use error::{InvalidInput, ReprojectError, SingularTransformError};
pub use image::{Band, Mask, RgbImage};
pub use proj::{proj_string, ProjReprojector};
pub use reproject::{
    BuiltinReprojector, Reprojector, DENSIFY_POINTS, WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_RADIUS,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_filter, init_with_level, level_from_verbosity, LogFilter, OWN_TARGET};
