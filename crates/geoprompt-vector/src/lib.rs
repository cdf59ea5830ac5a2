//! Vector side of the pipeline.
//!
//! - [`extract_polygons`] turns a segmentation mask into georeferenced
//!   polygons (one per 4-connected component, holes as interior rings).
//! - [`rasterize_polygons`] goes the other way for label generation.
//! - [`VectorSink`] receives finalized [`Feature`]s; [`MemorySink`] and
//!   [`GeoJsonSink`] are provided.

mod error;
mod extract;
mod polygon;
mod rasterize;
mod sink;

pub use error::VectorError;
pub use extract::{extract_polygons, ValuedPolygon};
pub use polygon::{signed_ring_area, Polygon};
pub use rasterize::rasterize_polygons;
pub use sink::{
    read_geojson_features, Feature, FeatureAttributes, GeoJsonSink, MemorySink, VectorSink,
};
