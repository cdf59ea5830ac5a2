//! Feature records and the sinks that persist them.

use std::fs;
use std::path::{Path, PathBuf};

use geoprompt_core::{Crs, InvalidInput};
use log::{debug, info};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::{Polygon, VectorError};

/// Attribute row attached to every finalized polygon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureAttributes {
    pub id: u64,
    pub class: i64,
    pub area: f64,
}

/// Properties accepted on read: only `class` is required, anything not
/// listed is ignored.
#[derive(Deserialize)]
struct InputAttributes {
    #[serde(default)]
    id: Option<u64>,
    class: i64,
    #[serde(default)]
    area: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub polygon: Polygon,
    pub attributes: FeatureAttributes,
}

impl Feature {
    /// Attach attributes, computing `area` from the polygon.
    pub fn new(polygon: Polygon, id: u64, class: i64) -> Self {
        let area = polygon.area();
        Self {
            polygon,
            attributes: FeatureAttributes { id, class, area },
        }
    }
}

/// Destination for finalized features.
///
/// `write_features` is all-or-nothing: either every feature of the batch is
/// stored or none is.
pub trait VectorSink {
    fn write_features(&mut self, features: &[Feature]) -> Result<(), VectorError>;
}

/// Collects features in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub features: Vec<Feature>,
    /// Number of successful `write_features` calls.
    pub writes: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorSink for MemorySink {
    fn write_features(&mut self, features: &[Feature]) -> Result<(), VectorError> {
        self.features.extend_from_slice(features);
        self.writes += 1;
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct CrsName {
    name: String,
}

#[derive(Serialize, Deserialize)]
struct NamedCrs {
    #[serde(rename = "type")]
    kind: String,
    properties: CrsName,
}

#[derive(Serialize, Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: String,
    coordinates: Value,
}

/// Properties and coordinates stay untyped so that appending to a file keeps
/// features this crate did not write.
#[derive(Serialize, Deserialize)]
struct GeoJsonFeature {
    #[serde(rename = "type")]
    kind: String,
    properties: Value,
    geometry: Geometry,
}

#[derive(Serialize, Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    crs: Option<NamedCrs>,
    features: Vec<GeoJsonFeature>,
}

impl FeatureCollection {
    fn empty(crs: &Crs) -> Self {
        Self {
            kind: "FeatureCollection".to_string(),
            crs: Some(NamedCrs {
                kind: "name".to_string(),
                properties: CrsName {
                    name: crs.as_str().to_string(),
                },
            }),
            features: Vec::new(),
        }
    }

    fn crs(&self) -> Option<Crs> {
        self.crs.as_ref().map(|c| Crs::new(c.properties.name.as_str()))
    }
}

fn ring_coords(ring: &[Point2<f64>]) -> Vec<[f64; 2]> {
    ring.iter().map(|p| [p.x, p.y]).collect()
}

fn to_geojson(feature: &Feature) -> Result<GeoJsonFeature, VectorError> {
    let p = &feature.polygon;
    let mut coordinates = Vec::with_capacity(1 + p.holes.len());
    coordinates.push(ring_coords(&p.exterior));
    coordinates.extend(p.holes.iter().map(|h| ring_coords(h)));
    Ok(GeoJsonFeature {
        kind: "Feature".to_string(),
        properties: serde_json::to_value(&feature.attributes)?,
        geometry: Geometry {
            kind: "Polygon".to_string(),
            coordinates: serde_json::to_value(coordinates)?,
        },
    })
}

/// `index` is the feature's position in the file; it numbers features that
/// carry no `id`.
fn from_geojson(feature: GeoJsonFeature, index: usize, crs: &Crs) -> Result<Feature, VectorError> {
    if feature.geometry.kind != "Polygon" {
        return Err(VectorError::Format(format!(
            "unsupported geometry type `{}`",
            feature.geometry.kind
        )));
    }
    let coordinates: Vec<Vec<[f64; 2]>> = serde_json::from_value(feature.geometry.coordinates)?;
    let mut rings = coordinates
        .into_iter()
        .map(|r| r.into_iter().map(|[x, y]| Point2::new(x, y)).collect::<Vec<_>>());
    let exterior = rings
        .next()
        .ok_or_else(|| VectorError::Format("polygon without rings".to_string()))?;
    let polygon = Polygon::new(exterior, rings.collect(), crs.clone());

    let input: InputAttributes = serde_json::from_value(feature.properties)?;
    let attributes = FeatureAttributes {
        id: input.id.unwrap_or(index as u64 + 1),
        class: input.class,
        area: input.area.unwrap_or_else(|| polygon.area()),
    };
    Ok(Feature {
        polygon,
        attributes,
    })
}

fn read_collection(path: &Path) -> Result<FeatureCollection, VectorError> {
    let raw = fs::read_to_string(path)?;
    let collection: FeatureCollection = serde_json::from_str(&raw)?;
    if collection.kind != "FeatureCollection" {
        return Err(VectorError::Format(format!(
            "expected a FeatureCollection, found `{}`",
            collection.kind
        )));
    }
    Ok(collection)
}

/// Read polygons written by [`GeoJsonSink`] or any polygon FeatureCollection
/// with a `class` property.
///
/// A missing `id` becomes the 1-based position in the file and a missing
/// `area` is computed from the geometry. Other properties are ignored. Files
/// without a `crs` member are tagged with `default_crs`.
pub fn read_geojson_features(
    path: impl AsRef<Path>,
    default_crs: &Crs,
) -> Result<Vec<Feature>, VectorError> {
    let collection = read_collection(path.as_ref())?;
    let crs = collection.crs().unwrap_or_else(|| default_crs.clone());
    collection
        .features
        .into_iter()
        .enumerate()
        .map(|(i, f)| from_geojson(f, i, &crs))
        .collect()
}

/// GeoJSON FeatureCollection file sink.
///
/// Each batch rewrites the whole collection into a temporary file next to the
/// target and renames it over the target, so readers never observe a partly
/// written file.
#[derive(Debug)]
pub struct GeoJsonSink {
    path: PathBuf,
    crs: Crs,
}

impl GeoJsonSink {
    pub fn new(path: impl Into<PathBuf>, crs: Crs) -> Self {
        Self {
            path: path.into(),
            crs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }
}

impl VectorSink for GeoJsonSink {
    fn write_features(&mut self, features: &[Feature]) -> Result<(), VectorError> {
        if let Some(bad) = features.iter().find(|f| f.polygon.crs != self.crs) {
            return Err(InvalidInput::CrsMismatch {
                expected: self.crs.clone(),
                got: bad.polygon.crs.clone(),
            }
            .into());
        }

        let mut collection = if self.path.exists() {
            let existing = read_collection(&self.path)?;
            if let Some(crs) = existing.crs() {
                if crs != self.crs {
                    return Err(InvalidInput::CrsMismatch {
                        expected: self.crs.clone(),
                        got: crs,
                    }
                    .into());
                }
            }
            existing
        } else {
            FeatureCollection::empty(&self.crs)
        };
        for f in features {
            collection.features.push(to_geojson(f)?);
        }

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(tmp.as_file(), &collection)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| VectorError::Persist {
            path: self.path.display().to_string(),
            source: e.error,
        })?;

        debug!(
            "wrote {} features to {} ({} total)",
            features.len(),
            self.path.display(),
            collection.features.len()
        );
        info!("saved {} polygon(s) to {}", features.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use geoprompt_core::BoundingBox;

    fn square(x0: f64, crs: Crs) -> Polygon {
        Polygon::from_bbox(&BoundingBox::new(x0, 0.0, x0 + 2.0, 2.0, crs))
    }

    #[test]
    fn feature_area_comes_from_polygon() {
        let f = Feature::new(square(0.0, Crs::epsg(3857)), 1, 4);
        assert_abs_diff_eq!(f.attributes.area, 4.0);
        assert_eq!((f.attributes.id, f.attributes.class), (1, 4));
    }

    #[test]
    fn memory_sink_counts_writes() {
        let mut sink = MemorySink::new();
        let batch = vec![
            Feature::new(square(0.0, Crs::epsg(3857)), 1, 1),
            Feature::new(square(5.0, Crs::epsg(3857)), 2, 1),
        ];
        sink.write_features(&batch).unwrap();
        assert_eq!(sink.writes, 1);
        assert_eq!(sink.features, batch);
    }

    #[test]
    fn geojson_sink_appends_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("polygons.geojson");
        let mut sink = GeoJsonSink::new(&path, Crs::epsg(3857));

        sink.write_features(&[Feature::new(square(0.0, Crs::epsg(3857)), 1, 2)])
            .unwrap();
        sink.write_features(&[Feature::new(square(5.0, Crs::epsg(3857)), 1, 3)])
            .unwrap();

        let doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["type"], "FeatureCollection");
        assert_eq!(doc["crs"]["properties"]["name"], "EPSG:3857");

        let back = read_geojson_features(&path, &Crs::epsg(4326)).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[1].attributes.class, 3);
        assert_eq!(back[0].polygon.crs, Crs::epsg(3857));
        assert_abs_diff_eq!(back[0].polygon.area(), 4.0);
        // only the target file remains in the directory
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn geojson_sink_rejects_foreign_crs_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("polygons.geojson");
        let mut sink = GeoJsonSink::new(&path, Crs::epsg(3857));
        let batch = [
            Feature::new(square(0.0, Crs::epsg(3857)), 1, 1),
            Feature::new(square(0.0, Crs::epsg(4326)), 2, 1),
        ];
        let err = sink.write_features(&batch).unwrap_err();
        assert!(matches!(err, VectorError::Invalid(InvalidInput::CrsMismatch { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn class_only_features_get_id_and_area() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.geojson");
        fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
               {"type":"Feature","properties":{"class":2,"name":"field"},
                "geometry":{"type":"Polygon","coordinates":[[[0,0],[3,0],[3,3],[0,3],[0,0]]]}},
               {"type":"Feature","properties":{"class":5,"id":40},
                "geometry":{"type":"Polygon","coordinates":[[[5,0],[6,0],[6,1],[5,1],[5,0]]]}}]}"#,
        )
        .unwrap();

        let back = read_geojson_features(&path, &Crs::epsg(3857)).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!((back[0].attributes.id, back[0].attributes.class), (1, 2));
        assert_abs_diff_eq!(back[0].attributes.area, 9.0);
        assert_eq!((back[1].attributes.id, back[1].attributes.class), (40, 5));
        assert_abs_diff_eq!(back[1].attributes.area, 1.0);
        assert_eq!(back[0].polygon.crs, Crs::epsg(3857));
    }

    #[test]
    fn appending_keeps_foreign_properties() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.geojson");
        fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
               {"type":"Feature","properties":{"class":2,"name":"field"},
                "geometry":{"type":"Polygon","coordinates":[[[0,0],[3,0],[3,3],[0,3],[0,0]]]}}]}"#,
        )
        .unwrap();
        let mut sink = GeoJsonSink::new(&path, Crs::epsg(3857));
        sink.write_features(&[Feature::new(square(5.0, Crs::epsg(3857)), 1, 3)])
            .unwrap();

        let doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["features"][0]["properties"]["name"], "field");
        assert_eq!(read_geojson_features(&path, &Crs::epsg(3857)).unwrap().len(), 2);
    }

    #[test]
    fn non_polygon_geometry_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.geojson");
        fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[{"type":"Feature",
               "properties":{"id":1,"class":1,"area":0.0},
               "geometry":{"type":"Point","coordinates":[]}}]}"#,
        )
        .unwrap();
        let err = read_geojson_features(&path, &Crs::epsg(3857)).unwrap_err();
        assert!(matches!(err, VectorError::Format(_)));
    }
}
