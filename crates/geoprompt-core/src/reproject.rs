//! Reprojection between coordinate reference systems.
//!
//! The pipeline only talks to the [`Reprojector`] trait. A small built-in
//! implementation covers the identity case and spherical Web Mercator
//! (EPSG:3857) to/from geographic WGS84 (EPSG:4326), which is enough for
//! slippy-map style canvases on top of projected imagery. General CRS pairs
//! (UTM zones, ETRS89, raw `+proj=` strings) go through
//! [`ProjReprojector`](crate::ProjReprojector). Geographic coordinates are
//! always `(lon, lat)` in degrees, i.e. x first.

use std::f64::consts::PI;

use crate::{BoundingBox, Crs, ReprojectError};

/// Points sampled along each bbox edge when reprojecting a rectangle.
pub const DENSIFY_POINTS: usize = 21;

pub trait Reprojector: Send + Sync {
    /// Transform a single point from `src` to `dst`.
    fn reproject_point(
        &self,
        x: f64,
        y: f64,
        src: &Crs,
        dst: &Crs,
    ) -> Result<(f64, f64), ReprojectError>;

    /// Axis-aligned bounding box of the transformed rectangle.
    ///
    /// The boundary is densified with [`DENSIFY_POINTS`] samples per edge so
    /// curved edges in the target CRS are enclosed.
    fn reproject_bbox(&self, bbox: &BoundingBox, dst: &Crs) -> Result<BoundingBox, ReprojectError> {
        densified_bounds(bbox, dst, |x, y| {
            self.reproject_point(x, y, &bbox.crs, dst)
        })
    }
}

/// Bounds of `bbox` after mapping [`DENSIFY_POINTS`] samples per edge
/// through `point`.
pub(crate) fn densified_bounds(
    bbox: &BoundingBox,
    dst: &Crs,
    mut point: impl FnMut(f64, f64) -> Result<(f64, f64), ReprojectError>,
) -> Result<BoundingBox, ReprojectError> {
    bbox.crs.ensure_resolved()?;
    dst.ensure_resolved()?;
    if &bbox.crs == dst {
        return Ok(bbox.clone());
    }

    let mut x_min = f64::INFINITY;
    let mut y_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_max = f64::NEG_INFINITY;

    let n = DENSIFY_POINTS - 1;
    for i in 0..=n {
        let t = i as f64 / n as f64;
        let x = bbox.x_min + t * bbox.width();
        let y = bbox.y_min + t * bbox.height();
        for (px, py) in [
            (x, bbox.y_min),
            (x, bbox.y_max),
            (bbox.x_min, y),
            (bbox.x_max, y),
        ] {
            let (qx, qy) = point(px, py)?;
            x_min = x_min.min(qx);
            y_min = y_min.min(qy);
            x_max = x_max.max(qx);
            y_max = y_max.max(qy);
        }
    }

    Ok(BoundingBox::new(x_min, y_min, x_max, y_max, dst.clone()))
}

/// WGS84 semi-major axis used by spherical Web Mercator.
pub const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Latitude where Web Mercator becomes a square world.
pub const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Family {
    Geographic,
    WebMercator,
}

pub(crate) fn family(crs: &Crs) -> Option<Family> {
    match crs.epsg_code()? {
        4326 => Some(Family::Geographic),
        3857 | 900913 | 3785 => Some(Family::WebMercator),
        _ => None,
    }
}

/// Identity plus EPSG:4326 <-> EPSG:3857.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinReprojector;

impl BuiltinReprojector {
    pub fn lonlat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
        let lat = lat.clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT);
        let x = WEB_MERCATOR_RADIUS * lon.to_radians();
        let y = WEB_MERCATOR_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
        (x, y)
    }

    pub fn mercator_to_lonlat(x: f64, y: f64) -> (f64, f64) {
        let lon = (x / WEB_MERCATOR_RADIUS).to_degrees();
        let lat = (2.0 * (y / WEB_MERCATOR_RADIUS).exp().atan() - PI / 2.0).to_degrees();
        (lon, lat)
    }
}

impl Reprojector for BuiltinReprojector {
    fn reproject_point(
        &self,
        x: f64,
        y: f64,
        src: &Crs,
        dst: &Crs,
    ) -> Result<(f64, f64), ReprojectError> {
        src.ensure_resolved()?;
        dst.ensure_resolved()?;
        if src == dst {
            return Ok((x, y));
        }
        if !x.is_finite() || !y.is_finite() {
            return Err(ReprojectError::OutOfDomain {
                x,
                y,
                crs: src.clone(),
            });
        }

        let unsupported = || ReprojectError::Unsupported {
            src: src.clone(),
            dst: dst.clone(),
        };
        let from = family(src).ok_or_else(unsupported)?;
        let to = family(dst).ok_or_else(unsupported)?;

        match (from, to) {
            (a, b) if a == b => Ok((x, y)),
            (Family::Geographic, Family::WebMercator) => {
                if !(-90.0..=90.0).contains(&y) {
                    return Err(ReprojectError::OutOfDomain {
                        x,
                        y,
                        crs: src.clone(),
                    });
                }
                Ok(Self::lonlat_to_mercator(x, y))
            }
            (Family::WebMercator, Family::Geographic) => Ok(Self::mercator_to_lonlat(x, y)),
            _ => Err(unsupported()),
        }
    }
}
