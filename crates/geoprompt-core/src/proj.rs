//! General CRS transforms backed by `proj4rs`.

use std::borrow::Cow;

use log::trace;
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::reproject::{densified_bounds, family, Family};
use crate::{BoundingBox, BuiltinReprojector, Crs, ReprojectError, Reprojector};

const WGS84_LONLAT: &str = "+proj=longlat +datum=WGS84 +no_defs";
const ETRS89_LONLAT: &str = "+proj=longlat +ellps=GRS80 +no_defs";

/// proj4 definition for `crs`.
///
/// Known EPSG codes: WGS84 (4326), ETRS89 (4258), WGS84 UTM zones (326zz
/// north, 327zz south) and ETRS89 UTM zones (258zz). Identifiers that already
/// are `+proj=` strings pass through. Web Mercator has no entry: it is WGS84
/// lon/lat on a sphere and is handled by [`BuiltinReprojector`] math.
pub fn proj_string(crs: &Crs) -> Option<Cow<'static, str>> {
    if crs.as_str().starts_with("+proj=") {
        return Some(Cow::Owned(crs.as_str().to_string()));
    }
    let code = crs.epsg_code()?;
    let s = match code {
        4326 => Cow::Borrowed(WGS84_LONLAT),
        4258 => Cow::Borrowed(ETRS89_LONLAT),
        32601..=32660 => Cow::Owned(format!(
            "+proj=utm +zone={} +datum=WGS84 +units=m +no_defs",
            code - 32600
        )),
        32701..=32760 => Cow::Owned(format!(
            "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs",
            code - 32700
        )),
        25801..=25860 => Cow::Owned(format!(
            "+proj=utm +zone={} +ellps=GRS80 +units=m +no_defs",
            code - 25800
        )),
        _ => return None,
    };
    Some(s)
}

fn is_geographic(definition: &str) -> bool {
    definition
        .split_whitespace()
        .any(|t| t == "+proj=longlat" || t == "+proj=latlong")
}

/// How one side of a pair enters or leaves `proj4rs`.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Units {
    Projected,
    Degrees,
    /// Web Mercator metres, converted to WGS84 degrees around the proj leg.
    Mercator,
}

/// Parsed source/target pair.
struct ProjPair {
    src: Proj,
    dst: Proj,
    src_units: Units,
    dst_units: Units,
}

/// proj4 definition and units for one side.
fn side(crs: &Crs) -> Option<(Cow<'static, str>, Units)> {
    if family(crs) == Some(Family::WebMercator) {
        return Some((Cow::Borrowed(WGS84_LONLAT), Units::Mercator));
    }
    let def = proj_string(crs)?;
    let units = if is_geographic(&def) {
        Units::Degrees
    } else {
        Units::Projected
    };
    Some((def, units))
}

impl ProjPair {
    fn new(src: &Crs, dst: &Crs) -> Result<Self, ReprojectError> {
        let unsupported = || ReprojectError::Unsupported {
            src: src.clone(),
            dst: dst.clone(),
        };
        let (src_def, src_units) = side(src).ok_or_else(unsupported)?;
        let (dst_def, dst_units) = side(dst).ok_or_else(unsupported)?;
        let parse = |def: &str| {
            Proj::from_proj_string(def).map_err(|e| {
                trace!("proj4rs rejected `{def}`: {e:?}");
                unsupported()
            })
        };
        Ok(Self {
            src: parse(src_def.as_ref())?,
            dst: parse(dst_def.as_ref())?,
            src_units,
            dst_units,
        })
    }

    fn apply(&self, x: f64, y: f64, src: &Crs) -> Result<(f64, f64), ReprojectError> {
        let out_of_domain = || ReprojectError::OutOfDomain {
            x,
            y,
            crs: src.clone(),
        };
        if !x.is_finite() || !y.is_finite() {
            return Err(out_of_domain());
        }
        let mut point = match self.src_units {
            Units::Projected => (x, y, 0.0),
            Units::Degrees => {
                if !(-90.0..=90.0).contains(&y) {
                    return Err(out_of_domain());
                }
                (x.to_radians(), y.to_radians(), 0.0)
            }
            Units::Mercator => {
                let (lon, lat) = BuiltinReprojector::mercator_to_lonlat(x, y);
                (lon.to_radians(), lat.to_radians(), 0.0)
            }
        };
        transform(&self.src, &self.dst, &mut point).map_err(|_| out_of_domain())?;
        let (qx, qy) = match self.dst_units {
            Units::Projected => (point.0, point.1),
            Units::Degrees => (point.0.to_degrees(), point.1.to_degrees()),
            Units::Mercator => {
                BuiltinReprojector::lonlat_to_mercator(point.0.to_degrees(), point.1.to_degrees())
            }
        };
        if !qx.is_finite() || !qy.is_finite() {
            return Err(out_of_domain());
        }
        Ok((qx, qy))
    }
}

/// Reprojector for any pair [`proj_string`] knows.
///
/// EPSG:4326 <-> EPSG:3857 keeps the closed-form [`BuiltinReprojector`]
/// path; everything else is parsed into `proj4rs` projections once per call.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProjReprojector;

impl ProjReprojector {
    fn builtin_covers(src: &Crs, dst: &Crs) -> bool {
        family(src).is_some() && family(dst).is_some()
    }
}

impl Reprojector for ProjReprojector {
    fn reproject_point(
        &self,
        x: f64,
        y: f64,
        src: &Crs,
        dst: &Crs,
    ) -> Result<(f64, f64), ReprojectError> {
        src.ensure_resolved()?;
        dst.ensure_resolved()?;
        if src == dst || Self::builtin_covers(src, dst) {
            return BuiltinReprojector.reproject_point(x, y, src, dst);
        }
        ProjPair::new(src, dst)?.apply(x, y, src)
    }

    fn reproject_bbox(&self, bbox: &BoundingBox, dst: &Crs) -> Result<BoundingBox, ReprojectError> {
        bbox.crs.ensure_resolved()?;
        dst.ensure_resolved()?;
        if &bbox.crs == dst || Self::builtin_covers(&bbox.crs, dst) {
            return BuiltinReprojector.reproject_bbox(bbox, dst);
        }
        let pair = ProjPair::new(&bbox.crs, dst)?;
        densified_bounds(bbox, dst, |x, y| pair.apply(x, y, &bbox.crs))
    }
}
