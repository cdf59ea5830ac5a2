use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::InvalidInput;

/// Opaque coordinate reference system identifier, e.g. `EPSG:3857`.
///
/// The authority prefix is upper-cased on construction so `epsg:4326` and
/// `EPSG:4326` compare equal; the code itself is kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Crs(String);

impl Crs {
    /// Placeholder for "the active project's display CRS".
    pub const PROJECT: &'static str = "project";

    pub fn new(id: impl Into<String>) -> Self {
        let id: String = id.into();
        let id = id.trim();
        match id.split_once(':') {
            Some((auth, code)) => Self(format!("{}:{}", auth.to_ascii_uppercase(), code.trim())),
            None => Self(id.to_string()),
        }
    }

    pub fn epsg(code: u32) -> Self {
        Self(format!("EPSG:{code}"))
    }

    pub fn project() -> Self {
        Self(Self::PROJECT.to_string())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_project(&self) -> bool {
        self.0.eq_ignore_ascii_case(Self::PROJECT)
    }

    /// Numeric code for `EPSG:nnnn` identifiers.
    pub fn epsg_code(&self) -> Option<u32> {
        self.0.strip_prefix("EPSG:")?.parse().ok()
    }

    /// Replace the project placeholder with the concrete project CRS.
    pub fn resolve_project(self, project: &Crs) -> Crs {
        if self.is_project() {
            project.clone()
        } else {
            self
        }
    }

    pub fn ensure_resolved(&self) -> Result<(), InvalidInput> {
        if self.is_project() {
            return Err(InvalidInput::UnresolvedCrs(self.0.clone()));
        }
        Ok(())
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Crs {
    fn from(value: String) -> Self {
        Crs::new(value)
    }
}

impl From<&str> for Crs {
    fn from(value: &str) -> Self {
        Crs::new(value)
    }
}

impl From<Crs> for String {
    fn from(value: Crs) -> Self {
        value.0
    }
}

impl FromStr for Crs {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Crs::new(s))
    }
}

/// Axis-aligned rectangle in a declared CRS.
///
/// Construction does not validate; consumers call [`BoundingBox::validate`]
/// before doing any work with a box.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
    pub crs: Crs,
}

impl BoundingBox {
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64, crs: impl Into<Crs>) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
            crs: crs.into(),
        }
    }

    /// Build a validated box from two opposite corners in any order.
    pub fn from_corners(
        p0: (f64, f64),
        p1: (f64, f64),
        crs: impl Into<Crs>,
    ) -> Result<Self, InvalidInput> {
        let bbox = Self::new(
            p0.0.min(p1.0),
            p0.1.min(p1.1),
            p0.0.max(p1.0),
            p0.1.max(p1.1),
            crs,
        );
        bbox.validate()?;
        Ok(bbox)
    }

    /// Reject non-finite, inverted, and zero-area boxes.
    pub fn validate(&self) -> Result<(), InvalidInput> {
        let finite = [self.x_min, self.y_min, self.x_max, self.y_max]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.x_min >= self.x_max || self.y_min >= self.y_max {
            return Err(self.degenerate());
        }
        Ok(())
    }

    fn degenerate(&self) -> InvalidInput {
        InvalidInput::DegenerateBox {
            x_min: self.x_min,
            y_min: self.y_min,
            x_max: self.x_max,
            y_max: self.y_max,
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f64, f64) {
        (
            0.5 * (self.x_min + self.x_max),
            0.5 * (self.y_min + self.y_max),
        )
    }

    /// Inclusive containment test.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }

    pub fn ensure_same_crs(&self, other: &BoundingBox) -> Result<(), InvalidInput> {
        if self.crs != other.crs {
            return Err(InvalidInput::CrsMismatch {
                expected: self.crs.clone(),
                got: other.crs.clone(),
            });
        }
        Ok(())
    }

    /// Overlap of two boxes in the same CRS, `None` if it has no area.
    pub fn intersection(&self, other: &BoundingBox) -> Result<Option<BoundingBox>, InvalidInput> {
        self.ensure_same_crs(other)?;
        let out = BoundingBox::new(
            self.x_min.max(other.x_min),
            self.y_min.max(other.y_min),
            self.x_max.min(other.x_max),
            self.y_max.min(other.y_max),
            self.crs.clone(),
        );
        Ok(out.validate().ok().map(|_| out))
    }

    pub fn union(&self, other: &BoundingBox) -> Result<BoundingBox, InvalidInput> {
        self.ensure_same_crs(other)?;
        Ok(BoundingBox::new(
            self.x_min.min(other.x_min),
            self.y_min.min(other.y_min),
            self.x_max.max(other.x_max),
            self.y_max.max(other.y_max),
            self.crs.clone(),
        ))
    }

    /// Same rectangle relabelled with another CRS. Coordinates are untouched.
    pub fn with_crs(&self, crs: Crs) -> BoundingBox {
        BoundingBox { crs, ..self.clone() }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.8},{:.8},{:.8},{:.8} [{}]",
            self.x_min, self.y_min, self.x_max, self.y_max, self.crs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crs_normalizes_authority() {
        assert_eq!(Crs::new("epsg:4326"), Crs::epsg(4326));
        assert_eq!(Crs::new(" EPSG:3857 ").epsg_code(), Some(3857));
        assert_eq!(Crs::new("ESRI:102100").epsg_code(), None);
    }

    #[test]
    fn project_placeholder_must_be_resolved() {
        let p = Crs::project();
        assert!(p.ensure_resolved().is_err());
        let resolved = p.resolve_project(&Crs::epsg(32633));
        assert_eq!(resolved, Crs::epsg(32633));
        assert!(resolved.ensure_resolved().is_ok());
        assert_eq!(Crs::epsg(4326).resolve_project(&Crs::epsg(3857)), Crs::epsg(4326));
    }

    #[test]
    fn degenerate_boxes_are_rejected() {
        assert!(BoundingBox::new(0.0, 0.0, 0.0, 10.0, "EPSG:3857").validate().is_err());
        assert!(BoundingBox::new(0.0, 5.0, 10.0, 5.0, "EPSG:3857").validate().is_err());
        assert!(BoundingBox::new(10.0, 0.0, 0.0, 10.0, "EPSG:3857").validate().is_err());
        assert!(BoundingBox::new(0.0, 0.0, f64::NAN, 10.0, "EPSG:3857").validate().is_err());
        assert!(BoundingBox::new(0.0, 0.0, 1.0, 1.0, "EPSG:3857").validate().is_ok());
    }

    #[test]
    fn from_corners_orders_coordinates() {
        let b = BoundingBox::from_corners((10.0, 2.0), (0.0, 8.0), Crs::epsg(3857)).unwrap();
        assert_eq!((b.x_min, b.y_min, b.x_max, b.y_max), (0.0, 2.0, 10.0, 8.0));
    }

    #[test]
    fn boxes_in_different_crs_do_not_combine() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0, "EPSG:3857");
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0, "EPSG:4326");
        assert!(matches!(
            a.intersection(&b),
            Err(InvalidInput::CrsMismatch { .. })
        ));
        assert!(a.union(&b).is_err());

        let c = b.with_crs(Crs::epsg(3857));
        let overlap = a.intersection(&c).unwrap().unwrap();
        assert_eq!((overlap.x_min, overlap.x_max), (5.0, 10.0));
        let far = BoundingBox::new(20.0, 20.0, 30.0, 30.0, "EPSG:3857");
        assert!(a.intersection(&far).unwrap().is_none());
    }

    #[test]
    fn crs_serializes_as_plain_string() {
        let b = BoundingBox::new(0.0, 0.0, 1.0, 2.0, "epsg:3857");
        let json = serde_json::to_string(&b).unwrap();
        assert!(json.contains("\"crs\":\"EPSG:3857\""));
        let back: BoundingBox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
    }
}
