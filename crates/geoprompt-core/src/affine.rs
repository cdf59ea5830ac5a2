use crate::SingularTransformError;
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

/// Determinants below this magnitude are treated as singular.
pub const SINGULAR_EPS: f64 = 1e-12;

/// 2D affine map from pixel space `(col, row)` to world space `(x, y)`.
///
/// Coefficients follow the usual raster convention:
///
/// ```text
/// x = a * col + b * row + c
/// y = d * col + e * row + f
/// ```
///
/// Pixel `(0, 0)` is the top-left corner of the top-left pixel, so for a
/// north-up raster `e` is negative and `f` is the top edge (`y_max`).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    pub const fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0)
    }

    pub const fn translation(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, tx, 0.0, 1.0, ty)
    }

    pub const fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, 0.0, sy, 0.0)
    }

    /// North-up transform covering `[xmin, xmax] x [ymin, ymax]` with a
    /// `width x height` pixel grid. Row 0 maps to `ymax`.
    pub fn from_bounds(
        xmin: f64,
        ymin: f64,
        xmax: f64,
        ymax: f64,
        width: usize,
        height: usize,
    ) -> Self {
        Self::new(
            (xmax - xmin) / width as f64,
            0.0,
            xmin,
            0.0,
            (ymin - ymax) / height as f64,
            ymax,
        )
    }

    /// Build from a GDAL-style geotransform `[c, a, b, f, d, e]`.
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self::new(gt[1], gt[2], gt[0], gt[4], gt[5], gt[3])
    }

    /// GDAL-style geotransform `[c, a, b, f, d, e]`.
    pub fn to_gdal(&self) -> [f64; 6] {
        [self.c, self.a, self.b, self.f, self.d, self.e]
    }

    pub fn to_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.a, self.b, self.c, //
            self.d, self.e, self.f, //
            0.0, 0.0, 1.0,
        )
    }

    /// Take the affine part of a 3x3 matrix. The projective row is ignored.
    pub fn from_matrix(m: &Matrix3<f64>) -> Self {
        Self::new(
            m[(0, 0)],
            m[(0, 1)],
            m[(0, 2)],
            m[(1, 0)],
            m[(1, 1)],
            m[(1, 2)],
        )
    }

    #[inline]
    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    #[inline]
    pub fn is_invertible(&self) -> bool {
        self.determinant().abs() >= SINGULAR_EPS
    }

    /// `self ∘ other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &AffineTransform) -> AffineTransform {
        AffineTransform::new(
            self.a * other.a + self.b * other.d,
            self.a * other.b + self.b * other.e,
            self.a * other.c + self.b * other.f + self.c,
            self.d * other.a + self.e * other.d,
            self.d * other.b + self.e * other.e,
            self.d * other.c + self.e * other.f + self.f,
        )
    }

    pub fn invert(&self) -> Result<AffineTransform, SingularTransformError> {
        let det = self.determinant();
        if det.abs() < SINGULAR_EPS {
            return Err(SingularTransformError { det });
        }
        let ia = self.e / det;
        let ib = -self.b / det;
        let id = -self.d / det;
        let ie = self.a / det;
        Ok(AffineTransform::new(
            ia,
            ib,
            -(ia * self.c + ib * self.f),
            id,
            ie,
            -(id * self.c + ie * self.f),
        ))
    }

    /// Pixel `(col, row)` to world `(x, y)`.
    #[inline]
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// World `(x, y)` to pixel `(col, row)`.
    pub fn apply_inv(&self, x: f64, y: f64) -> Result<(f64, f64), SingularTransformError> {
        let inv = self.invert()?;
        Ok(inv.apply(x, y))
    }

    /// Integer pixel index `(row, col)` nearest to the world point, rounding
    /// half away from zero.
    pub fn rowcol(&self, x: f64, y: f64) -> Result<(i64, i64), SingularTransformError> {
        let (col, row) = self.apply_inv(x, y)?;
        Ok((row.round() as i64, col.round() as i64))
    }

    /// Axis-aligned bounds `[xmin, ymin, xmax, ymax]` of the image of the
    /// rectangle `[x0, x1] x [y0, y1]`.
    pub fn apply_rect(&self, x0: f64, y0: f64, x1: f64, y1: f64) -> [f64; 4] {
        let corners = [
            self.apply(x0, y0),
            self.apply(x1, y0),
            self.apply(x1, y1),
            self.apply(x0, y1),
        ];
        let mut out = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
        for (x, y) in corners {
            out[0] = out[0].min(x);
            out[1] = out[1].min(y);
            out[2] = out[2].max(x);
            out[3] = out[3].max(y);
        }
        out
    }

    /// Ground size of one pixel `(|a|, |e|)` for a north-up transform.
    ///
    /// For rotated transforms this is the length of the column/row basis
    /// vectors instead.
    pub fn pixel_size(&self) -> (f64, f64) {
        if self.b == 0.0 && self.d == 0.0 {
            (self.a.abs(), self.e.abs())
        } else {
            (self.a.hypot(self.d), self.b.hypot(self.e))
        }
    }

    pub fn is_north_up(&self) -> bool {
        self.b == 0.0 && self.d == 0.0 && self.a > 0.0 && self.e < 0.0
    }
}
