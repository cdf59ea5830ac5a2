use geoprompt_core::{AffineTransform, Band, BoundingBox, Crs, InvalidInput};
use serde::{Deserialize, Serialize};

use crate::RasterError;

/// Rectangular block of a raster's pixel grid.
///
/// Offsets are signed so a window may start left of / above the raster; the
/// out-of-raster part reads as nodata.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelWindow {
    pub col_off: i64,
    pub row_off: i64,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub const fn new(col_off: i64, row_off: i64, width: usize, height: usize) -> Self {
        Self {
            col_off,
            row_off,
            width,
            height,
        }
    }

    #[inline]
    pub fn col_end(&self) -> i64 {
        self.col_off + self.width as i64
    }

    #[inline]
    pub fn row_end(&self) -> i64 {
        self.row_off + self.height as i64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    pub fn contains(&self, col: i64, row: i64) -> bool {
        col >= self.col_off && col < self.col_end() && row >= self.row_off && row < self.row_end()
    }

    /// Overlap with `other`. Disjoint windows give an empty window anchored
    /// at the clamped offset.
    pub fn intersection(&self, other: &PixelWindow) -> PixelWindow {
        let c0 = self.col_off.max(other.col_off);
        let r0 = self.row_off.max(other.row_off);
        let c1 = self.col_end().min(other.col_end());
        let r1 = self.row_end().min(other.row_end());
        PixelWindow::new(c0, r0, (c1 - c0).max(0) as usize, (r1 - r0).max(0) as usize)
    }

    /// Same window moved by `(dc, dr)` pixels.
    pub fn offset(&self, dc: i64, dr: i64) -> PixelWindow {
        PixelWindow::new(self.col_off + dc, self.row_off + dr, self.width, self.height)
    }

    /// World bounds of this window under `transform`.
    pub fn bounds(&self, transform: &AffineTransform) -> [f64; 4] {
        transform.apply_rect(
            self.col_off as f64,
            self.row_off as f64,
            self.col_end() as f64,
            self.row_end() as f64,
        )
    }
}

/// Read access to a georeferenced multi-band raster.
///
/// Bands are zero-based. Reads outside the raster extent yield `NaN`.
pub trait RasterSource: Send + Sync {
    fn native_crs(&self) -> &Crs;

    /// Pixel to world transform of the full raster.
    fn transform(&self) -> AffineTransform;

    /// `(width, height)` in pixels.
    fn size(&self) -> (usize, usize);

    fn band_count(&self) -> usize;

    fn read_window(&self, band: usize, window: &PixelWindow) -> Result<Band, RasterError>;

    /// World units per pixel `(sx, sy)`, both positive.
    fn ground_resolution(&self) -> (f64, f64) {
        self.transform().pixel_size()
    }

    fn bounds(&self) -> BoundingBox {
        let (w, h) = self.size();
        let [x0, y0, x1, y1] = self.transform().apply_rect(0.0, 0.0, w as f64, h as f64);
        BoundingBox::new(x0, y0, x1, y1, self.native_crs().clone())
    }

    /// Nearest-neighbour read of `bbox` (in the native CRS) into an
    /// `out_w x out_h` grid, sampling at output pixel centres.
    ///
    /// Reads go one output row at a time: only the raster cells that row
    /// samples are fetched, and consecutive rows hitting the same source
    /// window share one read.
    fn read_resampled(
        &self,
        band: usize,
        bbox: &BoundingBox,
        out_w: usize,
        out_h: usize,
    ) -> Result<Band, RasterError> {
        bbox.validate()?;
        if out_w == 0 || out_h == 0 {
            return Err(InvalidInput::NonPositive {
                name: "output size",
            }
            .into());
        }
        let native = self.native_crs();
        if &bbox.crs != native {
            return Err(InvalidInput::CrsMismatch {
                expected: native.clone(),
                got: bbox.crs.clone(),
            }
            .into());
        }

        let inv = self.transform().invert()?;
        let (width, height) = self.size();
        let extent = PixelWindow::new(0, 0, width, height);

        let step_x = bbox.width() / out_w as f64;
        let step_y = bbox.height() / out_h as f64;
        let mut data = Vec::with_capacity(out_w * out_h);
        let mut cells = Vec::with_capacity(out_w);
        let mut cached: Option<(PixelWindow, Band)> = None;
        for j in 0..out_h {
            let y = bbox.y_max - (j as f64 + 0.5) * step_y;
            cells.clear();
            let (mut c_lo, mut r_lo, mut c_hi, mut r_hi) = (i64::MAX, i64::MAX, i64::MIN, i64::MIN);
            for i in 0..out_w {
                let x = bbox.x_min + (i as f64 + 0.5) * step_x;
                let (c, r) = inv.apply(x, y);
                let (c, r) = (c.floor() as i64, r.floor() as i64);
                if extent.contains(c, r) {
                    c_lo = c_lo.min(c);
                    r_lo = r_lo.min(r);
                    c_hi = c_hi.max(c);
                    r_hi = r_hi.max(r);
                }
                cells.push((c, r));
            }
            if c_lo > c_hi {
                data.extend(std::iter::repeat(f64::NAN).take(out_w));
                continue;
            }

            let window = PixelWindow::new(
                c_lo,
                r_lo,
                (c_hi - c_lo + 1) as usize,
                (r_hi - r_lo + 1) as usize,
            );
            if !matches!(&cached, Some((w, _)) if *w == window) {
                cached = Some((window, self.read_window(band, &window)?));
            }
            if let Some((window, block)) = &cached {
                data.extend(cells.iter().map(|&(c, r)| {
                    if window.contains(c, r) {
                        block.get((c - window.col_off) as usize, (r - window.row_off) as usize)
                    } else {
                        f64::NAN
                    }
                }));
            }
        }
        Ok(Band::from_raw(out_w, out_h, data)?)
    }
}

/// Raster held fully in memory, one `Vec<f64>` per band.
#[derive(Clone, Debug)]
pub struct MemoryRaster {
    crs: Crs,
    transform: AffineTransform,
    width: usize,
    height: usize,
    bands: Vec<Vec<f64>>,
}

impl MemoryRaster {
    pub fn new(
        crs: Crs,
        transform: AffineTransform,
        width: usize,
        height: usize,
        bands: Vec<Vec<f64>>,
    ) -> Result<Self, RasterError> {
        crs.ensure_resolved()?;
        if !transform.is_invertible() {
            return Err(RasterError::Singular(geoprompt_core::SingularTransformError {
                det: transform.determinant(),
            }));
        }
        if let Some(bad) = bands.iter().find(|b| b.len() != width * height) {
            return Err(InvalidInput::BufferSize {
                expected: width * height,
                got: bad.len(),
            }
            .into());
        }
        Ok(Self {
            crs,
            transform,
            width,
            height,
            bands,
        })
    }

    /// Build a raster whose band `b` at pixel `(col, row)` is `f(b, col, row)`.
    pub fn from_fn(
        crs: Crs,
        transform: AffineTransform,
        width: usize,
        height: usize,
        band_count: usize,
        f: impl Fn(usize, usize, usize) -> f64,
    ) -> Result<Self, RasterError> {
        let bands = (0..band_count)
            .map(|b| {
                let mut data = Vec::with_capacity(width * height);
                for row in 0..height {
                    for col in 0..width {
                        data.push(f(b, col, row));
                    }
                }
                data
            })
            .collect();
        Self::new(crs, transform, width, height, bands)
    }

    /// Wrap single-band samples, e.g. a rasterized label grid.
    pub fn single_band(
        crs: Crs,
        transform: AffineTransform,
        band: Band,
    ) -> Result<Self, RasterError> {
        Self::new(crs, transform, band.width, band.height, vec![band.data])
    }
}

impl RasterSource for MemoryRaster {
    fn native_crs(&self) -> &Crs {
        &self.crs
    }

    fn transform(&self) -> AffineTransform {
        self.transform
    }

    fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn read_window(&self, band: usize, window: &PixelWindow) -> Result<Band, RasterError> {
        let src = self.bands.get(band).ok_or(RasterError::BandOutOfRange {
            band,
            count: self.bands.len(),
        })?;
        let full = PixelWindow::new(0, 0, self.width, self.height);
        let mut out = Band::new(window.width, window.height, f64::NAN);
        let valid = window.intersection(&full);
        for row in valid.row_off..valid.row_end() {
            let src_row = row as usize * self.width;
            let dst_row = (row - window.row_off) as usize * window.width;
            for col in valid.col_off..valid.col_end() {
                out.data[dst_row + (col - window.col_off) as usize] = src[src_row + col as usize];
            }
        }
        Ok(out)
    }
}
