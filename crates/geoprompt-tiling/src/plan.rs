use geoprompt_core::{AffineTransform, BoundingBox, InvalidInput};
use geoprompt_raster::PixelWindow;
use log::debug;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::TilingError;

fn default_window_size() -> usize {
    256
}

/// Window geometry for dataset tiles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilingParams {
    /// Side of a square tile in raster pixels.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Step between tile origins; `None` means `window_size` (no overlap).
    #[serde(default)]
    pub stride: Option<usize>,
}

impl Default for TilingParams {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            stride: None,
        }
    }
}

impl TilingParams {
    pub fn effective_stride(&self) -> usize {
        self.stride.unwrap_or(self.window_size)
    }

    pub fn validate(&self) -> Result<(), InvalidInput> {
        if self.window_size == 0 {
            return Err(InvalidInput::NonPositive {
                name: "window_size",
            });
        }
        if self.stride == Some(0) {
            return Err(InvalidInput::NonPositive { name: "stride" });
        }
        Ok(())
    }
}

/// Matching raster and label windows of one tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileWindows {
    pub raster: PixelWindow,
    pub label: PixelWindow,
}

/// A planned tile of a dataset export.
///
/// `index` is global across all ROIs and names the output files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub index: usize,
    pub roi_id: u64,
    pub raster_window: PixelWindow,
    pub label_window: PixelWindow,
}

fn grid_step(t: &AffineTransform) -> (f64, f64) {
    (t.a.abs(), t.e.abs())
}

fn same_grid(a: (f64, f64), b: (f64, f64)) -> bool {
    let close = |x: f64, y: f64| (x - y).abs() <= 1e-9 * x.abs().max(y.abs());
    close(a.0, b.0) && close(a.1, b.1)
}

/// Pixel footprint of `bbox` in the grid of `transform`: origin at the
/// pixel nearest the top-left corner, size in whole pixels.
pub(crate) fn roi_extent(
    transform: &AffineTransform,
    bbox: &BoundingBox,
) -> Result<PixelWindow, TilingError> {
    let (sx, sy) = grid_step(transform);
    let (row0, col0) = transform.rowcol(bbox.x_min, bbox.y_max)?;
    let width = (bbox.width() / sx).round() as usize;
    let height = (bbox.height() / sy).round() as usize;
    if width == 0 || height == 0 {
        return Err(TilingError::EmptyWindow { width, height });
    }
    Ok(PixelWindow::new(col0, row0, width, height))
}

/// Slice the ROI into aligned raster/label windows.
///
/// The ROI is measured in the raster grid. Window origins step by the stride
/// from the ROI's top-left pixel up to and including the far edge; every
/// window is clipped to the ROI and windows that end up empty are dropped.
/// Label windows sit at the same offsets from the ROI origin in the label
/// grid and take the clipped shape. Tiles are ordered by column offset
/// first, then row offset.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(roi = %roi_bbox))
)]
pub fn plan_tiles(
    raster_transform: &AffineTransform,
    label_transform: &AffineTransform,
    roi_bbox: &BoundingBox,
    params: &TilingParams,
) -> Result<Vec<TileWindows>, TilingError> {
    params.validate()?;
    roi_bbox.validate()?;

    let step = grid_step(raster_transform);
    let label_step = grid_step(label_transform);
    if !same_grid(step, label_step) {
        return Err(TilingError::GridMismatch {
            raster: step,
            label: label_step,
        });
    }

    let extent = roi_extent(raster_transform, roi_bbox)?;
    let (lrow0, lcol0) = label_transform.rowcol(roi_bbox.x_min, roi_bbox.y_max)?;
    let (col0, row0, width, height) = (extent.col_off, extent.row_off, extent.width, extent.height);

    let ws = params.window_size;
    let stride = params.effective_stride();
    let mut tiles = Vec::new();
    for dc in (0..=width).step_by(stride) {
        for dr in (0..=height).step_by(stride) {
            let (dc, dr) = (dc as i64, dr as i64);
            let raster = PixelWindow::new(col0 + dc, row0 + dr, ws, ws).intersection(&extent);
            if raster.is_empty() {
                continue;
            }
            let label = PixelWindow::new(lcol0 + dc, lrow0 + dr, raster.width, raster.height);
            tiles.push(TileWindows { raster, label });
        }
    }
    debug!(
        "roi {width}x{height} px at ({col0}, {row0}): {} tiles of {ws} px, stride {stride}",
        tiles.len()
    );
    Ok(tiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoprompt_core::Crs;
    use std::collections::HashSet;

    fn grid() -> AffineTransform {
        AffineTransform::from_bounds(0.0, 0.0, 1024.0, 1024.0, 1024, 1024)
    }

    fn roi() -> BoundingBox {
        BoundingBox::new(100.0, 300.0, 612.0, 812.0, Crs::epsg(3857))
    }

    #[test]
    fn non_overlapping_tiles() {
        let tiles = plan_tiles(&grid(), &grid(), &roi(), &TilingParams::default()).unwrap();
        assert_eq!(tiles.len(), 4);
        // roi top-left: x 100 -> col 100, y 812 -> row 212
        assert_eq!(tiles[0].raster, PixelWindow::new(100, 212, 256, 256));
        // column offset varies slowest
        assert_eq!(tiles[1].raster, PixelWindow::new(100, 468, 256, 256));
        assert_eq!(tiles[2].raster, PixelWindow::new(356, 212, 256, 256));
        for t in &tiles {
            assert_eq!(t.raster, t.label);
        }
    }

    #[test]
    fn overlapping_tiles_cover_every_pixel() {
        let params = TilingParams {
            window_size: 256,
            stride: Some(128),
        };
        let tiles = plan_tiles(&grid(), &grid(), &roi(), &params).unwrap();
        assert_eq!(tiles.len(), 16);
        let mut covered = HashSet::new();
        for t in &tiles {
            let w = t.raster;
            assert!(w.width <= 256 && w.height <= 256);
            for r in w.row_off..w.row_end() {
                for c in w.col_off..w.col_end() {
                    covered.insert((c, r));
                }
            }
        }
        assert_eq!(covered.len(), 512 * 512);
        // trailing windows are clipped, not padded
        assert_eq!(tiles.last().unwrap().raster, PixelWindow::new(484, 596, 128, 128));
    }

    #[test]
    fn label_grid_offset_is_preserved() {
        // label raster covers a larger area, so the same roi starts elsewhere
        let label = AffineTransform::from_bounds(-50.0, 0.0, 1024.0, 1074.0, 1074, 1074);
        let tiles = plan_tiles(&grid(), &label, &roi(), &TilingParams::default()).unwrap();
        assert_eq!(tiles[0].label, PixelWindow::new(150, 262, 256, 256));
        for t in &tiles {
            assert_eq!((t.raster.width, t.raster.height), (t.label.width, t.label.height));
            // identical world footprint
            let a = t.raster.bounds(&grid());
            let b = t.label.bounds(&label);
            for k in 0..4 {
                assert!((a[k] - b[k]).abs() <= 0.5);
            }
        }
    }

    #[test]
    fn ragged_roi_keeps_thin_trailing_windows() {
        let roi = BoundingBox::new(0.0, 724.0, 300.0, 1024.0, Crs::epsg(3857));
        let tiles = plan_tiles(&grid(), &grid(), &roi, &TilingParams::default()).unwrap();
        let widths: Vec<usize> = tiles.iter().map(|t| t.raster.width).collect();
        assert_eq!(widths, vec![256, 256, 44, 44]);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let zero = TilingParams {
            window_size: 0,
            stride: None,
        };
        assert!(matches!(
            plan_tiles(&grid(), &grid(), &roi(), &zero),
            Err(TilingError::Invalid(InvalidInput::NonPositive { name: "window_size" }))
        ));
        let zero_stride = TilingParams {
            window_size: 64,
            stride: Some(0),
        };
        assert!(plan_tiles(&grid(), &grid(), &roi(), &zero_stride).is_err());

        let coarse = AffineTransform::from_bounds(0.0, 0.0, 1024.0, 1024.0, 512, 512);
        assert!(matches!(
            plan_tiles(&grid(), &coarse, &roi(), &TilingParams::default()),
            Err(TilingError::GridMismatch { .. })
        ));
    }

    #[test]
    fn sub_pixel_roi_is_empty() {
        let tiny = BoundingBox::new(10.0, 10.0, 10.3, 20.0, Crs::epsg(3857));
        assert!(matches!(
            plan_tiles(&grid(), &grid(), &tiny, &TilingParams::default()),
            Err(TilingError::EmptyWindow { width: 0, .. })
        ));
    }
}
