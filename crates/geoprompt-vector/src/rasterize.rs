use geoprompt_core::{AffineTransform, Band, Crs, InvalidInput};
use log::debug;

use crate::{Polygon, VectorError};

/// Burn `shapes` into a `width x height` band on the grid given by `transform`.
///
/// A cell takes a shape's value when its centre lies inside the polygon
/// (holes excluded). Later shapes overwrite earlier ones; untouched cells keep
/// `fill`. Every polygon must be in `crs`.
pub fn rasterize_polygons<'a>(
    shapes: impl IntoIterator<Item = (&'a Polygon, f64)>,
    transform: &AffineTransform,
    crs: &Crs,
    width: usize,
    height: usize,
    fill: f64,
) -> Result<Band, VectorError> {
    let inv = transform.invert()?;
    let mut band = Band::new(width, height, fill);
    let mut burned = 0usize;

    for (polygon, value) in shapes {
        if &polygon.crs != crs {
            return Err(InvalidInput::CrsMismatch {
                expected: crs.clone(),
                got: polygon.crs.clone(),
            }
            .into());
        }
        let b = polygon.bounds();
        if !(b.x_min.is_finite() && b.y_min.is_finite()) {
            continue;
        }
        // pixel-space extent of the polygon, widened to whole cells
        let [c0, r0, c1, r1] = inv.apply_rect(b.x_min, b.y_min, b.x_max, b.y_max);
        let col_lo = c0.floor().max(0.0) as usize;
        let row_lo = r0.floor().max(0.0) as usize;
        let col_hi = (c1.ceil().max(0.0) as usize).min(width);
        let row_hi = (r1.ceil().max(0.0) as usize).min(height);

        for row in row_lo..row_hi {
            for col in col_lo..col_hi {
                let (x, y) = transform.apply(col as f64 + 0.5, row as f64 + 0.5);
                if polygon.contains(x, y) {
                    band.data[row * width + col] = value;
                    burned += 1;
                }
            }
        }
    }
    debug!("rasterized {burned} cells into {width}x{height} grid");
    Ok(band)
}
