use geoprompt_core::{Band, BoundingBox, InvalidInput, Reprojector, RgbImage};
use log::debug;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{ImageContext, RasterSource, SamplingError};

fn default_target_long_side() -> usize {
    1000
}

/// Configuration for building model-input images.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Long side of the model-input image in pixels.
    #[serde(default = "default_target_long_side")]
    pub target_long_side: usize,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            target_long_side: default_target_long_side(),
        }
    }
}

/// Min-max stretch of one band to `0..=255`.
///
/// A constant band (or one without finite samples) maps to all zero; nodata
/// samples map to zero as well.
pub fn normalize_band_u8(band: &Band) -> Vec<u8> {
    stretch(band, |v| (v * 255.0).round().clamp(0.0, 255.0) as u8, 0)
}

/// Min-max stretch of one band to `0.0..=1.0`, same edge cases as
/// [`normalize_band_u8`].
pub fn normalize_band_unit(band: &Band) -> Vec<f32> {
    stretch(band, |v| v as f32, 0.0)
}

fn stretch<T: Copy>(band: &Band, map: impl Fn(f64) -> T, zero: T) -> Vec<T> {
    let Some((lo, hi)) = band.min_max() else {
        return vec![zero; band.data.len()];
    };
    let range = hi - lo;
    if range <= 0.0 {
        return vec![zero; band.data.len()];
    }
    band.data
        .iter()
        .map(|&v| {
            if v.is_finite() {
                map((v - lo) / range)
            } else {
                zero
            }
        })
        .collect()
}

/// Sample `bbox` (any CRS) from `raster` into a normalized RGB model input.
///
/// The image long side equals `params.target_long_side`; the short side keeps
/// the native aspect ratio. Rasters with fewer than three bands repeat their
/// last band; bands past the third are ignored.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(bbox = %bbox))
)]
pub fn sample_image<R: RasterSource + ?Sized>(
    raster: &R,
    bbox: &BoundingBox,
    reprojector: &dyn Reprojector,
    params: &SamplingParams,
) -> Result<ImageContext, SamplingError> {
    bbox.validate()?;
    if params.target_long_side == 0 {
        return Err(InvalidInput::NonPositive {
            name: "target_long_side",
        }
        .into());
    }
    let band_count = raster.band_count();
    if band_count == 0 {
        return Err(SamplingError::NoBands);
    }

    let native_bbox = reprojector.reproject_bbox(bbox, raster.native_crs())?;
    native_bbox.validate()?;

    let (sx, sy) = raster.ground_resolution();
    if !(sx > 0.0 && sy > 0.0) {
        return Err(InvalidInput::NonPositive {
            name: "ground_resolution",
        }
        .into());
    }

    let native_w = (native_bbox.width() / sx).round() as usize;
    let native_h = (native_bbox.height() / sy).round() as usize;
    if native_w == 0 || native_h == 0 {
        return Err(SamplingError::EmptyWindow {
            width: native_w,
            height: native_h,
        });
    }

    let s = params.target_long_side as f64 / native_w.max(native_h) as f64;
    let width = (native_w as f64 * s).round() as usize;
    let height = (native_h as f64 * s).round() as usize;
    if width == 0 || height == 0 {
        return Err(SamplingError::EmptyWindow { width, height });
    }
    debug!(
        "sampling {native_w}x{native_h} native pixels into {width}x{height} (factor {s:.6})"
    );

    let mut planes = Vec::with_capacity(RgbImage::CHANNELS);
    for band in 0..band_count.min(RgbImage::CHANNELS) {
        let samples = raster.read_resampled(band, &native_bbox, width, height)?;
        planes.push(normalize_band_u8(&samples));
    }
    while planes.len() < RgbImage::CHANNELS {
        let last = planes[planes.len() - 1].clone();
        planes.push(last);
    }
    let image = RgbImage::from_planes(width, height, [&planes[0], &planes[1], &planes[2]])?;

    Ok(ImageContext::new(image, native_bbox, (sx, sy), s))
}
