//! Images georeferenced by an ESRI world file.
//!
//! A world file holds six numbers, one per line: `A D B E C F`, where
//! `(C, F)` is the *centre* of the top-left pixel. [`AffineTransform`] uses
//! the corner convention, so loading shifts the origin by half a pixel.
//!
//! Samples are kept at their stored values (no scaling), which makes the
//! loader usable for both imagery and class-id label rasters. Alpha
//! channels are dropped.

use std::fs;
use std::path::{Path, PathBuf};

use geoprompt_core::{AffineTransform, Crs};
use geoprompt_raster::{MemoryRaster, RasterError};
use image::{DynamicImage, ImageError};
use log::debug;

fn image_error(e: ImageError) -> RasterError {
    match e {
        ImageError::IoError(io) => RasterError::Io(io),
        other => RasterError::Format(other.to_string()),
    }
}

/// Candidate sidecar paths for `image`, most specific first:
/// `a.tif -> a.tfw, a.tifw, a.wld`.
pub fn world_file_candidates(image: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(ext) = image.extension().and_then(|e| e.to_str()) {
        if let (Some(first), Some(last)) = (ext.chars().next(), ext.chars().last()) {
            if ext.len() >= 2 {
                out.push(image.with_extension(format!("{first}{last}w")));
            }
        }
        out.push(image.with_extension(format!("{ext}w")));
    }
    out.push(image.with_extension("wld"));
    out
}

/// First existing world file next to `image`.
pub fn find_world_file(image: &Path) -> Option<PathBuf> {
    world_file_candidates(image).into_iter().find(|p| p.is_file())
}

/// Parse world-file text into a corner-origin transform.
pub fn parse_world_file(text: &str) -> Result<AffineTransform, RasterError> {
    let values = text
        .split_whitespace()
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|_| RasterError::Format(format!("bad world file value {tok:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let [a, d, b, e, c, f] = values[..] else {
        return Err(RasterError::Format(format!(
            "world file needs 6 values, got {}",
            values.len()
        )));
    };
    Ok(AffineTransform::new(
        a,
        b,
        c - a / 2.0 - b / 2.0,
        d,
        e,
        f - d / 2.0 - e / 2.0,
    ))
}

/// World-file text for `transform` (pixel-centre origin, 10 decimals).
pub fn format_world_file(transform: &AffineTransform) -> String {
    let t = transform;
    let cx = t.c + t.a / 2.0 + t.b / 2.0;
    let cy = t.f + t.d / 2.0 + t.e / 2.0;
    [t.a, t.d, t.b, t.e, cx, cy]
        .iter()
        .map(|v| format!("{v:.10}\n"))
        .collect()
}

pub fn write_world_file(path: impl AsRef<Path>, transform: &AffineTransform) -> Result<(), RasterError> {
    fs::write(path, format_world_file(transform))?;
    Ok(())
}

fn split_channels<T: Copy + Into<f64>>(raw: &[T], stride: usize, keep: usize) -> Vec<Vec<f64>> {
    (0..keep)
        .map(|c| raw.iter().skip(c).step_by(stride).map(|&v| v.into()).collect())
        .collect()
}

fn image_bands(img: &DynamicImage) -> Result<Vec<Vec<f64>>, RasterError> {
    let bands = match img {
        DynamicImage::ImageLuma8(b) => split_channels(b.as_raw(), 1, 1),
        DynamicImage::ImageLumaA8(b) => split_channels(b.as_raw(), 2, 1),
        DynamicImage::ImageRgb8(b) => split_channels(b.as_raw(), 3, 3),
        DynamicImage::ImageRgba8(b) => split_channels(b.as_raw(), 4, 3),
        DynamicImage::ImageLuma16(b) => split_channels(b.as_raw(), 1, 1),
        DynamicImage::ImageLumaA16(b) => split_channels(b.as_raw(), 2, 1),
        DynamicImage::ImageRgb16(b) => split_channels(b.as_raw(), 3, 3),
        DynamicImage::ImageRgba16(b) => split_channels(b.as_raw(), 4, 3),
        DynamicImage::ImageRgb32F(b) => split_channels(b.as_raw(), 3, 3),
        DynamicImage::ImageRgba32F(b) => split_channels(b.as_raw(), 4, 3),
        other => {
            return Err(RasterError::Format(format!(
                "unsupported pixel layout {:?}",
                other.color()
            )))
        }
    };
    Ok(bands)
}

/// Load `path` and its world file into an in-memory raster tagged `crs`.
pub fn load_world_file_raster(path: impl AsRef<Path>, crs: Crs) -> Result<MemoryRaster, RasterError> {
    let path = path.as_ref();
    let world = find_world_file(path).ok_or_else(|| {
        RasterError::Format(format!("no world file found for {}", path.display()))
    })?;
    let transform = parse_world_file(&fs::read_to_string(&world)?)?;
    let img = image::open(path).map_err(image_error)?;
    let (width, height) = (img.width() as usize, img.height() as usize);
    let bands = image_bands(&img)?;
    debug!(
        "loaded {} ({width}x{height}, {} bands) georeferenced by {}",
        path.display(),
        bands.len(),
        world.display()
    );
    MemoryRaster::new(crs, transform, width, height, bands)
}
