//! Training-set export: aligned image/label tiles as `.npy` files.
//!
//! Layout under the output directory:
//!
//! ```text
//! images/0000.npy   float32, bands x height x width, per-band min-max in [0, 1]
//! labels/0000.npy   int32, height x width, raw class ids (nodata -> 0)
//! manifest.json     every tile with its roi id and both windows
//! ```

use std::fs;
use std::path::Path;

use geoprompt_core::{AffineTransform, InvalidInput, Reprojector};
use geoprompt_raster::{normalize_band_unit, MemoryRaster, RasterError, RasterSource};
use geoprompt_vector::{rasterize_polygons, Feature};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::npy::write_npy_file;
use crate::plan::roi_extent;
use crate::{plan_tiles, RoiRecord, Tile, TileWindows, TilingError, TilingParams};

pub const IMAGES_DIR: &str = "images";
pub const LABELS_DIR: &str = "labels";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Where label tiles come from.
#[derive(Clone, Copy)]
pub enum LabelSource<'a> {
    /// An existing class-id raster on the same grid resolution as the image.
    Raster(&'a dyn RasterSource),
    /// Polygons burned per ROI on the image grid, using each feature's
    /// `class` attribute as the cell value.
    Rasterize(&'a [Feature]),
}

/// Summary written to `manifest.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub window_size: usize,
    pub stride: usize,
    pub bands: usize,
    pub tiles: Vec<Tile>,
    /// ROIs that produced no tiles (empty, invalid or outside the raster).
    pub skipped_rois: Vec<u64>,
}

impl Manifest {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, TilingError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), TilingError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// File name shared by the image and label array of tile `index`.
pub fn tile_file_name(index: usize) -> String {
    format!("{index:04}.npy")
}

enum PlannedLabel<'a> {
    Shared(&'a dyn RasterSource),
    /// Label grid rasterized over one ROI.
    Owned(MemoryRaster),
}

impl PlannedLabel<'_> {
    fn source(&self) -> &dyn RasterSource {
        match self {
            PlannedLabel::Shared(l) => *l,
            PlannedLabel::Owned(grid) => grid,
        }
    }
}

struct RoiPlan<'a> {
    roi_id: u64,
    tiles: Vec<TileWindows>,
    label: PlannedLabel<'a>,
}

fn plan_roi<'a, R: RasterSource + ?Sized>(
    raster: &R,
    labels: LabelSource<'a>,
    roi: &RoiRecord,
    reprojector: &dyn Reprojector,
    params: &TilingParams,
) -> Result<Option<RoiPlan<'a>>, TilingError> {
    let crs = raster.native_crs();
    let native = reprojector.reproject_bbox(&roi.bbox, crs)?;
    native.validate()?;
    if raster.bounds().intersection(&native)?.is_none() {
        return Ok(None);
    }
    let raster_t = raster.transform();

    let (label_t, label) = match labels {
        LabelSource::Raster(l) => (l.transform(), PlannedLabel::Shared(l)),
        LabelSource::Rasterize(features) => {
            let extent = roi_extent(&raster_t, &native)?;
            let window_t = raster_t.compose(&AffineTransform::translation(
                extent.col_off as f64,
                extent.row_off as f64,
            ));
            let band = rasterize_polygons(
                features
                    .iter()
                    .map(|f| (&f.polygon, f.attributes.class as f64)),
                &window_t,
                crs,
                extent.width,
                extent.height,
                0.0,
            )?;
            let grid = MemoryRaster::single_band(crs.clone(), window_t, band)?;
            (window_t, PlannedLabel::Owned(grid))
        }
    };

    let tiles = plan_tiles(&raster_t, &label_t, &native, params)?;
    Ok(Some(RoiPlan {
        roi_id: roi.id,
        tiles,
        label,
    }))
}

fn label_value(v: f64) -> i32 {
    if v.is_finite() {
        v.round() as i32
    } else {
        0
    }
}

fn write_tile<R: RasterSource + ?Sized>(
    raster: &R,
    label: &dyn RasterSource,
    tile: &Tile,
    out_dir: &Path,
) -> Result<(), TilingError> {
    let w = tile.raster_window;
    let bands = raster.band_count();
    let mut image = Vec::with_capacity(bands * w.area());
    for b in 0..bands {
        image.extend(normalize_band_unit(&raster.read_window(b, &w)?));
    }
    let name = tile_file_name(tile.index);
    write_npy_file(
        out_dir.join(IMAGES_DIR).join(&name),
        &[bands, w.height, w.width],
        &image,
    )?;

    let lw = tile.label_window;
    let classes: Vec<i32> = label
        .read_window(0, &lw)?
        .data
        .into_iter()
        .map(label_value)
        .collect();
    write_npy_file(
        out_dir.join(LABELS_DIR).join(&name),
        &[lw.height, lw.width],
        &classes,
    )?;
    debug!("tile {} (roi {}): {}x{} px", tile.index, tile.roi_id, w.width, w.height);
    Ok(())
}

fn check_labels<R: RasterSource + ?Sized>(
    raster: &R,
    labels: LabelSource<'_>,
) -> Result<(), TilingError> {
    let crs = raster.native_crs();
    match labels {
        LabelSource::Raster(l) => {
            if l.band_count() == 0 {
                return Err(RasterError::BandOutOfRange { band: 0, count: 0 }.into());
            }
            if l.native_crs() != crs {
                return Err(InvalidInput::CrsMismatch {
                    expected: crs.clone(),
                    got: l.native_crs().clone(),
                }
                .into());
            }
        }
        LabelSource::Rasterize(features) => {
            if let Some(f) = features.iter().find(|f| &f.polygon.crs != crs) {
                return Err(InvalidInput::CrsMismatch {
                    expected: crs.clone(),
                    got: f.polygon.crs.clone(),
                }
                .into());
            }
        }
    }
    Ok(())
}

/// Cut every ROI into image/label tiles and write them below `out_dir`.
///
/// Tiles are numbered from 0 in ROI order, then in plan order within each
/// ROI. Windows are read and written in parallel; the numbering is fixed
/// before any I/O so the output does not depend on scheduling. ROIs that are
/// invalid, empty or outside the raster are logged and skipped; I/O and
/// raster read errors abort the export.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(rois = rois.len()))
)]
pub fn export_dataset<R: RasterSource + ?Sized>(
    raster: &R,
    labels: LabelSource<'_>,
    rois: &[RoiRecord],
    reprojector: &dyn Reprojector,
    params: &TilingParams,
    out_dir: &Path,
) -> Result<Manifest, TilingError> {
    params.validate()?;
    let bands = raster.band_count();
    if bands == 0 {
        return Err(InvalidInput::NonPositive { name: "band count" }.into());
    }
    check_labels(raster, labels)?;

    let mut plans = Vec::with_capacity(rois.len());
    let mut skipped_rois = Vec::new();
    for roi in rois {
        match plan_roi(raster, labels, roi, reprojector, params) {
            Ok(Some(plan)) => plans.push(plan),
            Ok(None) => {
                warn!("roi {} does not overlap the raster, skipping", roi.id);
                skipped_rois.push(roi.id);
            }
            Err(e) if e.is_roi_local() => {
                warn!("skipping roi {}: {e}", roi.id);
                skipped_rois.push(roi.id);
            }
            Err(e) => return Err(e),
        }
    }

    let mut jobs: Vec<(Tile, usize)> = Vec::new();
    for (slot, plan) in plans.iter().enumerate() {
        for w in &plan.tiles {
            jobs.push((
                Tile {
                    index: jobs.len(),
                    roi_id: plan.roi_id,
                    raster_window: w.raster,
                    label_window: w.label,
                },
                slot,
            ));
        }
    }

    fs::create_dir_all(out_dir.join(IMAGES_DIR))?;
    fs::create_dir_all(out_dir.join(LABELS_DIR))?;

    jobs.par_iter().try_for_each(|(tile, slot)| {
        write_tile(raster, plans[*slot].label.source(), tile, out_dir)
    })?;

    let manifest = Manifest {
        window_size: params.window_size,
        stride: params.effective_stride(),
        bands,
        tiles: jobs.into_iter().map(|(t, _)| t).collect(),
        skipped_rois,
    };
    manifest.write_json(out_dir.join(MANIFEST_FILE))?;
    info!(
        "exported {} tiles from {} roi(s) to {} ({} skipped)",
        manifest.tiles.len(),
        plans.len(),
        out_dir.display(),
        manifest.skipped_rois.len()
    );
    Ok(manifest)
}
