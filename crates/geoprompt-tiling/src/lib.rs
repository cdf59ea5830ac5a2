//! Dataset generation from saved regions of interest.
//!
//! - [`RoiStore`]: append-only ROI persistence ([`MemoryRoiStore`],
//!   [`JsonlRoiStore`]) with whole-store load and backup.
//! - [`plan_tiles`]: deterministic, grid-aligned raster/label windows for one
//!   ROI.
//! - [`export_dataset`]: reads every planned window in parallel and writes
//!   `images/NNNN.npy`, `labels/NNNN.npy` and `manifest.json`.

mod error;
mod export;
pub mod npy;
mod plan;
mod roi;

pub use error::TilingError;
pub use export::{
    export_dataset, tile_file_name, LabelSource, Manifest, IMAGES_DIR, LABELS_DIR, MANIFEST_FILE,
};
pub use plan::{plan_tiles, Tile, TileWindows, TilingParams};
pub use roi::{read_roi_file, write_roi_file, JsonlRoiStore, MemoryRoiStore, RoiRecord, RoiStore};
