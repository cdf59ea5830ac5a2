//! Interactive prompting on georeferenced imagery.
//!
//! [`PromptBridge`] owns the active [`ImageContext`](geoprompt_raster::ImageContext)
//! session, converts world-space point and box prompts into model pixels,
//! runs the [`SegmentationModel`] held by a [`ModelSlot`], and vectorizes the
//! resulting mask into polygons in the requested CRS.

mod bridge;
mod error;
mod model;
mod slot;

pub use bridge::{PromptBridge, Session};
pub use error::PromptError;
pub use model::{
    Embedding, ModelError, ModelLoader, ModelSpec, PixelPrompt, PointLabel, PromptPoint,
    SegmentationModel,
};
pub use slot::{ModelHandle, ModelSlot, SlotStatus};
