//! Seams to the segmentation model.
//!
//! The model is a black box: it embeds an RGB image once and then answers
//! point or box prompts against that embedding with a binary mask at the
//! image resolution.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use geoprompt_core::{Crs, Mask, RgbImage};
use serde::{Deserialize, Serialize};

/// Failure reported by a model or a model loader.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ModelError(pub String);

impl ModelError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Opaque per-image state produced by [`SegmentationModel::embed`].
#[derive(Clone)]
pub struct Embedding(Arc<dyn Any + Send + Sync>);

impl Embedding {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the model-specific payload.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for Embedding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Embedding(..)")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PointLabel {
    Background = 0,
    Foreground = 1,
}

/// Point prompt in a world CRS.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromptPoint {
    pub x: f64,
    pub y: f64,
    pub crs: Crs,
    pub label: PointLabel,
}

impl PromptPoint {
    pub fn foreground(x: f64, y: f64, crs: Crs) -> Self {
        Self {
            x,
            y,
            crs,
            label: PointLabel::Foreground,
        }
    }

    pub fn background(x: f64, y: f64, crs: Crs) -> Self {
        Self {
            x,
            y,
            crs,
            label: PointLabel::Background,
        }
    }
}

/// Point prompt in model-input pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelPrompt {
    pub x: f64,
    pub y: f64,
    pub label: PointLabel,
}

pub trait SegmentationModel: Send + Sync {
    fn embed(&self, image: &RgbImage) -> Result<Embedding, ModelError>;

    /// Mask for a set of labelled points; `Ok(None)` when there is nothing to
    /// segment (including an empty point list).
    fn prompt_points(
        &self,
        embedding: &Embedding,
        points: &[PixelPrompt],
    ) -> Result<Option<Mask>, ModelError>;

    /// Mask for a `[x_min, y_min, x_max, y_max]` pixel box.
    fn prompt_box(&self, embedding: &Embedding, bbox: [f64; 4])
        -> Result<Option<Mask>, ModelError>;
}

fn default_checkpoint() -> String {
    "facebook/sam-vit-base".to_string()
}

fn default_device() -> String {
    "cpu".to_string()
}

/// Which model to load and where to run it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    #[serde(default = "default_checkpoint")]
    pub checkpoint: String,
    #[serde(default = "default_device")]
    pub device: String,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            checkpoint: default_checkpoint(),
            device: default_device(),
        }
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.checkpoint, self.device)
    }
}

pub trait ModelLoader: Send + Sync {
    fn load(&self, spec: &ModelSpec) -> Result<Arc<dyn SegmentationModel>, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_spec_defaults_fill_missing_fields() {
        let spec: ModelSpec = serde_json::from_str(r#"{"device": "cuda"}"#).unwrap();
        assert_eq!(spec.checkpoint, "facebook/sam-vit-base");
        assert_eq!(spec.device, "cuda");
        assert_eq!(ModelSpec::default().to_string(), "facebook/sam-vit-base on cpu");
    }

    #[test]
    fn embedding_downcasts_to_payload() {
        let e = Embedding::new(vec![1u8, 2, 3]);
        assert_eq!(e.downcast_ref::<Vec<u8>>(), Some(&vec![1, 2, 3]));
        assert!(e.downcast_ref::<String>().is_none());
    }

    #[test]
    fn point_label_serializes_by_name() {
        let p = PromptPoint::background(1.0, 2.0, Crs::epsg(3857));
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"background\""));
        assert_eq!(PointLabel::Foreground as u8, 1);
    }
}
