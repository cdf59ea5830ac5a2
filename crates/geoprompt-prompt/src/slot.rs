//! Hot-swappable model holder.

use std::fmt;
use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;

use crate::{ModelLoader, ModelSpec, PromptError, SegmentationModel};

/// A loaded model together with the spec it came from.
///
/// `generation` increases by one on every successful load, so a prompt can
/// tell whether the model it started with is still the current one.
pub struct ModelHandle {
    pub model: Arc<dyn SegmentationModel>,
    pub spec: ModelSpec,
    pub generation: u64,
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("spec", &self.spec)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

enum SlotState {
    Unloaded,
    Loading,
    Ready(Arc<ModelHandle>),
    SwitchPending { current: Arc<ModelHandle> },
}

/// Coarse view of the slot for status displays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotStatus {
    Unloaded,
    Loading,
    Ready,
    SwitchPending,
}

struct Inner {
    state: SlotState,
    generation: u64,
}

/// Restores the pre-load state if the loader unwinds.
struct LoadGuard<'a> {
    inner: &'a Mutex<Inner>,
    armed: bool,
}

impl LoadGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.inner.lock();
        inner.state = match std::mem::replace(&mut inner.state, SlotState::Unloaded) {
            SlotState::SwitchPending { current } => SlotState::Ready(current),
            _ => SlotState::Unloaded,
        };
        warn!("model loader panicked, slot restored");
    }
}

/// Holds the active segmentation model.
///
/// Readers take an `Arc<ModelHandle>` snapshot and keep it for the duration
/// of one prompt. Loads run outside the lock; while one is in flight the old
/// model keeps serving and a second load is refused.
pub struct ModelSlot {
    inner: Mutex<Inner>,
}

impl Default for ModelSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelSlot {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SlotState::Unloaded,
                generation: 0,
            }),
        }
    }

    /// Slot that is already `Ready` with `model`.
    pub fn with_model(model: Arc<dyn SegmentationModel>, spec: ModelSpec) -> Self {
        let handle = Arc::new(ModelHandle {
            model,
            spec,
            generation: 1,
        });
        Self {
            inner: Mutex::new(Inner {
                state: SlotState::Ready(handle),
                generation: 1,
            }),
        }
    }

    pub fn status(&self) -> SlotStatus {
        match self.inner.lock().state {
            SlotState::Unloaded => SlotStatus::Unloaded,
            SlotState::Loading => SlotStatus::Loading,
            SlotState::Ready(_) => SlotStatus::Ready,
            SlotState::SwitchPending { .. } => SlotStatus::SwitchPending,
        }
    }

    /// Generation of the last committed load (`0` before any).
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Current model, also while a switch is pending.
    pub fn snapshot(&self) -> Result<Arc<ModelHandle>, PromptError> {
        match &self.inner.lock().state {
            SlotState::Ready(h) | SlotState::SwitchPending { current: h } => Ok(h.clone()),
            SlotState::Unloaded | SlotState::Loading => Err(PromptError::ModelUnavailable),
        }
    }

    /// Load `spec` with `loader` and make it the current model.
    ///
    /// On failure the slot returns to its previous state: the old model stays
    /// active, or the slot stays unloaded.
    pub fn load(
        &self,
        spec: ModelSpec,
        loader: &dyn ModelLoader,
    ) -> Result<Arc<ModelHandle>, PromptError> {
        {
            let mut inner = self.inner.lock();
            let next = match std::mem::replace(&mut inner.state, SlotState::Unloaded) {
                SlotState::Unloaded => SlotState::Loading,
                SlotState::Ready(current) => SlotState::SwitchPending { current },
                busy @ (SlotState::Loading | SlotState::SwitchPending { .. }) => {
                    inner.state = busy;
                    return Err(PromptError::SwitchInProgress);
                }
            };
            inner.state = next;
        }

        let guard = LoadGuard {
            inner: &self.inner,
            armed: true,
        };
        info!("loading segmentation model {spec}");
        let loaded = loader.load(&spec);
        guard.disarm();

        let mut inner = self.inner.lock();
        let previous = match std::mem::replace(&mut inner.state, SlotState::Unloaded) {
            SlotState::SwitchPending { current } => Some(current),
            _ => None,
        };
        match loaded {
            Ok(model) => {
                inner.generation += 1;
                let handle = Arc::new(ModelHandle {
                    model,
                    spec,
                    generation: inner.generation,
                });
                inner.state = SlotState::Ready(handle.clone());
                info!("model ready (generation {})", handle.generation);
                Ok(handle)
            }
            Err(e) => {
                warn!("loading {spec} failed, keeping previous model: {e}");
                inner.state = match previous {
                    Some(current) => SlotState::Ready(current),
                    None => SlotState::Unloaded,
                };
                Err(e.into())
            }
        }
    }

    /// Change checkpoint and/or device of the current model.
    pub fn switch(
        &self,
        checkpoint: impl Into<String>,
        device: impl Into<String>,
        loader: &dyn ModelLoader,
    ) -> Result<Arc<ModelHandle>, PromptError> {
        self.load(
            ModelSpec {
                checkpoint: checkpoint.into(),
                device: device.into(),
            },
            loader,
        )
    }
}
