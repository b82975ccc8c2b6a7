//! Activation and gradient capture.
//!
//! A [`LayerHooks`] registry lives next to each shared model instance and acts
//! as the model's [`LayerObserver`]. Attaching a [`CaptureHandle`] to a layer
//! registers a slot; during the forward pass the slot records the layer output
//! and adds a zero-valued gradient leaf (the tap) to it, and after the caller's
//! backward pass the registry hands the gradients container to every slot so it
//! can record the gradient of the tap. The tap is added, not substituted, so
//! the graph upstream of the layer keeps receiving gradients and captures on
//! earlier layers of the same model still work.
//!
//! Every forward observation bumps the slot's pass generation. A gradient is
//! stored together with the generation of the activation it was taken from,
//! and [`CaptureHandle::take_pair`] refuses pairs from different passes.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use medcam_core::{CamError, CamModel, FeatureShape, LayerObserver, Result};
use parking_lot::Mutex;

use crate::shared::SharedModel;

/// Captured state for one attached layer.
struct CaptureSlot<B: AutodiffBackend> {
    generation: u64,
    activation: Option<Tensor<B::InnerBackend, 4>>,
    tap: Option<Tensor<B, 4>>,
    gradient: Option<(u64, Tensor<B::InnerBackend, 4>)>,
}

impl<B: AutodiffBackend> CaptureSlot<B> {
    fn new() -> Self {
        Self {
            generation: 0,
            activation: None,
            tap: None,
            gradient: None,
        }
    }

    fn record_forward(&mut self, activation: Tensor<B::InnerBackend, 4>, tap: Tensor<B, 4>) {
        self.generation += 1;
        self.activation = Some(activation);
        self.tap = Some(tap);
        self.gradient = None;
    }

    fn record_backward(&mut self, grads: &B::Gradients) {
        let Some(tap) = &self.tap else {
            return;
        };
        if let Some(gradient) = tap.grad(grads) {
            self.gradient = Some((self.generation, gradient));
        }
    }

    fn clear(&mut self) {
        self.activation = None;
        self.tap = None;
        self.gradient = None;
    }
}

type SharedSlot<B> = Arc<Mutex<CaptureSlot<B>>>;

/// Registry of capture slots for one model instance.
pub struct LayerHooks<B: AutodiffBackend> {
    slots: Mutex<HashMap<String, SharedSlot<B>>>,
}

impl<B: AutodiffBackend> LayerHooks<B> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a capture is attached to `layer`.
    pub fn is_attached(&self, layer: &str) -> bool {
        self.slots.lock().contains_key(layer)
    }

    /// Names of all attached layers, sorted.
    pub fn attached_layers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Backward observation: give every attached slot the chance to record
    /// the gradient of its current activation.
    ///
    /// Slots without a forward observation record nothing.
    pub fn observe_backward(&self, grads: &B::Gradients) {
        let slots: Vec<SharedSlot<B>> = self.slots.lock().values().cloned().collect();
        for slot in slots {
            slot.lock().record_backward(grads);
        }
    }

    fn register(&self, layer: &str) -> Result<SharedSlot<B>> {
        let mut slots = self.slots.lock();
        if slots.contains_key(layer) {
            return Err(CamError::AlreadyAttached {
                layer: layer.to_string(),
            });
        }
        let slot = Arc::new(Mutex::new(CaptureSlot::new()));
        slots.insert(layer.to_string(), Arc::clone(&slot));
        Ok(slot)
    }

    fn unregister(&self, layer: &str, slot: &SharedSlot<B>) {
        let mut slots = self.slots.lock();
        if slots.get(layer).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            slots.remove(layer);
        }
    }
}

impl<B: AutodiffBackend> Default for LayerHooks<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: AutodiffBackend> fmt::Debug for LayerHooks<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerHooks")
            .field("attached", &self.attached_layers())
            .finish()
    }
}

impl<B: AutodiffBackend> LayerObserver<B> for LayerHooks<B> {
    fn observe(&self, layer: &str, output: Tensor<B, 4>) -> Tensor<B, 4> {
        let slot = self.slots.lock().get(layer).cloned();
        match slot {
            Some(slot) => {
                // d(score)/d(tap) == d(score)/d(output).
                let tap = output.zeros_like().require_grad();
                slot.lock().record_forward(output.clone().inner(), tap.clone());
                output + tap
            }
            None => output,
        }
    }
}

/// Activation and gradient of one layer taken from a single forward/backward pass pair.
#[derive(Debug, Clone)]
pub struct CapturedPair<B: Backend> {
    /// Layer output, shape (1, C, H, W).
    pub activation: Tensor<B, 4>,
    /// Gradient of the seeded score with respect to the layer output.
    pub gradient: Tensor<B, 4>,
    /// Pass generation both tensors belong to.
    pub generation: u64,
}

impl<B: Backend> CapturedPair<B> {
    /// Shape shared by activation and gradient.
    pub fn shape(&self) -> FeatureShape {
        FeatureShape::from(self.activation.dims())
    }
}

/// Handle to a capture attached to one layer of one model instance.
///
/// Dropping the handle detaches it.
pub struct CaptureHandle<B: AutodiffBackend> {
    layer: String,
    slot: SharedSlot<B>,
    hooks: Arc<LayerHooks<B>>,
    attached: AtomicBool,
}

impl<B: AutodiffBackend> CaptureHandle<B> {
    /// Name of the observed layer.
    pub fn layer(&self) -> &str {
        &self.layer
    }

    /// Whether the handle is still attached.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Remove both observation points and drop any captured state.
    ///
    /// Calling this more than once is a no-op.
    pub fn detach(&self) {
        if self.attached.swap(false, Ordering::AcqRel) {
            self.hooks.unregister(&self.layer, &self.slot);
            self.slot.lock().clear();
            tracing::debug!("Detached capture from layer '{}'", self.layer);
        }
    }

    /// Discard captured state without detaching.
    pub fn reset(&self) {
        self.slot.lock().clear();
    }

    /// Take the activation/gradient pair recorded by the last pass pair.
    ///
    /// The pair is consumed: a second call without a new forward and
    /// backward pass fails.
    ///
    /// # Errors
    ///
    /// [`CamError::CaptureIncomplete`] when the handle is detached, no forward
    /// or backward observation happened, or the gradient belongs to another pass.
    pub fn take_pair(&self) -> Result<CapturedPair<B::InnerBackend>> {
        if !self.is_attached() {
            return Err(CamError::CaptureIncomplete(format!(
                "capture on '{}' is detached",
                self.layer
            )));
        }

        let mut slot = self.slot.lock();
        let generation = slot.generation;

        let gradient = match slot.gradient.take() {
            Some((g, gradient)) if g == generation => gradient,
            Some((g, _)) => {
                slot.clear();
                return Err(CamError::CaptureIncomplete(format!(
                    "gradient on '{}' is from pass {g}, activation from pass {generation}",
                    self.layer
                )));
            }
            None => {
                slot.clear();
                return Err(CamError::CaptureIncomplete(format!(
                    "no gradient recorded on '{}'",
                    self.layer
                )));
            }
        };

        let activation = slot.activation.take().ok_or_else(|| {
            CamError::CaptureIncomplete(format!("no activation recorded on '{}'", self.layer))
        })?;

        slot.tap = None;

        Ok(CapturedPair {
            activation,
            gradient,
            generation,
        })
    }
}

impl<B: AutodiffBackend> Drop for CaptureHandle<B> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<B: AutodiffBackend> fmt::Debug for CaptureHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("layer", &self.layer)
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Attach forward and backward observation to `layer` of `model`.
///
/// # Errors
///
/// - [`CamError::UnknownLayer`] if the model does not report `layer`
/// - [`CamError::AlreadyAttached`] if a capture is already attached to it
pub fn attach<B, M>(model: &SharedModel<B, M>, layer: &str) -> Result<CaptureHandle<B>>
where
    B: AutodiffBackend,
    M: CamModel<B>,
{
    if !model.layer_names().iter().any(|l| l == layer) {
        return Err(CamError::UnknownLayer {
            layer: layer.to_string(),
            available: model.layer_names().join(", "),
        });
    }

    let hooks = Arc::clone(model.hooks());
    let slot = hooks.register(layer)?;
    tracing::debug!("Attached capture to layer '{}'", layer);

    Ok(CaptureHandle {
        layer: layer.to_string(),
        slot,
        hooks,
        attached: AtomicBool::new(true),
    })
}

/// Detach a capture. Idempotent.
pub fn detach<B: AutodiffBackend>(handle: &CaptureHandle<B>) {
    handle.detach();
}
