//! A model instance shared between heatmap requests.

use std::sync::Arc;

use burn::tensor::backend::AutodiffBackend;
use medcam_core::{CamModel, ClassLabels};
use parking_lot::{Mutex, MutexGuard};

use crate::capture::LayerHooks;

/// A model behind its pass lock, together with its capture hooks.
///
/// Forward and backward passes mutate the capture state, so at most one
/// forward/backward pair may run on an instance at a time. Holding the guard
/// returned by [`SharedModel::lock`] is that critical section. Separate
/// instances can run in parallel.
pub struct SharedModel<B: AutodiffBackend, M: CamModel<B>> {
    model: Mutex<M>,
    hooks: Arc<LayerHooks<B>>,
    layer_names: Vec<String>,
    default_layer: Option<String>,
    labels: ClassLabels,
    input_size: (usize, usize),
}

impl<B: AutodiffBackend, M: CamModel<B>> SharedModel<B, M> {
    /// Wrap a model.
    pub fn new(model: M) -> Self {
        let layer_names = model.layer_names();
        let default_layer = model.default_target_layer();
        let labels = model.labels().clone();
        let input_size = model.input_size();

        Self {
            model: Mutex::new(model),
            hooks: Arc::new(LayerHooks::new()),
            layer_names,
            default_layer,
            labels,
            input_size,
        }
    }

    /// Acquire the pass lock.
    pub fn lock(&self) -> MutexGuard<'_, M> {
        self.model.lock()
    }

    /// Capture hooks of this instance; pass them as the forward observer.
    pub fn hooks(&self) -> &Arc<LayerHooks<B>> {
        &self.hooks
    }

    /// Observable layers of the wrapped model.
    pub fn layer_names(&self) -> &[String] {
        &self.layer_names
    }

    /// Layer explained when no override is configured.
    pub fn default_target_layer(&self) -> Option<&str> {
        self.default_layer.as_deref()
    }

    /// Class names of the wrapped model.
    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    /// Expected `(height, width)` of model inputs.
    pub fn input_size(&self) -> (usize, usize) {
        self.input_size
    }

    /// Unwrap the model.
    pub fn into_inner(self) -> M {
        self.model.into_inner()
    }
}

impl<B: AutodiffBackend, M: CamModel<B>> std::fmt::Debug for SharedModel<B, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedModel")
            .field("layers", &self.layer_names)
            .field("labels", &self.labels)
            .field("input_size", &self.input_size)
            .field("hooks", &self.hooks)
            .finish()
    }
}
