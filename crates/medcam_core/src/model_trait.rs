//! The classifier capability the heatmap engine explains.
//!
//! A model exposes forward evaluation on an autodiff backend and reports each
//! named intermediate stage to a [`LayerObserver`]. Capture hooks attach to
//! those observation points; the backward pass comes for free from the
//! backend.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::labels::ClassLabels;

/// Observation point called by a model for every named stage output.
///
/// The returned tensor replaces the stage output for the remainder of the
/// forward pass, so an observer can add a gradient tap to it. Observers must
/// keep the value and the upstream graph intact.
pub trait LayerObserver<B: AutodiffBackend> {
    /// Observe the output of `layer`.
    fn observe(&self, layer: &str, output: Tensor<B, 4>) -> Tensor<B, 4>;
}

/// Observer that leaves every stage untouched. Used for plain inference.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughObserver;

impl<B: AutodiffBackend> LayerObserver<B> for PassthroughObserver {
    fn observe(&self, _layer: &str, output: Tensor<B, 4>) -> Tensor<B, 4> {
        output
    }
}

/// Trait for image classifiers that can be explained with Grad-CAM.
///
/// Implementations must be deterministic for fixed weights and must not
/// mutate themselves during evaluation.
pub trait CamModel<B: AutodiffBackend>: Send {
    /// Forward pass returning class scores (logits).
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor of shape (1, 3, height, width)
    /// * `observer` - Called with the output of every stage in [`Self::layer_names`]
    ///
    /// # Returns
    ///
    /// Scores tensor of shape (1, n_classes)
    fn forward_observed(&self, x: Tensor<B, 4>, observer: &dyn LayerObserver<B>) -> Tensor<B, 2>;

    /// Observable stages in evaluation order.
    fn layer_names(&self) -> Vec<String>;

    /// Stage explained when no override is given: the last convolutional stage.
    fn default_target_layer(&self) -> Option<String> {
        self.layer_names().pop()
    }

    /// Class names in output order.
    fn labels(&self) -> &ClassLabels;

    /// Expected `(height, width)` of the input tensor.
    fn input_size(&self) -> (usize, usize);

    /// Number of output classes.
    fn n_classes(&self) -> usize {
        self.labels().len()
    }

    /// Forward pass returning probabilities.
    fn forward_probs(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let logits = self.forward_observed(x, &PassthroughObserver);
        burn::tensor::activation::softmax(logits, 1)
    }
}
