//! Gradient-weighted Class Activation Mapping.

use std::sync::Arc;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use medcam_core::{CamError, CamModel, ClassTarget, FeatureShape, ImportanceMap, Result};
use serde::{Deserialize, Serialize};

use crate::capture::{attach, CaptureHandle, CapturedPair};
use crate::shared::SharedModel;

/// Result of one Grad-CAM computation.
#[derive(Debug, Clone)]
pub struct CamOutput {
    /// Explained output index.
    pub class_index: usize,
    /// Name of the explained class, when the model names it.
    pub class_label: Option<String>,
    /// Raw score (logit) of the explained class.
    pub score: f32,
    /// Layer the map was computed on.
    pub layer: String,
    /// Clipped, unnormalized map at the layer's resolution.
    pub raw: ImportanceMap,
    /// Map resized to the input resolution and normalized to `[0, 1]`.
    pub map: ImportanceMap,
}

/// Summary of a computation, suitable for logs and JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CamSummary {
    /// Explained output index.
    pub class_index: usize,
    /// Name of the explained class.
    pub class_label: Option<String>,
    /// Raw class score.
    pub score: f32,
    /// Layer the map was computed on.
    pub layer: String,
    /// `(height, width)` of the layer feature map.
    pub layer_size: (usize, usize),
}

impl CamOutput {
    /// Summarize without the map data.
    pub fn summary(&self) -> CamSummary {
        CamSummary {
            class_index: self.class_index,
            class_label: self.class_label.clone(),
            score: self.score,
            layer: self.layer.clone(),
            layer_size: self.raw.dims(),
        }
    }
}

/// Compute the clipped Grad-CAM map from one layer's activation and gradient.
///
/// # Arguments
///
/// * `activations` - Layer output (1, channels, height, width)
/// * `gradients` - Gradients w.r.t. that output (1, channels, height, width)
///
/// # Returns
///
/// Map of shape (height, width) with negative contributions removed.
///
/// # Errors
///
/// [`CamError::ShapeMismatch`] unless both tensors are the same single-sample shape.
pub fn grad_cam<B: Backend>(
    activations: Tensor<B, 4>,
    gradients: Tensor<B, 4>,
) -> Result<ImportanceMap> {
    let shape = FeatureShape::from(activations.dims());
    shape.ensure_single("activation")?;
    let grad_shape = FeatureShape::from(gradients.dims());
    if grad_shape != shape {
        return Err(CamError::ShapeMismatch(format!(
            "gradient {grad_shape} does not match activation {shape}"
        )));
    }

    // Global average pool the gradients: (1, C, H, W) -> (1, C, 1, 1)
    let weights = gradients.mean_dim(3).mean_dim(2);

    // Weighted sum over channels: (1, C, H, W) -> (1, 1, H, W)
    let cam = (activations * weights).sum_dim(1);

    // ReLU
    let cam = cam.clamp_min(0.0);

    let (height, width) = shape.spatial();
    ImportanceMap::from_vec(height, width, tensor_values(cam)?)
}

/// Per-channel Grad-CAM weights: the spatial mean of each gradient channel.
///
/// # Errors
///
/// [`CamError::Tensor`] if the data cannot be read back.
pub fn channel_weights<B: Backend>(gradients: Tensor<B, 4>) -> Result<Vec<f32>> {
    tensor_values(gradients.mean_dim(3).mean_dim(2))
}

/// Read a tensor back as `f32` values in row-major order.
pub(crate) fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| CamError::Tensor(format!("Failed to get tensor data: {e:?}")))
}

/// Grad-CAM engine bound to one layer of one shared model instance.
///
/// Creating the engine attaches a capture to the target layer; dropping it
/// detaches. Each [`GradCam::compute`] holds the model's pass lock for the
/// forward pass, the seeded backward pass and the capture read, then does
/// the map arithmetic after releasing it.
#[derive(Debug)]
pub struct GradCam<B: AutodiffBackend, M: CamModel<B>> {
    model: Arc<SharedModel<B, M>>,
    capture: CaptureHandle<B>,
}

impl<B: AutodiffBackend, M: CamModel<B>> GradCam<B, M> {
    /// Attach to `target_layer`, or to the model's default (last convolutional) layer.
    ///
    /// # Errors
    ///
    /// [`CamError::UnknownLayer`] or [`CamError::AlreadyAttached`].
    pub fn new(model: Arc<SharedModel<B, M>>, target_layer: Option<&str>) -> Result<Self> {
        let layer = match target_layer {
            Some(layer) => layer.to_string(),
            None => model
                .default_target_layer()
                .map(str::to_string)
                .ok_or_else(|| CamError::UnknownLayer {
                    layer: "<default>".to_string(),
                    available: model.layer_names().join(", "),
                })?,
        };

        let capture = attach(&model, &layer)?;
        tracing::info!("Grad-CAM attached to layer '{}'", layer);

        Ok(Self { model, capture })
    }

    /// Explained layer.
    pub fn layer(&self) -> &str {
        self.capture.layer()
    }

    /// Shared model this engine explains.
    pub fn model(&self) -> &Arc<SharedModel<B, M>> {
        &self.model
    }

    /// Compute the importance map of `target` for one preprocessed input.
    ///
    /// # Arguments
    ///
    /// * `input` - Preprocessed image (1, 3, height, width)
    /// * `target` - Class to explain
    ///
    /// # Errors
    ///
    /// - [`CamError::InvalidClassIndex`] for an out-of-range index or unknown label
    /// - [`CamError::CaptureIncomplete`] when the layer produced no activation or gradient
    /// - [`CamError::ShapeMismatch`] for non-4-D or batched tensors
    pub fn compute(&self, input: Tensor<B, 4>, target: &ClassTarget) -> Result<CamOutput> {
        let input_shape = FeatureShape::from(input.dims());
        input_shape.ensure_single("input")?;

        let (pair, class_index, score) = self.capture_pass(input, target)?;

        let raw = grad_cam(pair.activation, pair.gradient)?;
        let (height, width) = input_shape.spatial();
        let map = raw.resize(height, width).normalize();

        tracing::debug!(
            "Grad-CAM on '{}' for class {}: layer map {:?} -> {:?}",
            self.layer(),
            class_index,
            raw.dims(),
            map.dims()
        );

        Ok(CamOutput {
            class_index,
            class_label: self.model.labels().name(class_index).map(str::to_string),
            score,
            layer: self.layer().to_string(),
            raw,
            map,
        })
    }

    /// Forward, seeded backward and capture read under the pass lock.
    ///
    /// On failure the capture slot is cleared before the lock is released, so
    /// a half-finished pass never leaks into the next one.
    fn capture_pass(
        &self,
        input: Tensor<B, 4>,
        target: &ClassTarget,
    ) -> Result<(CapturedPair<B::InnerBackend>, usize, f32)> {
        let model = self.model.lock();
        self.locked_pass(&model, input, target).inspect_err(|_| {
            self.capture.reset();
        })
    }

    fn locked_pass(
        &self,
        model: &M,
        input: Tensor<B, 4>,
        target: &ClassTarget,
    ) -> Result<(CapturedPair<B::InnerBackend>, usize, f32)> {
        let scores = model.forward_observed(input, self.model.hooks().as_ref());
        let [batch, n_classes] = scores.dims();
        if batch != 1 {
            return Err(CamError::ShapeMismatch(format!(
                "expected scores of shape (1, K), got ({batch}, {n_classes})"
            )));
        }

        let values = tensor_values(scores.clone().inner())?;
        let class_index = target.resolve(model.labels(), &values)?;

        let seed = one_hot::<B>(class_index, n_classes, &scores.device());
        let grads = (scores * seed).sum().backward();
        self.model.hooks().observe_backward(&grads);

        let pair = self.capture.take_pair()?;
        Ok((pair, class_index, values[class_index]))
    }
}

/// One-hot seed of shape (1, n_classes).
fn one_hot<B: Backend>(index: usize, n_classes: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut values = vec![0.0f32; n_classes];
    values[index] = 1.0;
    Tensor::<B, 1>::from_floats(values.as_slice(), device).reshape([1, n_classes])
}
