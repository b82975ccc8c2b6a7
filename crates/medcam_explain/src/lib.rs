//! # medcam_explain
//!
//! Grad-CAM for image classifiers: activation/gradient capture and
//! importance map computation.
//!
//! This crate provides:
//! - [`SharedModel`], a model instance behind its pass lock with capture hooks
//! - [`attach`] / [`detach`] and [`CaptureHandle`] for layer observation
//! - [`GradCam`], the engine producing normalized [`medcam_core::ImportanceMap`]s
//! - [`grad_cam`], the pure activation × gradient computation
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use medcam_core::ClassTarget;
//! use medcam_explain::{GradCam, SharedModel};
//!
//! let model = Arc::new(SharedModel::new(classifier));
//! let cam = GradCam::new(model, None)?; // last convolutional stage
//! let out = cam.compute(input, &ClassTarget::Label("Pneumonia".into()))?;
//! assert_eq!(out.map.max(), 1.0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod capture;
mod gradcam;
mod shared;

#[cfg(test)]
mod test_utils;

pub use capture::{attach, detach, CaptureHandle, CapturedPair, LayerHooks};
pub use gradcam::{channel_weights, grad_cam, CamOutput, CamSummary, GradCam};
pub use shared::SharedModel;
