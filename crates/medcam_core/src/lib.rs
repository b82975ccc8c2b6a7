//! # medcam_core
//!
//! Core types and traits for the medcam heatmap engine.
//!
//! This crate provides:
//! - [`CamError`] and the [`Result`] alias shared by every medcam crate
//! - [`FeatureShape`] for `(B, C, H, W)` feature map metadata
//! - [`ImportanceMap`] with bilinear resizing and `[0, 1]` normalization
//! - [`ClassLabels`] and [`ClassTarget`] for resolving the explained class
//! - [`CamModel`] and [`LayerObserver`], the capability a classifier exposes
//!   so that its intermediate stages can be observed
//! - [`Seed`] for deterministic initialization
//!
//! ## Shape Convention
//!
//! Image tensors follow the convention `(B, C, H, W)`:
//! - `B`: Batch size (always 1 for heatmap generation)
//! - `C`: Channels
//! - `H`, `W`: Spatial height and width
//!
//! ## Example
//!
//! ```rust
//! use medcam_core::{FeatureShape, ImportanceMap};
//! use ndarray::array;
//!
//! let shape = FeatureShape::new(1, 64, 7, 7);
//! assert_eq!(shape.spatial(), (7, 7));
//!
//! let map = ImportanceMap::from_array(array![[0.0, 2.0], [4.0, 8.0]]).normalize();
//! assert_eq!(map.max(), 1.0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod labels;
mod map;
mod model_trait;
mod seed;
mod shape;

pub use error::{CamError, Result};
pub use labels::{ClassLabels, ClassTarget};
pub use map::{bilinear_resize, ImportanceMap, NORMALIZE_EPSILON};
pub use model_trait::{CamModel, LayerObserver, PassthroughObserver};
pub use seed::Seed;
pub use shape::FeatureShape;

/// Fixed method name recorded alongside every heatmap produced by this engine.
pub const GRAD_CAM_METHOD: &str = "grad-cam";

/// Backend type aliases for convenience
pub mod backend {
    #[cfg(feature = "backend-ndarray")]
    pub use burn_autodiff::Autodiff;

    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;

    /// CPU backend with reverse-mode autodiff, the default for heatmap generation.
    #[cfg(feature = "backend-ndarray")]
    pub type CpuAutodiff = Autodiff<NdArray>;
}
