//! # medcam_models
//!
//! Reference classifiers for medcam.
//!
//! - [`CamNet`] - plain convolutional classifier with named stages
//! - [`CamNetModel`] - CamNet wrapped as an explainable [`medcam_core::CamModel`]
//! - [`checkpoint`] - save/load with Burn's record system
//! - [`ModelRegistry`] - shared instances keyed by checkpoint path

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod cnn;
pub mod registry;

pub use checkpoint::{
    load_cam_model, load_checkpoint, save_checkpoint, CheckpointMetadata, ModelCheckpoint,
    METADATA_FILE, WEIGHTS_FILE,
};
pub use cnn::*;
pub use registry::{ModelRegistry, SharedCamNet};
