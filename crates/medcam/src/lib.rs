//! # medcam
//!
//! Grad-CAM heatmaps for medical image classifiers in Rust.
//!
//! Given a trained classifier and a chosen output class, medcam computes a
//! spatial importance map showing which image regions drove that class's
//! score, and renders it as a color overlay on the original image:
//!
//! - **Capture**: record a layer's activation and gradient during a forward/backward pass
//! - **Grad-CAM**: weight the activation channels by their mean gradient
//! - **Rendering**: resize, colorize and alpha-blend onto the source image
//! - **Orchestration**: per-label thresholding, naming, writing and persistence
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use medcam::prelude::*;
//! use medcam::core::backend::CpuAutodiff;
//!
//! let device = Default::default();
//! let model = load_cam_model::<CpuAutodiff>("checkpoints/camnet", &device)?;
//! let model = Arc::new(SharedModel::new(model));
//!
//! let orchestrator = HeatmapOrchestrator::new(
//!     model,
//!     OrchestratorConfig::default(),
//!     MemorySink::new(),
//!     device,
//! )?;
//!
//! let predictions = orchestrator.predict(Path::new("scan.png"))?;
//! let report = orchestrator.run(42, Path::new("scan.png"), &predictions);
//! for (label, artifact) in report.succeeded() {
//!     println!("{label}: {:?}", artifact.file_path());
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export all crates
pub use medcam_core as core;
pub use medcam_explain as explain;
pub use medcam_models as models;
pub use medcam_pipeline as pipeline;
pub use medcam_render as render;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use medcam::prelude::*;
/// ```
pub mod prelude {
    pub use std::path::Path;
    pub use std::sync::Arc;

    // Core types
    pub use medcam_core::{
        CamError, CamModel, ClassLabels, ClassTarget, FeatureShape, ImportanceMap, Result, Seed,
    };

    // Capture and Grad-CAM
    pub use medcam_explain::{attach, detach, CamOutput, CaptureHandle, GradCam, SharedModel};

    // Rendering
    pub use medcam_render::{
        BlendWeights, ChannelOrder, ColorMap, FsImageSource, ImageSource, OutputFormat,
        Preprocessor, Renderer,
    };

    // Models
    pub use medcam_models::{load_cam_model, CamNet, CamNetConfig, CamNetModel, ModelRegistry};

    // Pipeline
    pub use medcam_pipeline::{
        qualifying, HeatmapOrchestrator, HeatmapReport, HeatmapSink, JsonlSink, MemorySink,
        OrchestratorConfig, Prediction,
    };
}

/// All module for importing everything.
pub mod all {
    pub use super::prelude::*;

    // Additional exports
    pub use medcam_core::backend;
    pub use medcam_explain::{grad_cam, CamSummary, CapturedPair, LayerHooks};
    pub use medcam_models::{save_checkpoint, CheckpointMetadata, ModelCheckpoint};
    pub use medcam_pipeline::{
        heatmap_file_name, normalize_label, HeatmapRecord, LabelOutcome, NewHeatmap, ReportStatus,
    };
    pub use medcam_render::{Normalization, Overlay};
}
