//! # medcam_pipeline
//!
//! Turns a diagnosis (one image plus predicted labels) into heatmap files
//! and persisted records:
//!
//! - [`OrchestratorConfig`] - threshold, output directory, rendering options
//! - [`HeatmapOrchestrator`] - per-label capture, Grad-CAM, render, write, record
//! - [`naming`] - `heatmap_{diagnosis_id}_{label}.{ext}` file names
//! - [`HeatmapSink`] - persistence collaborator, with [`MemorySink`] and [`JsonlSink`]

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod naming;
pub mod orchestrator;
pub mod persistence;

pub use config::OrchestratorConfig;
pub use naming::{heatmap_file_name, normalize_label, OutputNamer};
pub use orchestrator::{
    predict, qualifying, top_prediction, HeatmapArtifact, HeatmapOrchestrator, HeatmapReport,
    LabelOutcome, Prediction, ReportStatus,
};
pub use persistence::{HeatmapRecord, HeatmapSink, JsonlSink, MemorySink, NewHeatmap};
