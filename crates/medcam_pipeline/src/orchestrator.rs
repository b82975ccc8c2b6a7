//! Per-diagnosis heatmap orchestration.
//!
//! For one image and its predicted labels, the orchestrator picks the labels
//! whose confidence reaches the threshold and, for each of them, loads the
//! image, computes a Grad-CAM map, renders the overlay, writes it and records
//! it. Labels are independent: a failure is logged and reported for that
//! label only.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use medcam_core::{CamError, CamModel, ClassTarget, Result, GRAD_CAM_METHOD};
use medcam_explain::{GradCam, SharedModel};
use medcam_render::{FsImageSource, ImageSource, Preprocessor, Renderer};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::OrchestratorConfig;
use crate::naming::OutputNamer;
use crate::persistence::{HeatmapRecord, HeatmapSink, NewHeatmap};

/// A predicted label with its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Class label.
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}

impl Prediction {
    /// Create a prediction.
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Predictions with `confidence >= threshold`, in input order.
pub fn qualifying(predictions: &[Prediction], threshold: f32) -> Vec<&Prediction> {
    predictions
        .iter()
        .filter(|p| p.confidence >= threshold)
        .collect()
}

/// The most confident prediction; NaN confidences are ignored.
pub fn top_prediction(predictions: &[Prediction]) -> Option<&Prediction> {
    predictions
        .iter()
        .filter(|p| !p.confidence.is_nan())
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}

/// Softmax probability of every class for one preprocessed input.
///
/// Holds the model's pass lock for the forward pass.
pub fn predict<B, M>(model: &SharedModel<B, M>, input: Tensor<B, 4>) -> Result<Vec<Prediction>>
where
    B: AutodiffBackend,
    M: CamModel<B>,
{
    let probs = {
        let model = model.lock();
        model.forward_probs(input)
    };
    let values = probs
        .inner()
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| CamError::Tensor(format!("Failed to get tensor data: {e:?}")))?;

    Ok(model
        .labels()
        .names()
        .iter()
        .zip(values)
        .map(|(label, confidence)| Prediction::new(label.clone(), confidence))
        .collect())
}

/// A written and recorded heatmap.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapArtifact {
    /// Record returned by the sink.
    pub record: HeatmapRecord,
    /// Explained output index.
    pub class_index: usize,
    /// Raw score of the explained class.
    pub score: f32,
}

impl HeatmapArtifact {
    /// Written image file.
    pub fn file_path(&self) -> &Path {
        &self.record.file_path
    }
}

/// Result of one qualifying label.
#[derive(Debug)]
pub struct LabelOutcome {
    /// Label as given in the predictions.
    pub label: String,
    /// Its confidence.
    pub confidence: f32,
    /// Artifact on success, the error otherwise.
    pub result: std::result::Result<HeatmapArtifact, CamError>,
}

impl LabelOutcome {
    /// True when the heatmap was written and recorded.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Overall state of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    /// No label reached the threshold.
    NoQualifyingLabels,
    /// Every qualifying label failed.
    AllFailed,
    /// Some qualifying labels failed.
    Partial,
    /// Every qualifying label succeeded.
    Complete,
}

/// Per-label results of one [`HeatmapOrchestrator::run`], in input order.
#[derive(Debug)]
pub struct HeatmapReport {
    /// Diagnosis the run belongs to.
    pub diagnosis_id: u64,
    /// One entry per qualifying label.
    pub outcomes: Vec<LabelOutcome>,
}

impl HeatmapReport {
    /// Successful labels.
    pub fn succeeded(&self) -> impl Iterator<Item = (&str, &HeatmapArtifact)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|a| (o.label.as_str(), a)))
    }

    /// Failed labels.
    pub fn failed(&self) -> impl Iterator<Item = (&str, &CamError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.label.as_str(), e)))
    }

    /// Number of successful labels.
    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    /// Overall state.
    pub fn status(&self) -> ReportStatus {
        let ok = self.success_count();
        match (self.outcomes.len(), ok) {
            (0, _) => ReportStatus::NoQualifyingLabels,
            (_, 0) => ReportStatus::AllFailed,
            (n, ok) if ok < n => ReportStatus::Partial,
            _ => ReportStatus::Complete,
        }
    }

    /// True when no label reached the threshold.
    pub fn no_qualifying(&self) -> bool {
        self.status() == ReportStatus::NoQualifyingLabels
    }

    /// True when labels qualified but none succeeded.
    pub fn all_failed(&self) -> bool {
        self.status() == ReportStatus::AllFailed
    }
}

struct LabelJob<'a> {
    prediction: &'a Prediction,
    file_path: PathBuf,
}

/// Drives capture, computation, rendering and persistence for each qualifying label.
pub struct HeatmapOrchestrator<B, M, S, I = FsImageSource>
where
    B: AutodiffBackend,
    M: CamModel<B>,
    S: HeatmapSink,
    I: ImageSource,
{
    engine: GradCam<B, M>,
    renderer: Renderer,
    preprocessor: Preprocessor,
    config: OrchestratorConfig,
    sink: S,
    source: I,
    device: B::Device,
}

impl<B, M, S> HeatmapOrchestrator<B, M, S>
where
    B: AutodiffBackend,
    M: CamModel<B>,
    S: HeatmapSink,
{
    /// Create an orchestrator reading images from the filesystem.
    ///
    /// Attaches a capture to the configured target layer for the lifetime of
    /// the orchestrator.
    ///
    /// # Errors
    ///
    /// - [`CamError::InvalidConfig`] for an invalid configuration
    /// - [`CamError::UnknownLayer`] or [`CamError::AlreadyAttached`] from capture
    pub fn new(
        model: Arc<SharedModel<B, M>>,
        config: OrchestratorConfig,
        sink: S,
        device: B::Device,
    ) -> Result<Self> {
        Self::with_source(model, config, sink, FsImageSource, device)
    }
}

impl<B, M, S, I> HeatmapOrchestrator<B, M, S, I>
where
    B: AutodiffBackend,
    M: CamModel<B>,
    S: HeatmapSink,
    I: ImageSource,
{
    /// Create an orchestrator with a custom image source.
    ///
    /// # Errors
    ///
    /// See [`HeatmapOrchestrator::new`].
    pub fn with_source(
        model: Arc<SharedModel<B, M>>,
        config: OrchestratorConfig,
        sink: S,
        source: I,
        device: B::Device,
    ) -> Result<Self> {
        config.validate()?;
        let renderer = Renderer::new(config.colormap, config.blend)?;
        let preprocessor =
            Preprocessor::new(model.input_size()).with_normalization(config.normalization);
        let engine = GradCam::new(model, config.target_layer.as_deref())?;

        Ok(Self {
            engine,
            renderer,
            preprocessor,
            config,
            sink,
            source,
            device,
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Persistence collaborator.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Explained layer.
    pub fn target_layer(&self) -> &str {
        self.engine.layer()
    }

    /// Class probabilities for the image at `image_path`.
    pub fn predict(&self, image_path: &Path) -> Result<Vec<Prediction>> {
        let image = self.source.load(image_path)?;
        let input = self.preprocessor.to_tensor::<B>(&image, &self.device)?;
        predict(self.engine.model().as_ref(), input)
    }

    /// Generate heatmaps for every qualifying label of one diagnosis.
    ///
    /// Never fails as a whole: per-label errors are logged and returned in
    /// the report.
    pub fn run(
        &self,
        diagnosis_id: u64,
        image_path: &Path,
        predictions: &[Prediction],
    ) -> HeatmapReport {
        let selected = qualifying(predictions, self.config.conf_threshold);
        if selected.is_empty() {
            tracing::info!(
                "No label reached threshold {} for diagnosis {}",
                self.config.conf_threshold,
                diagnosis_id
            );
            return HeatmapReport {
                diagnosis_id,
                outcomes: Vec::new(),
            };
        }

        // Names are assigned up front so they do not depend on processing order.
        let mut namer = OutputNamer::new(diagnosis_id, self.config.output_format);
        let jobs: Vec<LabelJob<'_>> = selected
            .into_iter()
            .map(|prediction| LabelJob {
                prediction,
                file_path: self.config.output_dir.join(namer.assign(&prediction.label)),
            })
            .collect();

        tracing::info!(
            "Generating {} heatmap(s) for diagnosis {}",
            jobs.len(),
            diagnosis_id
        );

        let outcomes: Vec<LabelOutcome> = if self.config.parallel_labels {
            jobs.par_iter()
                .map(|job| self.run_label(diagnosis_id, image_path, job))
                .collect()
        } else {
            jobs.iter()
                .map(|job| self.run_label(diagnosis_id, image_path, job))
                .collect()
        };

        let report = HeatmapReport {
            diagnosis_id,
            outcomes,
        };
        tracing::info!(
            "Diagnosis {}: {}/{} heatmap(s) generated",
            diagnosis_id,
            report.success_count(),
            report.outcomes.len()
        );
        report
    }

    fn run_label(&self, diagnosis_id: u64, image_path: &Path, job: &LabelJob<'_>) -> LabelOutcome {
        let label = &job.prediction.label;
        let result = self.generate(diagnosis_id, image_path, job);

        match &result {
            Ok(artifact) => tracing::info!(
                "Heatmap for label '{}' on diagnosis {} written to {:?}",
                label,
                diagnosis_id,
                artifact.file_path()
            ),
            Err(e) => tracing::warn!(
                "Failed to generate heatmap for label '{}' on diagnosis {}: {}",
                label,
                diagnosis_id,
                e
            ),
        }

        LabelOutcome {
            label: label.clone(),
            confidence: job.prediction.confidence,
            result,
        }
    }

    fn generate(&self, diagnosis_id: u64, image_path: &Path, job: &LabelJob<'_>) -> Result<HeatmapArtifact> {
        let started = Instant::now();
        let label = &job.prediction.label;

        let image = self.source.load(image_path)?;
        let input = self.preprocessor.to_tensor::<B>(&image, &self.device)?;
        let cam = self
            .engine
            .compute(input, &ClassTarget::Label(label.clone()))?;
        self.check_deadline(started)?;

        let overlay = self.renderer.render(&cam.map, &image)?;
        self.check_deadline(started)?;

        std::fs::create_dir_all(&self.config.output_dir)?;
        overlay.save(&job.file_path, self.config.output_format)?;

        let record = self.sink.record(NewHeatmap {
            diagnosis_id,
            file_path: job.file_path.clone(),
            method: GRAD_CAM_METHOD.to_string(),
            label: label.clone(),
        })?;

        Ok(HeatmapArtifact {
            record,
            class_index: cam.class_index,
            score: cam.score,
        })
    }

    fn check_deadline(&self, started: Instant) -> Result<()> {
        match self.config.label_deadline_ms {
            Some(limit_ms) if started.elapsed().as_millis() > u128::from(limit_ms) => {
                Err(CamError::DeadlineExceeded {
                    elapsed_ms: started.elapsed().as_millis(),
                    limit_ms,
                })
            }
            _ => Ok(()),
        }
    }
}

impl<B, M, S, I> std::fmt::Debug for HeatmapOrchestrator<B, M, S, I>
where
    B: AutodiffBackend,
    M: CamModel<B>,
    S: HeatmapSink,
    I: ImageSource,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeatmapOrchestrator")
            .field("target_layer", &self.target_layer())
            .field("config", &self.config)
            .finish()
    }
}
