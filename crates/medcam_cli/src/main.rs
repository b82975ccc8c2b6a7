//! medcam CLI for generating Grad-CAM heatmaps from image classifiers.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use medcam::core::{CamModel, Seed};
use medcam::explain::SharedModel;
use medcam::models::{load_cam_model, CamNetConfig, CamNetModel, ModelCheckpoint};
use medcam::pipeline::{
    predict, qualifying, HeatmapOrchestrator, JsonlSink, OrchestratorConfig, Prediction,
    ReportStatus,
};
use medcam::render::{ColorMap, FsImageSource, ImageSource, Preprocessor};

/// Backend type for inference with gradients.
type CliBackend = Autodiff<NdArray>;

type CliModel = Arc<SharedModel<CliBackend, CamNetModel<CliBackend>>>;

#[derive(Parser)]
#[command(name = "medcam")]
#[command(author, version)]
#[command(about = "Grad-CAM heatmaps for image classifiers")]
#[command(long_about = "medcam: gradient-weighted class activation maps for medical image classifiers.

EXAMPLES:
  # Create an (untrained) reference model checkpoint
  medcam init-model --output ./camnet --labels Normal,Pneumonia,Tuberculosis

  # Show class probabilities for an image
  medcam predict --checkpoint ./camnet --image scan.png

  # Generate heatmaps for every label above the threshold
  medcam explain --checkpoint ./camnet --image scan.png --diagnosis-id 42

  # Explain given predictions instead of running the classifier
  medcam explain --checkpoint ./camnet --image scan.png --diagnosis-id 42 \\
      --prediction Pneumonia=0.91 --prediction Normal=0.07

  # Write the default configuration
  medcam config --output medcam.json")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate heatmaps for the qualifying labels of one image
    Explain {
        /// Model checkpoint directory
        #[arg(long, value_name = "DIR")]
        checkpoint: PathBuf,

        /// Source image
        #[arg(long, value_name = "PATH")]
        image: PathBuf,

        /// Diagnosis the heatmaps belong to
        #[arg(long, value_name = "ID")]
        diagnosis_id: u64,

        /// Orchestrator configuration (JSON)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Predictions as LABEL=CONFIDENCE; the model is run when omitted
        #[arg(long = "prediction", value_name = "LABEL=CONF", value_parser = parse_prediction)]
        predictions: Vec<Prediction>,

        /// Override the output directory
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Override the confidence threshold
        #[arg(long, value_name = "T")]
        threshold: Option<f32>,

        /// Override the target layer
        #[arg(long, value_name = "NAME")]
        layer: Option<String>,

        /// Override the colormap: jet, turbo, viridis, inferno, grayscale
        #[arg(long, value_name = "NAME")]
        colormap: Option<String>,

        /// Process labels in parallel
        #[arg(long, default_value = "false")]
        parallel: bool,

        /// Append heatmap records to this JSON-lines file
        #[arg(long, default_value = "heatmaps.jsonl", value_name = "FILE")]
        records: PathBuf,
    },
    /// Print class probabilities for an image
    Predict {
        /// Model checkpoint directory
        #[arg(long, value_name = "DIR")]
        checkpoint: PathBuf,

        /// Source image
        #[arg(long, value_name = "PATH")]
        image: PathBuf,

        /// Confidence threshold used to mark qualifying labels
        #[arg(long, default_value = "0.5", value_name = "T")]
        threshold: f32,
    },
    /// Write a freshly initialized reference model checkpoint
    InitModel {
        /// Checkpoint directory to create
        #[arg(long, value_name = "DIR")]
        output: PathBuf,

        /// Comma-separated class labels
        #[arg(long, value_delimiter = ',', default_value = "Normal,Pneumonia,Tuberculosis,COVID-19")]
        labels: Vec<String>,

        /// Square input size
        #[arg(long, default_value = "224", value_name = "PIXELS")]
        input_size: usize,

        /// Comma-separated filters per convolutional stage
        #[arg(long, value_delimiter = ',', default_value = "16,32,64")]
        filters: Vec<usize>,

        /// Random seed for initialization
        #[arg(long, default_value = "42", value_name = "SEED")]
        seed: u64,
    },
    /// Print or write the default orchestrator configuration
    Config {
        /// Write to this file instead of stdout
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match cli.command {
        Commands::Explain {
            checkpoint,
            image,
            diagnosis_id,
            config,
            predictions,
            output_dir,
            threshold,
            layer,
            colormap,
            parallel,
            records,
        } => {
            let mut config = match config {
                Some(path) => OrchestratorConfig::load(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => OrchestratorConfig::default(),
            };
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(t) = threshold {
                config.conf_threshold = t;
            }
            if let Some(layer) = layer {
                config.target_layer = Some(layer);
            }
            if let Some(name) = colormap {
                config.colormap = ColorMap::from_name(&name)
                    .with_context(|| format!("Unknown colormap '{name}'"))?;
            }
            config.parallel_labels |= parallel;

            handle_explain(&checkpoint, &image, diagnosis_id, config, predictions, &records)
        }
        Commands::Predict {
            checkpoint,
            image,
            threshold,
        } => handle_predict(&checkpoint, &image, threshold),
        Commands::InitModel {
            output,
            labels,
            input_size,
            filters,
            seed,
        } => handle_init_model(&output, labels, input_size, filters, seed),
        Commands::Config { output } => handle_config(output),
    }
}

/// Parse `LABEL=CONFIDENCE`; the label may itself contain `=`.
fn parse_prediction(arg: &str) -> std::result::Result<Prediction, String> {
    let (label, confidence) = arg
        .rsplit_once('=')
        .ok_or_else(|| format!("expected LABEL=CONFIDENCE, got '{arg}'"))?;
    let confidence: f32 = confidence
        .trim()
        .parse()
        .map_err(|e| format!("invalid confidence in '{arg}': {e}"))?;
    if label.is_empty() {
        return Err(format!("empty label in '{arg}'"));
    }
    Ok(Prediction::new(label, confidence))
}

fn load_model(checkpoint: &Path) -> Result<CliModel> {
    let device = burn_ndarray::NdArrayDevice::Cpu;
    let model = load_cam_model::<CliBackend>(checkpoint, &device)
        .with_context(|| format!("Failed to load checkpoint {}", checkpoint.display()))?;
    tracing::info!(
        "Loaded model with {} classes, layers {:?}",
        model.n_classes(),
        model.layer_names()
    );
    Ok(Arc::new(SharedModel::new(model)))
}

fn handle_explain(
    checkpoint: &Path,
    image: &Path,
    diagnosis_id: u64,
    config: OrchestratorConfig,
    predictions: Vec<Prediction>,
    records: &Path,
) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let model = load_model(checkpoint)?;
    let sink = JsonlSink::open(records)
        .with_context(|| format!("Failed to open records file {}", records.display()))?;
    let orchestrator = HeatmapOrchestrator::new(
        model,
        config,
        sink,
        burn_ndarray::NdArrayDevice::Cpu,
    )
    .context("Failed to set up heatmap generation")?;

    let predictions = if predictions.is_empty() {
        orchestrator
            .predict(image)
            .with_context(|| format!("Failed to classify {}", image.display()))?
    } else {
        predictions
    };

    println!("=== medcam explain ===\n");
    println!("  Diagnosis: {}", diagnosis_id);
    println!("  Image: {}", image.display());
    println!("  Layer: {}", orchestrator.target_layer());
    println!("  Threshold: {}\n", orchestrator.config().conf_threshold);

    let report = orchestrator.run(diagnosis_id, image, &predictions);

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(artifact) => println!(
                "  [ok]   {:<24} {:.3}  -> {}",
                outcome.label,
                outcome.confidence,
                artifact.file_path().display()
            ),
            Err(e) => println!("  [fail] {:<24} {:.3}  {}", outcome.label, outcome.confidence, e),
        }
    }

    match report.status() {
        ReportStatus::NoQualifyingLabels => {
            println!("No label reached the confidence threshold.");
            Ok(())
        }
        ReportStatus::AllFailed => bail!(
            "All {} qualifying label(s) failed for diagnosis {}",
            report.outcomes.len(),
            diagnosis_id
        ),
        ReportStatus::Partial | ReportStatus::Complete => {
            println!(
                "\n{}/{} heatmap(s) written.",
                report.success_count(),
                report.outcomes.len()
            );
            Ok(())
        }
    }
}

fn handle_predict(checkpoint: &Path, image: &Path, threshold: f32) -> Result<()> {
    let model = load_model(checkpoint)?;
    let pixels = FsImageSource
        .load(image)
        .with_context(|| format!("Failed to read {}", image.display()))?;
    let input = Preprocessor::new(model.input_size())
        .to_tensor::<CliBackend>(&pixels, &burn_ndarray::NdArrayDevice::Cpu)?;

    let predictions = predict(&*model, input)?;
    let selected = qualifying(&predictions, threshold);

    println!("Predictions for {}:", image.display());
    println!("─────────────────────────────────────────");
    for p in &predictions {
        let mark = if selected.iter().any(|s| s.label == p.label) {
            "*"
        } else {
            " "
        };
        println!("  {} {:<24} {:.4}", mark, p.label, p.confidence);
    }
    println!("\n* confidence >= {threshold}");
    Ok(())
}

fn handle_init_model(
    output: &Path,
    labels: Vec<String>,
    input_size: usize,
    filters: Vec<usize>,
    seed: u64,
) -> Result<()> {
    let config = CamNetConfig::new(labels)
        .with_filters(filters)
        .with_input_size(input_size, input_size);
    let device = burn_ndarray::NdArrayDevice::Cpu;
    let model = config
        .init_model::<CliBackend>(Seed::new(seed), &device)
        .context("Invalid model configuration")?;

    model
        .save_checkpoint(output)
        .with_context(|| format!("Failed to write checkpoint {}", output.display()))?;

    println!("Wrote untrained CamNet checkpoint to {}", output.display());
    println!("  Classes: {}", config.class_names.join(", "));
    println!("  Layers: {}", model.layer_names().join(", "));
    Ok(())
}

fn handle_config(output: Option<PathBuf>) -> Result<()> {
    let config = OrchestratorConfig::default();
    match output {
        Some(path) => {
            config
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}
