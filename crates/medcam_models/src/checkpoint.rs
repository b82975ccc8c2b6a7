//! Model checkpointing.
//!
//! A checkpoint is a directory holding the network weights (`weights.mpk`,
//! written with Burn's named MessagePack recorder) and a `model.json`
//! metadata file carrying the [`CamNetConfig`] needed to rebuild the
//! network before loading the weights.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;
use chrono::{DateTime, Utc};
use medcam_core::{CamError, Result};
use serde::{Deserialize, Serialize};

use crate::cnn::{CamNet, CamNetConfig, CamNetModel};

/// Weights file stem inside a checkpoint directory; the recorder adds `.mpk`.
pub const WEIGHTS_FILE: &str = "weights";
/// Metadata file inside a checkpoint directory.
pub const METADATA_FILE: &str = "model.json";

/// Model checkpoint metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Model architecture name.
    pub arch: String,
    /// Configuration the weights were produced with.
    pub config: CamNetConfig,
    /// When the checkpoint was written.
    pub created_at: DateTime<Utc>,
    /// Additional metadata.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl CheckpointMetadata {
    /// Create new metadata for a CamNet configuration.
    pub fn new(config: CamNetConfig) -> Self {
        Self {
            arch: "CamNet".to_string(),
            config,
            created_at: Utc::now(),
            extra: HashMap::new(),
        }
    }

    /// Add extra metadata.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Save metadata to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| CamError::Checkpoint(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load metadata from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            CamError::Checkpoint(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&json).map_err(|e| CamError::Checkpoint(e.to_string()))
    }
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// Save a network and its metadata into the checkpoint directory `dir`.
///
/// # Arguments
///
/// * `model` - The network to save
/// * `metadata` - Metadata written next to the weights
/// * `dir` - Checkpoint directory, created if missing
///
/// # Returns
///
/// The checkpoint directory.
pub fn save_checkpoint<B: Backend>(
    model: &CamNet<B>,
    metadata: &CheckpointMetadata,
    dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    model
        .clone()
        .save_file(dir.join(WEIGHTS_FILE), &recorder())
        .map_err(|e| CamError::Checkpoint(format!("failed to save weights: {e}")))?;
    metadata.save(dir.join(METADATA_FILE))?;

    tracing::info!("Saved {} checkpoint to {:?}", metadata.arch, dir);
    Ok(dir.to_path_buf())
}

/// Load a network from the checkpoint directory `dir`.
///
/// # Returns
///
/// The network with loaded weights and its metadata.
pub fn load_checkpoint<B: Backend>(
    dir: impl AsRef<Path>,
    device: &B::Device,
) -> Result<(CamNet<B>, CheckpointMetadata)> {
    let dir = dir.as_ref();
    let metadata = CheckpointMetadata::load(dir.join(METADATA_FILE))?;
    metadata.config.validate()?;

    let model = metadata
        .config
        .init::<B>(device)
        .load_file(dir.join(WEIGHTS_FILE), &recorder(), device)
        .map_err(|e| CamError::Checkpoint(format!("failed to load weights: {e}")))?;

    tracing::debug!("Loaded {} checkpoint from {:?}", metadata.arch, dir);
    Ok((model, metadata))
}

/// Load a checkpoint as an explainable model.
pub fn load_cam_model<B: AutodiffBackend>(
    dir: impl AsRef<Path>,
    device: &B::Device,
) -> Result<CamNetModel<B>> {
    let (net, metadata) = load_checkpoint::<B>(dir, device)?;
    Ok(CamNetModel::new(net, metadata.config))
}

/// Extension trait for saving an explainable CamNet with its configuration.
pub trait ModelCheckpoint {
    /// Save to the checkpoint directory `dir`.
    fn save_checkpoint(&self, dir: impl AsRef<Path>) -> Result<PathBuf>;
}

impl<B: AutodiffBackend> ModelCheckpoint for CamNetModel<B> {
    fn save_checkpoint(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        save_checkpoint(self.net(), &CheckpointMetadata::new(self.config().clone()), dir)
    }
}
