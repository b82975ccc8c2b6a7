//! Orchestrator configuration.

use std::path::{Path, PathBuf};

use medcam_core::{CamError, Result};
use medcam_render::{BlendWeights, ColorMap, Normalization, OutputFormat};
use serde::{Deserialize, Serialize};

/// Configuration of a [`crate::HeatmapOrchestrator`], supplied once at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Minimum confidence for a label to get a heatmap (inclusive).
    pub conf_threshold: f32,
    /// Directory heatmap images are written to.
    pub output_dir: PathBuf,
    /// Blend weights of heatmap and original image.
    pub blend: BlendWeights,
    /// Colormap applied to the importance map.
    pub colormap: ColorMap,
    /// Output image encoding.
    pub output_format: OutputFormat,
    /// Layer to explain; the model's last convolutional stage when unset.
    pub target_layer: Option<String>,
    /// Input normalization used by the model.
    pub normalization: Normalization,
    /// Process qualifying labels in parallel.
    pub parallel_labels: bool,
    /// Per-label time limit in milliseconds; results over the limit are discarded.
    pub label_deadline_ms: Option<u64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            conf_threshold: 0.5,
            output_dir: PathBuf::from("outputs"),
            blend: BlendWeights::default(),
            colormap: ColorMap::default(),
            output_format: OutputFormat::default(),
            target_layer: None,
            normalization: Normalization::default(),
            parallel_labels: false,
            label_deadline_ms: None,
        }
    }
}

impl OrchestratorConfig {
    /// Set the confidence threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.conf_threshold = threshold;
        self
    }

    /// Set the output directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Explain a specific layer.
    #[must_use]
    pub fn with_target_layer(mut self, layer: impl Into<String>) -> Self {
        self.target_layer = Some(layer.into());
        self
    }

    /// Set the per-label deadline.
    #[must_use]
    pub fn with_deadline_ms(mut self, ms: u64) -> Self {
        self.label_deadline_ms = Some(ms);
        self
    }

    /// Check every field.
    ///
    /// # Errors
    ///
    /// [`CamError::InvalidConfig`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.conf_threshold) {
            return Err(CamError::InvalidConfig(format!(
                "conf_threshold must lie in [0, 1], got {}",
                self.conf_threshold
            )));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(CamError::InvalidConfig("output_dir must not be empty".into()));
        }
        if self.label_deadline_ms == Some(0) {
            return Err(CamError::InvalidConfig("label_deadline_ms must be positive".into()));
        }
        if matches!(&self.target_layer, Some(layer) if layer.is_empty()) {
            return Err(CamError::InvalidConfig("target_layer must not be empty".into()));
        }
        self.blend.validate()?;
        self.normalization.validate()
    }

    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self =
            serde_json::from_str(&json).map_err(|e| CamError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| CamError::InvalidConfig(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.conf_threshold, 0.5);
        assert_eq!(config.output_dir, PathBuf::from("outputs"));
        assert_eq!(config.blend, BlendWeights::default());
        assert_eq!(config.colormap, ColorMap::Jet);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(OrchestratorConfig::default().with_threshold(1.5).validate().is_err());
        assert!(OrchestratorConfig::default().with_threshold(f32::NAN).validate().is_err());
        assert!(OrchestratorConfig::default().with_deadline_ms(0).validate().is_err());
        assert!(OrchestratorConfig::default().with_output_dir("").validate().is_err());

        let mut config = OrchestratorConfig::default();
        config.blend = BlendWeights { heatmap: 0.7, original: 0.7 };
        assert!(matches!(config.validate(), Err(CamError::InvalidConfig(_))));
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = OrchestratorConfig::default()
            .with_threshold(0.3)
            .with_target_layer("conv2")
            .with_deadline_ms(500);

        config.save(&path).unwrap();
        assert_eq!(OrchestratorConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"conf_threshold": 0.8, "colormap": "viridis"}"#).unwrap();

        let config = OrchestratorConfig::load(&path).unwrap();
        assert_eq!(config.conf_threshold, 0.8);
        assert_eq!(config.colormap, ColorMap::Viridis);
        assert_eq!(config.output_format, OutputFormat::Png);
        assert!(!config.parallel_labels);
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"conf_threshold": 2.0}"#).unwrap();
        assert!(OrchestratorConfig::load(&path).is_err());
        assert!(matches!(
            OrchestratorConfig::load(dir.path().join("missing.json")),
            Err(CamError::Io(_))
        ));
    }
}
