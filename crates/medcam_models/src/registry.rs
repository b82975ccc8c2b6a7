//! Registry of loaded models, keyed by checkpoint path.
//!
//! Loading a checkpoint is expensive, so a serving layer keeps one shared
//! instance per checkpoint. The registry is owned by that layer and has an
//! explicit lifecycle: [`ModelRegistry::get_or_load`] loads on first use,
//! [`ModelRegistry::remove`] and [`ModelRegistry::clear`] release instances.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::tensor::backend::AutodiffBackend;
use medcam_core::Result;
use medcam_explain::SharedModel;
use parking_lot::RwLock;

use crate::checkpoint::load_cam_model;
use crate::cnn::CamNetModel;

/// Shared CamNet instance handed out by the registry.
pub type SharedCamNet<B> = Arc<SharedModel<B, CamNetModel<B>>>;

/// Registry of loaded models.
pub struct ModelRegistry<B: AutodiffBackend> {
    device: B::Device,
    models: RwLock<HashMap<PathBuf, SharedCamNet<B>>>,
}

impl<B: AutodiffBackend> ModelRegistry<B> {
    /// Create an empty registry loading onto `device`.
    pub fn new(device: B::Device) -> Self {
        Self {
            device,
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Return the instance for `path`, loading the checkpoint on first use.
    ///
    /// # Errors
    ///
    /// [`medcam_core::CamError::Checkpoint`] when the checkpoint cannot be loaded;
    /// nothing is cached in that case.
    pub fn get_or_load(&self, path: impl AsRef<Path>) -> Result<SharedCamNet<B>> {
        let path = path.as_ref();
        if let Some(model) = self.get(path) {
            return Ok(model);
        }

        let mut models = self.models.write();
        // Another caller may have loaded it while we waited.
        if let Some(model) = models.get(path) {
            return Ok(Arc::clone(model));
        }

        let model = Arc::new(SharedModel::new(load_cam_model::<B>(path, &self.device)?));
        models.insert(path.to_path_buf(), Arc::clone(&model));
        tracing::info!("Loaded model from {:?} ({} cached)", path, models.len());
        Ok(model)
    }

    /// Return the instance for `path` if it is loaded.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<SharedCamNet<B>> {
        self.models.read().get(path.as_ref()).cloned()
    }

    /// Register an already constructed model under `path`, replacing any previous one.
    pub fn insert(&self, path: impl Into<PathBuf>, model: CamNetModel<B>) -> SharedCamNet<B> {
        let model = Arc::new(SharedModel::new(model));
        self.models.write().insert(path.into(), Arc::clone(&model));
        model
    }

    /// Drop the registry's reference to `path`. Outstanding handles stay valid.
    pub fn remove(&self, path: impl AsRef<Path>) -> Option<SharedCamNet<B>> {
        self.models.write().remove(path.as_ref())
    }

    /// Drop every cached instance.
    pub fn clear(&self) {
        self.models.write().clear();
    }

    /// Number of cached instances.
    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }

    /// Cached checkpoint paths.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.models.read().keys().cloned().collect()
    }
}

impl<B: AutodiffBackend> std::fmt::Debug for ModelRegistry<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("paths", &self.paths())
            .finish()
    }
}
