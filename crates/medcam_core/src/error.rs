//! Error types shared by the medcam crates.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`CamError`].
pub type Result<T> = std::result::Result<T, CamError>;

/// Errors raised while capturing, computing, rendering or persisting heatmaps.
#[derive(Error, Debug)]
pub enum CamError {
    /// A capture is already attached to this layer of this model instance.
    #[error("Capture already attached to layer '{layer}'")]
    AlreadyAttached {
        /// Layer name.
        layer: String,
    },

    /// The model has no layer with the requested name.
    #[error("Unknown layer '{layer}' (available: {available})")]
    UnknownLayer {
        /// Requested layer name.
        layer: String,
        /// Comma separated list of the model's observable layers.
        available: String,
    },

    /// Activation or gradient missing, or they come from different passes.
    #[error("Capture incomplete: {0}")]
    CaptureIncomplete(String),

    /// Target class outside the model's output width, or an unknown label.
    #[error("Invalid class '{target}': model has {n_classes} classes")]
    InvalidClassIndex {
        /// The requested index or label.
        target: String,
        /// Number of model outputs.
        n_classes: usize,
    },

    /// Tensor shape does not match what the computation expects.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Source image could not be read or decoded.
    #[error("Failed to decode image {path:?}: {reason}")]
    ImageDecode {
        /// Source path.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },

    /// I/O error, typically while writing an output file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The persistence collaborator refused the record.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The label ran past its deadline and its result was discarded.
    #[error("Deadline exceeded after {elapsed_ms} ms (limit {limit_ms} ms)")]
    DeadlineExceeded {
        /// Time spent on the label.
        elapsed_ms: u128,
        /// Configured limit.
        limit_ms: u64,
    },

    /// Model checkpoint could not be saved or loaded.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Tensor data could not be read back from the backend.
    #[error("Tensor error: {0}")]
    Tensor(String),
}

impl CamError {
    /// Build an [`CamError::InvalidClassIndex`] for a numeric index.
    pub fn invalid_index(index: usize, n_classes: usize) -> Self {
        Self::InvalidClassIndex {
            target: index.to_string(),
            n_classes,
        }
    }

    /// Whether this error signals a caller bug rather than a runtime condition.
    #[must_use]
    pub const fn is_programmer_error(&self) -> bool {
        matches!(self, Self::AlreadyAttached { .. } | Self::UnknownLayer { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CamError::invalid_index(7, 4);
        assert_eq!(err.to_string(), "Invalid class '7': model has 4 classes");

        let err = CamError::AlreadyAttached {
            layer: "conv3".to_string(),
        };
        assert!(err.to_string().contains("conv3"));
        assert!(err.is_programmer_error());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: CamError = io.into();
        assert!(matches!(err, CamError::Io(_)));
        assert!(!err.is_programmer_error());
    }
}
