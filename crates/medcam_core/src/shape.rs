//! Feature map shape metadata.

use serde::{Deserialize, Serialize};

use crate::error::{CamError, Result};

/// Shape metadata for 4-D image / feature map tensors.
///
/// Follows the convention `(B, C, H, W)`:
/// - `B`: Batch size
/// - `C`: Channels
/// - `H`: Height
/// - `W`: Width
///
/// # Example
///
/// ```rust
/// use medcam_core::FeatureShape;
///
/// let shape = FeatureShape::new(1, 64, 7, 7);
/// assert_eq!(shape.channels(), 64);
/// assert_eq!(shape.spatial(), (7, 7));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureShape {
    batch: usize,
    channels: usize,
    height: usize,
    width: usize,
}

impl FeatureShape {
    /// Create a new shape with the specified dimensions.
    #[must_use]
    pub const fn new(batch: usize, channels: usize, height: usize, width: usize) -> Self {
        Self {
            batch,
            channels,
            height,
            width,
        }
    }

    /// Create a shape from a slice of dimensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice doesn't contain exactly 4 elements.
    ///
    /// ```rust
    /// use medcam_core::FeatureShape;
    ///
    /// let shape = FeatureShape::from_dims(&[1, 3, 224, 224]).unwrap();
    /// assert_eq!(shape.height(), 224);
    /// assert!(FeatureShape::from_dims(&[1, 3, 224]).is_err());
    /// ```
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        match dims {
            [b, c, h, w] => Ok(Self::new(*b, *c, *h, *w)),
            _ => Err(CamError::ShapeMismatch(format!(
                "expected 4 dimensions (B, C, H, W), got {}",
                dims.len()
            ))),
        }
    }

    /// Get the batch size.
    #[must_use]
    pub const fn batch(&self) -> usize {
        self.batch
    }

    /// Get the number of channels.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Get the height.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Get the width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// `(height, width)` pair.
    #[must_use]
    pub const fn spatial(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Check if any dimension is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.batch == 0 || self.channels == 0 || self.height == 0 || self.width == 0
    }

    /// Get the total number of elements.
    #[must_use]
    pub const fn numel(&self) -> usize {
        self.batch * self.channels * self.height * self.width
    }

    /// Convert to an array.
    #[must_use]
    pub const fn as_array(&self) -> [usize; 4] {
        [self.batch, self.channels, self.height, self.width]
    }

    /// Ensure this is a single-sample, non-empty feature map.
    ///
    /// # Errors
    ///
    /// [`CamError::ShapeMismatch`] when the batch is not 1 or a dimension is zero.
    pub fn ensure_single(&self, what: &str) -> Result<()> {
        if self.batch != 1 || self.is_empty() {
            return Err(CamError::ShapeMismatch(format!(
                "{what} must be (1, C, H, W) with non-zero dimensions, got {self}"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for FeatureShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(B={}, C={}, H={}, W={})",
            self.batch, self.channels, self.height, self.width
        )
    }
}

impl From<[usize; 4]> for FeatureShape {
    fn from([batch, channels, height, width]: [usize; 4]) -> Self {
        Self::new(batch, channels, height, width)
    }
}
