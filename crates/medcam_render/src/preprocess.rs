//! Image to tensor preprocessing.

use burn::prelude::*;
use burn::tensor::TensorData;
use image::imageops::FilterType;
use image::RgbImage;
use medcam_core::{CamError, Result};
use serde::{Deserialize, Serialize};

/// Per-channel normalization applied after scaling pixels to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    /// Channel means (R, G, B).
    pub mean: [f32; 3],
    /// Channel standard deviations (R, G, B).
    pub std: [f32; 3],
}

impl Default for Normalization {
    /// ImageNet statistics.
    fn default() -> Self {
        Self {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

impl Normalization {
    /// No normalization: values stay in `[0, 1]`.
    #[must_use]
    pub const fn identity() -> Self {
        Self {
            mean: [0.0; 3],
            std: [1.0; 3],
        }
    }

    /// Check that every standard deviation is positive and finite.
    ///
    /// # Errors
    ///
    /// [`CamError::InvalidConfig`] otherwise.
    pub fn validate(&self) -> Result<()> {
        if self.std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(CamError::InvalidConfig(format!(
                "normalization std must be positive, got {:?}",
                self.std
            )));
        }
        Ok(())
    }
}

/// Turns decoded RGB images into model input tensors of shape (1, 3, H, W).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocessor {
    input_size: (usize, usize),
    normalization: Normalization,
}

impl Preprocessor {
    /// Preprocessor for a model expecting `(height, width)` inputs, with ImageNet normalization.
    #[must_use]
    pub fn new(input_size: (usize, usize)) -> Self {
        Self {
            input_size,
            normalization: Normalization::default(),
        }
    }

    /// Use a different normalization.
    #[must_use]
    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Target `(height, width)`.
    pub fn input_size(&self) -> (usize, usize) {
        self.input_size
    }

    /// Resize, scale and normalize `image` into a (1, 3, H, W) tensor.
    ///
    /// # Errors
    ///
    /// [`CamError::InvalidConfig`] for a zero input size or bad normalization,
    /// [`CamError::ShapeMismatch`] for an empty image.
    pub fn to_tensor<B: Backend>(&self, image: &RgbImage, device: &B::Device) -> Result<Tensor<B, 4>> {
        self.normalization.validate()?;
        let (height, width) = self.input_size;
        if height == 0 || width == 0 {
            return Err(CamError::InvalidConfig(format!(
                "model input size must be non-zero, got {height}x{width}"
            )));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(CamError::ShapeMismatch("source image is empty".to_string()));
        }

        let resized = if image.dimensions() == (width as u32, height as u32) {
            image.clone()
        } else {
            image::imageops::resize(image, width as u32, height as u32, FilterType::Triangle)
        };

        // HWC u8 -> CHW f32
        let plane = height * width;
        let mut values = vec![0.0f32; 3 * plane];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let offset = y as usize * width + x as usize;
            for c in 0..3 {
                let scaled = f32::from(pixel[c]) / 255.0;
                values[c * plane + offset] =
                    (scaled - self.normalization.mean[c]) / self.normalization.std[c];
            }
        }

        let data = TensorData::new(values, [1, 3, height, width]);
        Ok(Tensor::<B, 4>::from_data(data, device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medcam_core::backend::NdArray;

    #[test]
    fn test_identity_normalization_values() {
        let device = Default::default();
        let mut image = RgbImage::new(2, 2);
        image.put_pixel(1, 0, image::Rgb([255, 0, 51]));

        let tensor = Preprocessor::new((2, 2))
            .with_normalization(Normalization::identity())
            .to_tensor::<NdArray>(&image, &device)
            .unwrap();
        assert_eq!(tensor.dims(), [1, 3, 2, 2]);

        let values = tensor.into_data().to_vec::<f32>().unwrap();
        // (c, y=0, x=1)
        assert!((values[1] - 1.0).abs() < 1e-6);
        assert!((values[4 + 1]).abs() < 1e-6);
        assert!((values[8 + 1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_imagenet_normalization() {
        let device = Default::default();
        let image = RgbImage::from_pixel(3, 3, image::Rgb([0, 0, 0]));
        let values = Preprocessor::new((3, 3))
            .to_tensor::<NdArray>(&image, &device)
            .unwrap()
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        assert!((values[0] - (-0.485 / 0.229)).abs() < 1e-5);
        assert!((values[9] - (-0.456 / 0.224)).abs() < 1e-5);
        assert!((values[18] - (-0.406 / 0.225)).abs() < 1e-5);
    }

    #[test]
    fn test_resizes_to_input_size() {
        let device = Default::default();
        let image = RgbImage::from_pixel(37, 19, image::Rgb([128, 128, 128]));
        let tensor = Preprocessor::new((16, 24)).to_tensor::<NdArray>(&image, &device).unwrap();
        assert_eq!(tensor.dims(), [1, 3, 16, 24]);
    }

    #[test]
    fn test_rejects_bad_config() {
        let device = Default::default();
        let image = RgbImage::new(4, 4);
        assert!(Preprocessor::new((0, 4)).to_tensor::<NdArray>(&image, &device).is_err());

        let bad = Normalization {
            mean: [0.0; 3],
            std: [1.0, 0.0, 1.0],
        };
        assert!(Preprocessor::new((4, 4))
            .with_normalization(bad)
            .to_tensor::<NdArray>(&image, &device)
            .is_err());
    }
}
