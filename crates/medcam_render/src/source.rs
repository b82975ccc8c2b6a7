//! Image sources.

use std::path::Path;

use image::RgbImage;
use medcam_core::{CamError, Result};

/// Given a path, returns decoded RGB pixels.
pub trait ImageSource: Send + Sync {
    /// Load and decode `path` as 8-bit RGB.
    ///
    /// # Errors
    ///
    /// [`CamError::ImageDecode`] when the file is missing or cannot be decoded.
    fn load(&self, path: &Path) -> Result<RgbImage>;
}

/// Reads images from the local filesystem in any format the `image` crate decodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsImageSource;

impl ImageSource for FsImageSource {
    fn load(&self, path: &Path) -> Result<RgbImage> {
        let image = image::open(path).map_err(|e| CamError::ImageDecode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(image.to_rgb8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        RgbImage::from_pixel(5, 3, image::Rgb([1, 2, 3])).save(&path).unwrap();

        let loaded = FsImageSource.load(&path).unwrap();
        assert_eq!(loaded.dimensions(), (5, 3));
        assert_eq!(loaded.get_pixel(4, 2).0, [1, 2, 3]);
    }

    #[test]
    fn test_grayscale_becomes_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xray.png");
        image::GrayImage::from_pixel(2, 2, image::Luma([77])).save(&path).unwrap();

        let loaded = FsImageSource.load(&path).unwrap();
        assert_eq!(loaded.get_pixel(0, 0).0, [77, 77, 77]);
    }

    #[test]
    fn test_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.png");
        assert!(matches!(FsImageSource.load(&missing), Err(CamError::ImageDecode { .. })));

        let corrupt = dir.path().join("corrupt.png");
        std::fs::write(&corrupt, b"not an image").unwrap();
        assert!(matches!(FsImageSource.load(&corrupt), Err(CamError::ImageDecode { .. })));
    }
}
