//! Heatmap overlays: colorize an importance map and blend it onto the source image.

use std::path::Path;

use image::{ImageFormat, RgbImage};
use medcam_core::{CamError, ImportanceMap, Result};
use serde::{Deserialize, Serialize};

use crate::colormap::{ColorLut, ColorMap};

/// Tolerance on `heatmap + original == 1.0`.
const BLEND_TOLERANCE: f32 = 1e-6;

/// Blend weights of the colorized map and the original image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendWeights {
    /// Weight of the colorized heatmap.
    pub heatmap: f32,
    /// Weight of the original image.
    pub original: f32,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            heatmap: 0.4,
            original: 0.6,
        }
    }
}

impl BlendWeights {
    /// Weights with the given heatmap share; the original gets the rest.
    #[must_use]
    pub fn with_heatmap(heatmap: f32) -> Self {
        Self {
            heatmap,
            original: 1.0 - heatmap,
        }
    }

    /// Check that both weights lie in `[0, 1]` and sum to one.
    ///
    /// # Errors
    ///
    /// [`CamError::InvalidConfig`] otherwise.
    pub fn validate(&self) -> Result<()> {
        let in_range = |w: f32| (0.0..=1.0).contains(&w);
        if !in_range(self.heatmap) || !in_range(self.original) {
            return Err(CamError::InvalidConfig(format!(
                "blend weights must lie in [0, 1], got heatmap={} original={}",
                self.heatmap, self.original
            )));
        }
        if (self.heatmap + self.original - 1.0).abs() > BLEND_TOLERANCE {
            return Err(CamError::InvalidConfig(format!(
                "blend weights must sum to 1.0, got {}",
                self.heatmap + self.original
            )));
        }
        Ok(())
    }
}

/// Output image encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossless PNG.
    #[default]
    Png,
    /// JPEG.
    Jpeg,
    /// Uncompressed BMP.
    Bmp,
}

impl OutputFormat {
    /// File extension without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Bmp => "bmp",
        }
    }
}

impl From<OutputFormat> for ImageFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Bmp => ImageFormat::Bmp,
        }
    }
}

/// Channel order of raw pixel buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelOrder {
    /// Red, green, blue.
    #[default]
    Rgb,
    /// Blue, green, red.
    Bgr,
}

/// A rendered heatmap overlay at the source image's resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    image: RgbImage,
}

impl Overlay {
    /// Borrow the RGB image.
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Consume into the RGB image.
    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// `(width, height)` in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Interleaved 8-bit pixels in the requested channel order.
    pub fn to_channel_order(&self, order: ChannelOrder) -> Vec<u8> {
        match order {
            ChannelOrder::Rgb => self.image.as_raw().clone(),
            ChannelOrder::Bgr => self
                .image
                .pixels()
                .flat_map(|p| [p[2], p[1], p[0]])
                .collect(),
        }
    }

    /// Encode and write the overlay to `path`.
    ///
    /// # Errors
    ///
    /// [`CamError::Io`] when the file cannot be created or encoded.
    pub fn save(&self, path: &Path, format: OutputFormat) -> Result<()> {
        self.image
            .save_with_format(path, format.into())
            .map_err(|e| match e {
                image::ImageError::IoError(io) => CamError::Io(io),
                other => CamError::Io(std::io::Error::other(other.to_string())),
            })?;
        tracing::debug!("Wrote overlay {:?}", path);
        Ok(())
    }
}

/// Renders importance maps onto source images.
#[derive(Debug, Clone)]
pub struct Renderer {
    colormap: ColorMap,
    blend: BlendWeights,
    lut: ColorLut,
}

impl Default for Renderer {
    fn default() -> Self {
        Self {
            colormap: ColorMap::default(),
            blend: BlendWeights::default(),
            lut: ColorMap::default().lut(),
        }
    }
}

impl Renderer {
    /// Create a renderer.
    ///
    /// # Errors
    ///
    /// [`CamError::InvalidConfig`] for invalid blend weights.
    pub fn new(colormap: ColorMap, blend: BlendWeights) -> Result<Self> {
        blend.validate()?;
        Ok(Self {
            colormap,
            blend,
            lut: colormap.lut(),
        })
    }

    /// Configured colormap.
    pub fn colormap(&self) -> ColorMap {
        self.colormap
    }

    /// Configured blend weights.
    pub fn blend(&self) -> BlendWeights {
        self.blend
    }

    /// Colorize a `[0, 1]` map at its own resolution.
    pub fn colorize(&self, map: &ImportanceMap) -> RgbImage {
        let (height, width) = map.dims();
        let intensity = map.to_intensity();

        RgbImage::from_fn(width as u32, height as u32, |x, y| {
            image::Rgb(self.lut[intensity[[y as usize, x as usize]] as usize])
        })
    }

    /// Resize `map` to `original`, colorize it and blend the two.
    ///
    /// `output = original_weight * original + heatmap_weight * color`, rounded
    /// and clipped to `[0, 255]` per channel.
    ///
    /// # Errors
    ///
    /// [`CamError::ShapeMismatch`] for an empty source image or map.
    pub fn render(&self, map: &ImportanceMap, original: &RgbImage) -> Result<Overlay> {
        let (width, height) = original.dimensions();
        if width == 0 || height == 0 {
            return Err(CamError::ShapeMismatch("source image is empty".to_string()));
        }
        let (map_h, map_w) = map.dims();
        if map_h == 0 || map_w == 0 {
            return Err(CamError::ShapeMismatch("importance map is empty".to_string()));
        }

        let resized;
        let map = if (map_h, map_w) == (height as usize, width as usize) {
            map
        } else {
            resized = map.resize(height as usize, width as usize);
            &resized
        };

        let colored = self.colorize(map);
        let BlendWeights {
            heatmap: alpha_heat,
            original: alpha_base,
        } = self.blend;

        let image = RgbImage::from_fn(width, height, |x, y| {
            let base = original.get_pixel(x, y);
            let heat = colored.get_pixel(x, y);
            image::Rgb(std::array::from_fn(|c| {
                let v = alpha_base * f32::from(base[c]) + alpha_heat * f32::from(heat[c]);
                v.round().clamp(0.0, 255.0) as u8
            }))
        });

        Ok(Overlay { image })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn gradient_map(height: usize, width: usize) -> ImportanceMap {
        ImportanceMap::from_array(Array2::from_shape_fn((height, width), |(_, x)| {
            x as f32 / (width - 1) as f32
        }))
    }

    #[test]
    fn test_blend_validation() {
        assert!(BlendWeights::default().validate().is_ok());
        assert!(BlendWeights::with_heatmap(0.25).validate().is_ok());
        assert!(BlendWeights { heatmap: 0.5, original: 0.6 }.validate().is_err());
        assert!(BlendWeights { heatmap: -0.2, original: 1.2 }.validate().is_err());
        assert!(Renderer::new(ColorMap::Jet, BlendWeights { heatmap: 1.0, original: 1.0 }).is_err());
    }

    #[test]
    fn test_render_blend_formula() {
        let renderer = Renderer::default();
        let original = RgbImage::from_pixel(2, 2, image::Rgb([100, 200, 50]));
        let map = ImportanceMap::from_array(Array2::zeros((2, 2)));

        let overlay = renderer.render(&map, &original).unwrap();
        // Zero intensity under Jet is (0, 0, 128).
        let expected = [
            (0.6f32 * 100.0).round() as u8,
            (0.6f32 * 200.0).round() as u8,
            (0.6f32 * 50.0 + 0.4 * 128.0).round() as u8,
        ];
        for p in overlay.image().pixels() {
            assert_eq!(p.0, expected);
        }
    }

    #[test]
    fn test_render_full_heatmap_weight() {
        let renderer = Renderer::new(ColorMap::Grayscale, BlendWeights::with_heatmap(1.0)).unwrap();
        let original = RgbImage::from_pixel(3, 1, image::Rgb([9, 9, 9]));
        let map = ImportanceMap::from_array(ndarray::array![[0.0, 0.5, 1.0]]);

        let overlay = renderer.render(&map, &original).unwrap();
        assert_eq!(overlay.image().get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(overlay.image().get_pixel(1, 0).0, [127, 127, 127]);
        assert_eq!(overlay.image().get_pixel(2, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_render_resizes_to_original() {
        let renderer = Renderer::default();
        let original = RgbImage::new(40, 30);
        let overlay = renderer.render(&gradient_map(7, 7), &original).unwrap();
        assert_eq!(overlay.dimensions(), (40, 30));

        // Left edge cold (blue dominant), right edge hot (red dominant).
        let left = overlay.image().get_pixel(0, 15);
        let right = overlay.image().get_pixel(39, 15);
        assert!(left[2] > left[0]);
        assert!(right[0] > right[2]);
    }

    #[test]
    fn test_render_rejects_empty() {
        let renderer = Renderer::default();
        let map = gradient_map(2, 2);
        assert!(renderer.render(&map, &RgbImage::new(0, 5)).is_err());
    }

    #[test]
    fn test_channel_order() {
        let renderer = Renderer::new(ColorMap::Grayscale, BlendWeights::with_heatmap(0.0)).unwrap();
        let original = RgbImage::from_pixel(1, 1, image::Rgb([1, 2, 3]));
        let map = ImportanceMap::from_array(Array2::zeros((1, 1)));
        let overlay = renderer.render(&map, &original).unwrap();

        assert_eq!(overlay.to_channel_order(ChannelOrder::Rgb), vec![1, 2, 3]);
        assert_eq!(overlay.to_channel_order(ChannelOrder::Bgr), vec![3, 2, 1]);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overlay.png");
        let overlay = Renderer::default()
            .render(&gradient_map(4, 4), &RgbImage::from_pixel(8, 6, image::Rgb([10, 20, 30])))
            .unwrap();

        overlay.save(&path, OutputFormat::Png).unwrap();
        let reloaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(&reloaded, overlay.image());
    }

    #[test]
    fn test_save_to_missing_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("overlay.png");
        let overlay = Renderer::default()
            .render(&gradient_map(2, 2), &RgbImage::new(2, 2))
            .unwrap();

        assert!(matches!(overlay.save(&path, OutputFormat::Png), Err(CamError::Io(_))));
    }

    #[test]
    fn test_output_format() {
        assert_eq!(OutputFormat::default().extension(), "png");
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
        let decoded: OutputFormat = serde_json::from_str("\"bmp\"").unwrap();
        assert_eq!(decoded, OutputFormat::Bmp);
    }
}
