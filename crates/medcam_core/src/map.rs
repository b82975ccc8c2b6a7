//! Single-channel importance maps.

use ndarray::Array2;

use crate::error::{CamError, Result};

/// Range below which a map is treated as flat during normalization.
pub const NORMALIZE_EPSILON: f32 = 1e-8;

/// A single-channel spatial importance map, stored row-major as `(H, W)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportanceMap {
    values: Array2<f32>,
}

impl ImportanceMap {
    /// Wrap an existing `(H, W)` array.
    #[must_use]
    pub fn from_array(values: Array2<f32>) -> Self {
        Self { values }
    }

    /// Build a map from row-major values.
    ///
    /// # Errors
    ///
    /// [`CamError::ShapeMismatch`] when `values.len() != height * width`.
    pub fn from_vec(height: usize, width: usize, values: Vec<f32>) -> Result<Self> {
        let len = values.len();
        Array2::from_shape_vec((height, width), values)
            .map(Self::from_array)
            .map_err(|_| {
                CamError::ShapeMismatch(format!(
                    "cannot view {len} values as a ({height}, {width}) map"
                ))
            })
    }

    /// `(height, width)`.
    #[must_use]
    pub fn dims(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Height in rows.
    #[must_use]
    pub fn height(&self) -> usize {
        self.values.nrows()
    }

    /// Width in columns.
    #[must_use]
    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    /// Borrow the underlying array.
    #[must_use]
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// Consume into the underlying array.
    #[must_use]
    pub fn into_array(self) -> Array2<f32> {
        self.values
    }

    /// Value at `(row, col)`.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.values[[row, col]]
    }

    /// Smallest value, `0.0` for an empty map.
    #[must_use]
    pub fn min(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// Largest value, `0.0` for an empty map.
    #[must_use]
    pub fn max(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    /// Keep only positive contributions.
    #[must_use]
    pub fn relu(mut self) -> Self {
        self.values.mapv_inplace(|v| v.max(0.0));
        self
    }

    /// Rescale values to `[0, 1]`.
    ///
    /// A map whose range is below [`NORMALIZE_EPSILON`] becomes all zeros, so a
    /// flat map never produces NaN or Inf. Otherwise the minimum maps to exactly
    /// `0.0` and the maximum to exactly `1.0`.
    #[must_use]
    pub fn normalize(&self) -> Self {
        let min_val = self.min();
        let range = self.max() - min_val;

        let values = if range.is_finite() && range > NORMALIZE_EPSILON {
            self.values.mapv(|v| ((v - min_val) / range).clamp(0.0, 1.0))
        } else {
            Array2::zeros(self.values.raw_dim())
        };

        Self { values }
    }

    /// Resize to `(height, width)` with bilinear interpolation.
    #[must_use]
    pub fn resize(&self, height: usize, width: usize) -> Self {
        Self {
            values: bilinear_resize(&self.values, height, width),
        }
    }

    /// Quantize `[0, 1]` values to 8-bit intensities (`floor(255 * v)`).
    #[must_use]
    pub fn to_intensity(&self) -> Array2<u8> {
        self.values.mapv(|v| (v.clamp(0.0, 1.0) * 255.0) as u8)
    }
}

/// Bilinear resize with half-pixel centers (`align_corners = false`).
///
/// Output pixel `x` samples source coordinate `(x + 0.5) * in / out - 0.5`,
/// clamped to the source edges. Every output value is a convex combination of
/// source values, so non-negative maps stay non-negative.
#[must_use]
pub fn bilinear_resize(src: &Array2<f32>, height: usize, width: usize) -> Array2<f32> {
    let (src_h, src_w) = src.dim();
    if src_h == 0 || src_w == 0 || height == 0 || width == 0 {
        return Array2::zeros((height, width));
    }
    if (src_h, src_w) == (height, width) {
        return src.clone();
    }

    let rows: Vec<(usize, usize, f32)> = (0..height).map(|y| axis_sample(y, src_h, height)).collect();
    let cols: Vec<(usize, usize, f32)> = (0..width).map(|x| axis_sample(x, src_w, width)).collect();

    Array2::from_shape_fn((height, width), |(y, x)| {
        let (y0, y1, fy) = rows[y];
        let (x0, x1, fx) = cols[x];

        let top = src[[y0, x0]] * (1.0 - fx) + src[[y0, x1]] * fx;
        let bottom = src[[y1, x0]] * (1.0 - fx) + src[[y1, x1]] * fx;

        top * (1.0 - fy) + bottom * fy
    })
}

/// Source neighbours and interpolation weight for one output index.
fn axis_sample(dst: usize, src_len: usize, dst_len: usize) -> (usize, usize, f32) {
    let scale = src_len as f32 / dst_len as f32;
    let pos = ((dst as f32 + 0.5) * scale - 0.5).max(0.0);

    let i0 = (pos.floor() as usize).min(src_len - 1);
    let i1 = (i0 + 1).min(src_len - 1);
    let frac = if i0 == i1 { 0.0 } else { pos - i0 as f32 };

    (i0, i1, frac)
}
