//! Colormaps for importance maps.
//!
//! Each colormap maps an 8-bit intensity to an RGB triple through a 256-entry
//! lookup table, so colorizing a map is a table lookup per pixel.

use serde::{Deserialize, Serialize};

/// Available colormaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMap {
    /// Blue -> cyan -> yellow -> red, piecewise linear.
    #[default]
    Jet,
    /// Blue -> cyan -> green -> yellow -> red.
    Turbo,
    /// Purple -> blue -> green -> yellow.
    Viridis,
    /// Black -> dark red -> orange -> yellow.
    Inferno,
    /// Black -> white.
    Grayscale,
}

/// 256-entry RGB lookup table.
pub type ColorLut = [[u8; 3]; 256];

impl ColorMap {
    /// Color of a normalized value in `[0, 1]`.
    #[must_use]
    pub fn color(self, value: f32) -> [u8; 3] {
        let t = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };

        let [r, g, b] = match self {
            Self::Jet => jet(t),
            Self::Turbo => turbo(t),
            Self::Viridis => viridis(t),
            Self::Inferno => inferno(t),
            Self::Grayscale => [t, t, t],
        };

        [to_u8(r), to_u8(g), to_u8(b)]
    }

    /// Lookup table indexed by 8-bit intensity.
    #[must_use]
    pub fn lut(self) -> ColorLut {
        let mut lut = [[0u8; 3]; 256];
        for (i, entry) in lut.iter_mut().enumerate() {
            *entry = self.color(i as f32 / 255.0);
        }
        lut
    }

    /// Parse a colormap name (case-insensitive).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "jet" => Some(Self::Jet),
            "turbo" => Some(Self::Turbo),
            "viridis" => Some(Self::Viridis),
            "inferno" => Some(Self::Inferno),
            "gray" | "grey" | "grayscale" => Some(Self::Grayscale),
            _ => None,
        }
    }
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn jet(t: f32) -> [f32; 3] {
    let channel = |center: f32| (1.5 - (4.0 * t - center).abs()).clamp(0.0, 1.0);
    [channel(3.0), channel(2.0), channel(1.0)]
}

// Polynomial approximations below.

fn turbo(t: f32) -> [f32; 3] {
    let r = ((6.0 * t - 3.0) * t * t).clamp(0.0, 1.0);
    let g = (-4.0 * (t - 0.5).powi(2) + 1.0).clamp(0.0, 1.0);
    let b = ((-6.0 * t + 3.0) * (1.0 - t)).clamp(0.0, 1.0);
    [r, g, b]
}

fn viridis(t: f32) -> [f32; 3] {
    let r = ((-4.5 * t + 11.0) * t - 4.5).clamp(0.0, 1.0);
    let g = ((5.0 * t - 9.5) * t + 4.5).clamp(0.0, 1.0);
    let b = ((-1.5 * t + 1.0) * t + 0.5).clamp(0.0, 1.0);
    [r, g, b]
}

fn inferno(t: f32) -> [f32; 3] {
    let r = ((3.5 * t - 1.0) * t + 0.05).clamp(0.0, 1.0);
    let g = (((4.0 * t - 3.5) * t + 0.5) * t).clamp(0.0, 1.0);
    let b = ((10.0 * t - 7.0) * t + 0.1).clamp(0.0, 1.0);
    [r, g, b]
}
