//! # medcam_render
//!
//! Everything between pixels and tensors for medcam:
//!
//! - [`ImageSource`] / [`FsImageSource`] for decoding source images
//! - [`Preprocessor`] for turning images into model inputs
//! - [`ColorMap`] lookup tables (Jet by default)
//! - [`Renderer`] for colorizing importance maps and blending them onto the
//!   original image, and [`Overlay`] for writing the result

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod colormap;
pub mod overlay;
pub mod preprocess;
pub mod source;

pub use colormap::{ColorLut, ColorMap};
pub use overlay::{BlendWeights, ChannelOrder, Overlay, OutputFormat, Renderer};
pub use preprocess::{Normalization, Preprocessor};
pub use source::{FsImageSource, ImageSource};
