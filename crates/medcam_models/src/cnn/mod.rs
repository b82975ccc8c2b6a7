//! CNN image classifiers.

mod camnet;

pub use camnet::{layer_name, CamNet, CamNetConfig, CamNetModel, INPUT_CHANNELS};
