//! CamNet: a plain convolutional image classifier with named stages.
//!
//! Each stage is Conv2d (same padding) -> ReLU, with 2x2 max pooling between
//! stages. The last stage is followed by global average pooling and a linear
//! classifier, so the last convolution's output is the natural Grad-CAM target.

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
    Linear, LinearConfig, PaddingConfig2d, Relu,
};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use medcam_core::{CamError, CamModel, ClassLabels, LayerObserver, Result, Seed};
use serde::{Deserialize, Serialize};

/// Number of input channels (RGB).
pub const INPUT_CHANNELS: usize = 3;

/// Name of convolutional stage `index` (zero-based): `conv1`, `conv2`, ...
pub fn layer_name(index: usize) -> String {
    format!("conv{}", index + 1)
}

/// Configuration for the CamNet model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CamNetConfig {
    /// Class names in output order.
    pub class_names: Vec<String>,
    /// Output channels of each convolutional stage.
    pub filters: Vec<usize>,
    /// Square kernel size, must be odd.
    pub kernel_size: usize,
    /// Input `(height, width)`.
    pub input_size: (usize, usize),
}

impl Default for CamNetConfig {
    fn default() -> Self {
        Self {
            class_names: ["Normal", "Pneumonia", "Tuberculosis", "COVID-19"]
                .into_iter()
                .map(String::from)
                .collect(),
            filters: vec![16, 32, 64],
            kernel_size: 3,
            input_size: (224, 224),
        }
    }
}

impl CamNetConfig {
    /// Create a new config for the given classes.
    pub fn new<I, S>(class_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            class_names: class_names.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the filters of every stage.
    #[must_use]
    pub fn with_filters(mut self, filters: Vec<usize>) -> Self {
        self.filters = filters;
        self
    }

    /// Set the kernel size.
    #[must_use]
    pub fn with_kernel_size(mut self, kernel_size: usize) -> Self {
        self.kernel_size = kernel_size;
        self
    }

    /// Set the input size.
    #[must_use]
    pub fn with_input_size(mut self, height: usize, width: usize) -> Self {
        self.input_size = (height, width);
        self
    }

    /// Number of output classes.
    pub fn n_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Class labels.
    pub fn labels(&self) -> ClassLabels {
        ClassLabels::new(self.class_names.iter().cloned())
    }

    /// Spatial size of the last stage's feature map.
    pub fn feature_size(&self) -> (usize, usize) {
        let pools = self.filters.len().saturating_sub(1) as u32;
        let divisor = 2usize.pow(pools);
        (self.input_size.0 / divisor, self.input_size.1 / divisor)
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// [`CamError::InvalidConfig`] when the model could not be built or would
    /// pool its feature map away.
    pub fn validate(&self) -> Result<()> {
        if self.class_names.is_empty() {
            return Err(CamError::InvalidConfig("at least one class is required".into()));
        }
        if self.filters.is_empty() || self.filters.contains(&0) {
            return Err(CamError::InvalidConfig(format!(
                "filters must be non-empty and positive, got {:?}",
                self.filters
            )));
        }
        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            return Err(CamError::InvalidConfig(format!(
                "kernel size must be odd, got {}",
                self.kernel_size
            )));
        }
        let (fh, fw) = self.feature_size();
        if fh == 0 || fw == 0 {
            return Err(CamError::InvalidConfig(format!(
                "input size {:?} is too small for {} stages",
                self.input_size,
                self.filters.len()
            )));
        }
        Ok(())
    }

    /// Initialize the network.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CamNet<B> {
        CamNet::new(self, device)
    }

    /// Initialize the network after seeding the backend generator.
    pub fn init_seeded<B: Backend>(&self, seed: Seed, device: &B::Device) -> CamNet<B> {
        seed.apply::<B>();
        self.init(device)
    }

    /// Validate, initialize and wrap as an explainable model.
    ///
    /// # Errors
    ///
    /// See [`CamNetConfig::validate`].
    pub fn init_model<B: AutodiffBackend>(
        &self,
        seed: Seed,
        device: &B::Device,
    ) -> Result<CamNetModel<B>> {
        self.validate()?;
        Ok(CamNetModel::new(self.init_seeded(seed, device), self.clone()))
    }
}

/// Convolutional image classifier.
///
/// Architecture:
/// - for each stage i: Conv2d(k x k, same padding) -> ReLU, then MaxPool2d(2) unless last
/// - AdaptiveAvgPool2d(1) -> flatten
/// - Linear(filters.last, n_classes)
#[derive(Module, Debug)]
pub struct CamNet<B: Backend> {
    /// Convolutional stages.
    convs: Vec<Conv2d<B>>,
    /// Downsampling between stages.
    pool: MaxPool2d,
    /// Global average pooling.
    gap: AdaptiveAvgPool2d,
    /// Final linear classifier.
    fc: Linear<B>,
}

impl<B: Backend> CamNet<B> {
    /// Create a new CamNet.
    pub fn new(config: &CamNetConfig, device: &B::Device) -> Self {
        let k = config.kernel_size;
        let mut in_channels = INPUT_CHANNELS;
        let mut convs = Vec::with_capacity(config.filters.len());
        for &out_channels in &config.filters {
            convs.push(
                Conv2dConfig::new([in_channels, out_channels], [k, k])
                    .with_padding(PaddingConfig2d::Same)
                    .init(device),
            );
            in_channels = out_channels;
        }

        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        let gap = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let fc = LinearConfig::new(in_channels, config.n_classes()).init(device);

        Self {
            convs,
            pool,
            gap,
            fc,
        }
    }

    /// Number of convolutional stages.
    pub fn n_stages(&self) -> usize {
        self.convs.len()
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor of shape (batch, 3, height, width)
    ///
    /// # Returns
    ///
    /// Logits of shape (batch, n_classes)
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward_with(x, |_, out| out)
    }

    /// Forward pass, handing each convolution output (before its ReLU) to
    /// `stage` and continuing with whatever it returns.
    pub fn forward_with<F>(&self, x: Tensor<B, 4>, mut stage: F) -> Tensor<B, 2>
    where
        F: FnMut(usize, Tensor<B, 4>) -> Tensor<B, 4>,
    {
        let last = self.convs.len().saturating_sub(1);
        let mut x = x;
        for (i, conv) in self.convs.iter().enumerate() {
            x = stage(i, conv.forward(x));
            x = Relu::new().forward(x);
            if i < last {
                x = self.pool.forward(x);
            }
        }

        let x = self.gap.forward(x);
        let x = x.flatten::<2>(1, 3);
        self.fc.forward(x)
    }
}

/// A [`CamNet`] with its labels and input size, explainable through [`CamModel`].
#[derive(Debug)]
pub struct CamNetModel<B: AutodiffBackend> {
    net: CamNet<B>,
    config: CamNetConfig,
    labels: ClassLabels,
}

impl<B: AutodiffBackend> CamNetModel<B> {
    /// Wrap a network built from `config`.
    pub fn new(net: CamNet<B>, config: CamNetConfig) -> Self {
        let labels = config.labels();
        Self { net, config, labels }
    }

    /// The wrapped network.
    pub fn net(&self) -> &CamNet<B> {
        &self.net
    }

    /// The configuration the network was built from.
    pub fn config(&self) -> &CamNetConfig {
        &self.config
    }
}

impl<B: AutodiffBackend> CamModel<B> for CamNetModel<B> {
    fn forward_observed(&self, x: Tensor<B, 4>, observer: &dyn LayerObserver<B>) -> Tensor<B, 2> {
        self.net
            .forward_with(x, |i, out| observer.observe(&layer_name(i), out))
    }

    fn layer_names(&self) -> Vec<String> {
        (0..self.net.n_stages()).map(layer_name).collect()
    }

    fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    fn input_size(&self) -> (usize, usize) {
        self.config.input_size
    }
}
