//! Small analytic model shared by the unit tests.

use burn::prelude::*;
use medcam_core::backend::CpuAutodiff;
use medcam_core::{CamModel, ClassLabels, LayerObserver};

pub(crate) type TestBackend = CpuAutodiff;

/// Two-stage model whose Grad-CAM maps can be worked out by hand.
///
/// `stem` is the input itself, `features = 2 * stem`, and the scores are
/// `mean_hw(features) @ W^T` with `W = [[1, 0], [0, 1], [1, -1]]`.
#[derive(Debug)]
pub(crate) struct TwoStageModel {
    labels: ClassLabels,
}

impl TwoStageModel {
    pub(crate) fn new() -> Self {
        Self {
            labels: ClassLabels::new(["left", "right", "diff"]),
        }
    }
}

impl CamModel<TestBackend> for TwoStageModel {
    fn forward_observed(
        &self,
        x: Tensor<TestBackend, 4>,
        observer: &dyn LayerObserver<TestBackend>,
    ) -> Tensor<TestBackend, 2> {
        let device = x.device();
        let stem = observer.observe("stem", x);
        let features = observer.observe("features", stem * 2.0);

        let [_, channels, _, _] = features.dims();
        let pooled = features.mean_dim(3).mean_dim(2).reshape([1, channels]);
        let weights = Tensor::<TestBackend, 1>::from_floats([1.0, 0.0, 0.0, 1.0, 1.0, -1.0], &device)
            .reshape([3, 2])
            .transpose();

        pooled.matmul(weights)
    }

    fn layer_names(&self) -> Vec<String> {
        vec!["stem".to_string(), "features".to_string()]
    }

    fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    fn input_size(&self) -> (usize, usize) {
        (4, 4)
    }
}

/// Input with a unit spot top-left in channel 0 and a 2.0 spot bottom-right in channel 1.
pub(crate) fn spot_input() -> Tensor<TestBackend, 4> {
    let mut values = vec![0.0f32; 2 * 4 * 4];
    values[0] = 1.0;
    values[16 + 15] = 2.0;
    Tensor::<TestBackend, 1>::from_floats(values.as_slice(), &Default::default()).reshape([1, 2, 4, 4])
}
