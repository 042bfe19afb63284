use burn::{
    module::Module,
    nn::{
        Linear, LinearConfig,
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    tensor::{Tensor, activation::relu, backend::Backend},
};

const KERNEL: usize = 5;

/// Two conv/pool stages and a dense classifier head.
#[derive(Module, Debug)]
pub struct BoozeNet<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool: MaxPool2d,
    fc_out: Linear<B>,
}

impl<B: Backend> BoozeNet<B> {
    /// Creates the network.
    ///
    /// # Arguments
    /// - `device`: device the parameters live on.
    /// - `input_height` / `input_width`: decoded image size.
    /// - `num_classes`: width of the output logits.
    pub fn new(
        device: &B::Device,
        input_height: usize,
        input_width: usize,
        num_classes: usize,
    ) -> Self {
        let (height_after, width_after) = (
            feature_size(input_height),
            feature_size(input_width),
        );
        assert!(
            height_after > 0 && width_after > 0,
            "input must be at least 16x16, got {}x{}",
            input_width,
            input_height
        );

        let conv1 = Conv2dConfig::new([3, 8], [KERNEL, KERNEL]).init(device);
        let conv2 = Conv2dConfig::new([8, 16], [KERNEL, KERNEL]).init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        let fc_out = LinearConfig::new(16 * height_after * width_after, num_classes).init(device);

        Self {
            conv1,
            conv2,
            pool,
            fc_out,
        }
    }

    /// Maps `[batch, height, width, channels]` images to `[batch, classes]` logits.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = images.permute([0, 3, 1, 2]);

        let x = relu(self.conv1.forward(x));
        let x = self.pool.forward(x);

        let x = relu(self.conv2.forward(x));
        let x = self.pool.forward(x);

        let x = x.flatten(1, 3);
        self.fc_out.forward(x)
    }
}

/// Spatial size after two valid 5x5 convolutions, each followed by a 2x2 pool.
fn feature_size(input: usize) -> usize {
    let stage = |size: usize| size.saturating_sub(KERNEL - 1) / 2;
    stage(stage(input))
}
