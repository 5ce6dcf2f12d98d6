//! The burn conv-stack classifier.

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Linear, LinearConfig, PaddingConfig2d};
use burn::prelude::*;

use crate::config::{CnnConfigError, CnnModelConfig};
use crate::shape::{flattened_dim, POOL_KERNEL, POOL_STRIDE};

/// Conv stack over co-occurrence images with a linear head over the label
/// vocabulary.
///
/// ```text
/// (batch, 1, max_seq_len, vocab)
///   → [Conv2d(same) → ReLU → MaxPool2d(2, stride 2)] per stage
///   → flatten
///   → Linear(flattened → vocab)
///   → logits: (batch, vocab)
/// ```
#[derive(Module, Debug)]
pub struct CnnClassifier<B: Backend> {
    convs: Vec<Conv2d<B>>,
    pool: MaxPool2d,
    head: Linear<B>,
}

impl CnnModelConfig {
    /// Validate and build the classifier. The head size is derived
    /// analytically, so a layout that collapses the image fails here rather
    /// than at the first forward pass.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<CnnClassifier<B>, CnnConfigError> {
        self.encoder.validate()?;
        let flattened = flattened_dim(&self.encoder, self.max_seq_len, self.vocab.len())?;

        let convs = self
            .encoder
            .input_dims
            .iter()
            .zip(&self.encoder.output_dims)
            .zip(&self.encoder.kernel_sizes)
            .map(|((&cin, &cout), &k)| {
                Conv2dConfig::new([cin, cout], [k, k])
                    .with_padding(PaddingConfig2d::Same)
                    .init(device)
            })
            .collect();

        Ok(CnnClassifier {
            convs,
            pool: MaxPool2dConfig::new([POOL_KERNEL, POOL_KERNEL])
                .with_strides([POOL_STRIDE, POOL_STRIDE])
                .init(),
            head: LinearConfig::new(flattened, self.vocab.len()).init(device),
        })
    }
}

impl<B: Backend> CnnClassifier<B> {
    /// Run the conv/pool stages and flatten.
    ///
    /// Input `(batch, 1, h, w)`, output `(batch, flattened)`.
    pub fn features(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for conv in &self.convs {
            x = conv.forward(x);
            x = burn::tensor::activation::relu(x);
            x = self.pool.forward(x);
        }
        let [batch, c, h, w] = x.dims();
        x.reshape([batch, c * h * w])
    }

    /// Logits over the label vocabulary, `(batch, vocab)`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(self.features(images))
    }
}
