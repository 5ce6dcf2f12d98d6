//! Composable fusion over per-layer hidden states.
//!
//! Some backbones expose every transformer layer's hidden states; this
//! module turns a configurable selection of those layers into a single
//! sentence embedding by fusing over tokens first, then over layers.

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::encoder::SentenceEncoder;

/// How token positions collapse into one vector per layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenFusion {
    Sum,
    Mean,
}

/// How per-layer vectors combine into the final embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerFusion {
    /// Element-wise sum; output keeps the hidden dimension.
    Sum,
    /// Concatenation; output dimension is `n_layers * hidden`.
    Concat,
}

impl TokenFusion {
    /// Collapse `(batch, seq, hidden)` to `(batch, hidden)`.
    pub fn fuse_tokens(&self, hidden: &Tensor) -> anyhow::Result<Tensor> {
        match self {
            TokenFusion::Sum => Ok(hidden.sum(1)?),
            TokenFusion::Mean => Ok(hidden.mean(1)?),
        }
    }
}

impl LayerFusion {
    /// Combine per-layer `(batch, hidden)` tensors into `(batch, out)`.
    pub fn fuse_layers(&self, layers: Vec<Tensor>) -> anyhow::Result<Tensor> {
        anyhow::ensure!(!layers.is_empty(), "no layers to fuse");
        match self {
            LayerFusion::Sum => {
                let mut acc = layers[0].clone();
                for layer in &layers[1..] {
                    acc = (acc + layer)?;
                }
                Ok(acc)
            }
            LayerFusion::Concat => Ok(Tensor::cat(&layers, 1)?),
        }
    }
}

/// A model that can report the hidden states of every layer for a batch of
/// sentences, layer-major, each `(batch, seq, hidden)`.
pub trait HiddenStateModel {
    fn hidden_states(&self, sentences: &[&str]) -> anyhow::Result<Vec<Tensor>>;
}

/// Sentence encoder over the last `n_layers` hidden layers of a backbone,
/// fusing tokens within each layer and then fusing across layers.
pub struct LayeredEncoder<M> {
    backbone: M,
    n_layers: usize,
    token_fusion: TokenFusion,
    layer_fusion: LayerFusion,
    batch_size: usize,
}

impl<M: HiddenStateModel> LayeredEncoder<M> {
    pub fn new(
        backbone: M,
        n_layers: usize,
        token_fusion: TokenFusion,
        layer_fusion: LayerFusion,
        batch_size: usize,
    ) -> Self {
        Self {
            backbone,
            n_layers,
            token_fusion,
            layer_fusion,
            batch_size,
        }
    }
}

impl<M: HiddenStateModel> SentenceEncoder for LayeredEncoder<M> {
    fn chunk_size(&self) -> usize {
        self.batch_size
    }

    fn encode_chunk(&self, sentences: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        if sentences.is_empty() {
            return Ok(vec![]);
        }
        let all_layers = self.backbone.hidden_states(sentences)?;
        anyhow::ensure!(
            all_layers.len() >= self.n_layers && self.n_layers > 0,
            "requested last {} of {} layers",
            self.n_layers,
            all_layers.len()
        );
        let selected = &all_layers[all_layers.len() - self.n_layers..];
        let fused: Vec<Tensor> = selected
            .iter()
            .map(|layer| self.token_fusion.fuse_tokens(layer))
            .collect::<anyhow::Result<_>>()?;
        let embedding = self.layer_fusion.fuse_layers(fused)?;
        Ok(embedding.to_vec2::<f32>()?)
    }
}
