//! Sentence embedding backends used for label clustering and for mapping
//! generated text back onto the label set.
//!
//! The [`SentenceEncoder`] trait is the seam: the BERT mean-pool encoder is
//! the production backend, and the layered encoder composes token/layer
//! fusion strategies over any model that exposes per-layer hidden states.

pub mod bert;
pub mod device;
pub mod encoder;
pub mod layered;
pub mod similarity;

pub use bert::{BertEncoderConfig, BertMeanEncoder};
pub use device::DeviceConfig;
pub use encoder::SentenceEncoder;
pub use layered::{HiddenStateModel, LayerFusion, LayeredEncoder, TokenFusion};
pub use similarity::{argmax_row, cosine, cosine_sim_matrix};
