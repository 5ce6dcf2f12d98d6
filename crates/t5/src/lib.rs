//! Seq2seq next-title prediction on a pretrained encoder-decoder LM.
//!
//! Training renders each sample through one of the configured prompt
//! [`tasks::Task`]s; evaluation beam-searches candidate continuations and
//! maps them back onto the label set by embedding similarity.

pub mod batch;
pub mod config;
pub mod eval;
pub mod generation;
pub mod loss;
pub mod model;

pub use config::{GenerationParams, NtpT5Config};
pub use generation::{beam_search, BeamSearchParams};
pub use model::NtpT5Model;
