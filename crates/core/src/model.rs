//! The model contract the generic trainer drives.

use std::path::Path;

use crate::sample::NtpSample;

/// Outcome of one validation batch.
#[derive(Debug, Clone, Default)]
pub struct ValidOutput {
    /// Decoded predictions, when the model family produces readable text.
    pub predictions: Option<Vec<String>>,
    /// Ground-truth titles aligned with `predictions`.
    pub truths: Option<Vec<String>>,
    /// Correctly predicted samples in this batch.
    pub matches: usize,
    /// Samples evaluated in this batch.
    pub total: usize,
    /// Mean loss over the batch.
    pub loss: f64,
}

impl ValidOutput {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.matches as f64 / self.total as f64
        }
    }
}

/// A next-title-prediction model as seen by the trainer: per-sample
/// tokenization, batch assembly, and the two step functions. `Encoded` is
/// the per-sample intermediate, `Batch` the collated form the steps consume.
///
/// `tokenize` and `prepare_input` take `training` because some model
/// families encode differently at train and eval time (task sampling,
/// target construction).
pub trait NtpModel {
    type Encoded;
    type Batch;

    fn tokenize(&self, sample: &NtpSample, training: bool) -> anyhow::Result<Self::Encoded>;

    fn prepare_input(
        &self,
        encoded: Vec<Self::Encoded>,
        training: bool,
    ) -> anyhow::Result<Self::Batch>;

    /// One optimizer step; returns the batch loss.
    fn train_step(&mut self, batch: Self::Batch) -> anyhow::Result<f64>;

    fn valid_step(&mut self, batch: Self::Batch) -> anyhow::Result<ValidOutput>;

    /// Persist weights and config under `dir`.
    fn save(&self, dir: &Path) -> anyhow::Result<()>;
}
