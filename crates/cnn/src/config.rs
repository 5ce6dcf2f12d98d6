//! Validated configuration for the CNN classifier.

use ntp_core::LabelVocab;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CnnConfigError {
    #[error("input_dims, output_dims and kernel_sizes must have equal length ({0}, {1}, {2})")]
    LengthMismatch(usize, usize, usize),
    #[error("the conv stack needs at least one stage")]
    Empty,
    #[error("first input_dims entry must be 1 (single-channel image), got {0}")]
    BadFirstChannel(usize),
    #[error("stage {stage} expects {expected} input channels but the previous stage outputs {found}")]
    ChannelChainBroken {
        stage: usize,
        expected: usize,
        found: usize,
    },
    #[error("kernel size at stage {0} must be positive")]
    ZeroKernel(usize),
    #[error("the image collapses to zero size before clearing all {stages} pooling stages")]
    ImageCollapsed { stages: usize },
}

/// Channel and kernel layout of the conv stack, one entry per stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CnnEncoderParams {
    pub input_dims: Vec<usize>,
    pub output_dims: Vec<usize>,
    pub kernel_sizes: Vec<usize>,
}

impl Default for CnnEncoderParams {
    fn default() -> Self {
        Self {
            input_dims: vec![1, 64, 128, 128, 64, 64],
            output_dims: vec![64, 128, 128, 64, 64, 10],
            kernel_sizes: vec![7, 5, 5, 5, 5, 1],
        }
    }
}

impl CnnEncoderParams {
    pub fn n_stages(&self) -> usize {
        self.input_dims.len()
    }

    pub fn last_channels(&self) -> usize {
        self.output_dims.last().copied().unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), CnnConfigError> {
        if self.input_dims.len() != self.output_dims.len()
            || self.input_dims.len() != self.kernel_sizes.len()
        {
            return Err(CnnConfigError::LengthMismatch(
                self.input_dims.len(),
                self.output_dims.len(),
                self.kernel_sizes.len(),
            ));
        }
        if self.input_dims.is_empty() {
            return Err(CnnConfigError::Empty);
        }
        if self.input_dims[0] != 1 {
            return Err(CnnConfigError::BadFirstChannel(self.input_dims[0]));
        }
        for stage in 1..self.input_dims.len() {
            if self.input_dims[stage] != self.output_dims[stage - 1] {
                return Err(CnnConfigError::ChannelChainBroken {
                    stage,
                    expected: self.input_dims[stage],
                    found: self.output_dims[stage - 1],
                });
            }
        }
        for (stage, &k) in self.kernel_sizes.iter().enumerate() {
            if k == 0 {
                return Err(CnnConfigError::ZeroKernel(stage));
            }
        }
        Ok(())
    }
}

/// Full model configuration: conv layout, sequence window, label vocabulary
/// and learning rate. Serialized next to the weights on save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CnnModelConfig {
    #[serde(default)]
    pub encoder: CnnEncoderParams,
    /// Image height: title histories are truncated to this many most recent
    /// entries.
    #[serde(default = "default_max_seq_len")]
    pub max_seq_len: usize,
    pub vocab: LabelVocab,
    #[serde(default = "default_lr")]
    pub lr: f64,
}

fn default_max_seq_len() -> usize {
    100
}

fn default_lr() -> f64 {
    2e-5
}

impl CnnModelConfig {
    pub fn new(vocab: LabelVocab) -> Self {
        Self {
            encoder: CnnEncoderParams::default(),
            max_seq_len: default_max_seq_len(),
            vocab,
            lr: default_lr(),
        }
    }
}
