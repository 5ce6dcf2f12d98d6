//! Model configuration, serialized next to the checkpoint.

use encoders::DeviceConfig;
use ntp_core::LabelVocab;
use serde::{Deserialize, Serialize};
use tasks::Task;

/// Decoding hyperparameters for evaluation-time generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Candidate sequences kept per input.
    #[serde(default = "default_num_return_sequences")]
    pub num_return_sequences: usize,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,
    #[serde(default = "default_num_beams")]
    pub num_beams: usize,
    /// N-gram size whose repetition is banned during decoding; 0 disables.
    #[serde(default)]
    pub no_repeat_ngram_size: usize,
    /// Stop once `num_return_sequences` beams have finished.
    #[serde(default = "default_early_stopping")]
    pub early_stopping: bool,
}

fn default_num_return_sequences() -> usize {
    5
}
fn default_max_new_tokens() -> usize {
    50
}
fn default_num_beams() -> usize {
    30
}
fn default_early_stopping() -> bool {
    true
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            num_return_sequences: default_num_return_sequences(),
            max_new_tokens: default_max_new_tokens(),
            num_beams: default_num_beams(),
            no_repeat_ngram_size: 0,
            early_stopping: default_early_stopping(),
        }
    }
}

/// Everything needed to reconstruct the experiment at load time: the task
/// mix, the label set, and the decoding setup. Composed of parts rather
/// than inheriting from a base config so each piece round-trips on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NtpT5Config {
    /// Tasks sampled from (uniformly, per sample) during training.
    pub training_tasks: Vec<Task>,
    /// Single task used for evaluation.
    pub test_task: Task,
    pub vocab: LabelVocab,
    #[serde(default)]
    pub generation: GenerationParams,
    #[serde(default = "default_lr")]
    pub lr: f64,
    #[serde(default)]
    pub device: DeviceConfig,
    /// Token truncation length for prompt inputs.
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,
}

fn default_lr() -> f64 {
    1e-3
}
fn default_max_input_length() -> usize {
    512
}
