//! TOML config loading for the experiment CLI.
//!
//! Deserializes an experiment TOML with an `[experiment]` section shared by
//! both model families plus optional `[cnn]` and `[t5]` sections.

use std::path::{Path, PathBuf};

use cnn_model::CnnEncoderParams;
use encoders::{BertEncoderConfig, DeviceConfig};
use ntp_core::{MonitorStrategy, NtpTrainer};
use serde::Deserialize;
use t5_model::GenerationParams;

/// Top-level structure of the experiment TOML.
#[derive(Debug, Deserialize)]
pub struct ExperimentToml {
    pub experiment: ExperimentSection,
    #[serde(default)]
    pub cnn: Option<CnnSection>,
    #[serde(default)]
    pub t5: Option<T5Section>,
}

/// Trainer settings shared by both model families.
#[derive(Debug, Deserialize)]
pub struct ExperimentSection {
    pub n_epochs: usize,
    pub batch_size: usize,
    #[serde(default = "default_eval_batch_size")]
    pub eval_batch_size: usize,
    #[serde(default)]
    pub seed: u64,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub monitor: MonitorStrategy,
}

fn default_eval_batch_size() -> usize {
    16
}

impl ExperimentSection {
    pub fn trainer(&self) -> NtpTrainer {
        NtpTrainer {
            n_epochs: self.n_epochs,
            batch_size: self.batch_size,
            eval_batch_size: self.eval_batch_size,
            seed: self.seed,
            output_dir: self.output_dir.clone(),
            monitor: self.monitor,
        }
    }
}

/// CNN classifier settings.
#[derive(Debug, Deserialize)]
pub struct CnnSection {
    #[serde(default)]
    pub encoder: CnnEncoderParams,
    #[serde(default = "default_max_seq_len")]
    pub max_seq_len: usize,
    #[serde(default = "default_cnn_lr")]
    pub lr: f64,
}

impl Default for CnnSection {
    fn default() -> Self {
        Self {
            encoder: CnnEncoderParams::default(),
            max_seq_len: default_max_seq_len(),
            lr: default_cnn_lr(),
        }
    }
}

fn default_max_seq_len() -> usize {
    100
}
fn default_cnn_lr() -> f64 {
    2e-5
}

/// Seq2seq model settings, including the sentence encoder used for label
/// mapping and clustering.
#[derive(Debug, Deserialize)]
pub struct T5Section {
    /// HuggingFace T5 model directory.
    pub model_dir: PathBuf,
    /// Sentence encoder used for clustering and candidate mapping.
    pub sentence_encoder: BertEncoderConfig,
    #[serde(default = "default_t5_lr")]
    pub lr: f64,
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub generation: GenerationParams,
    /// Include side-info task variants when the dataset has keywords.
    #[serde(default = "default_true")]
    pub side_info: bool,
    /// Include the yes/no candidate task during training.
    #[serde(default = "default_true")]
    pub bool_task: bool,
    /// Number of label clusters for clustered tasks; 0 disables clustering.
    #[serde(default)]
    pub n_clusters: usize,
}

fn default_t5_lr() -> f64 {
    1e-3
}
fn default_max_input_length() -> usize {
    512
}
fn default_true() -> bool {
    true
}

/// Load and deserialize an `ExperimentToml` from a TOML file.
pub fn load_experiment_toml(path: &Path) -> anyhow::Result<ExperimentToml> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let config: ExperimentToml = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
    tracing::info!(path = %path.display(), "Loaded experiment config");
    Ok(config)
}
