//! BERT mean-pool sentence encoder backed by candle.

use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::device::DeviceConfig;
use crate::encoder::SentenceEncoder;

/// Configuration for the BERT sentence encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BertEncoderConfig {
    /// HuggingFace model directory (config.json, tokenizer.json, *.safetensors).
    pub model_dir: PathBuf,
    /// Sentences embedded per forward pass. Defaults to 64.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Token truncation length. Defaults to 128.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default)]
    pub device: DeviceConfig,
}

fn default_batch_size() -> usize {
    64
}
fn default_max_length() -> usize {
    128
}

/// Sentence encoder that mean-pools the last hidden layer of a BERT model
/// over non-padding tokens and L2-normalizes the result.
pub struct BertMeanEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    config: BertEncoderConfig,
    device: Device,
}

impl BertMeanEncoder {
    /// Load the encoder from a HuggingFace model directory.
    pub fn load(config: &BertEncoderConfig) -> anyhow::Result<Self> {
        let device = config.device.to_candle_device()?;

        tracing::info!(
            model_dir = %config.model_dir.display(),
            "Loading sentence encoder"
        );

        let config_path = config.model_dir.join("config.json");
        let config_json = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", config_path.display(), e))?;
        let bert_config: BertConfig = serde_json::from_str(&config_json)
            .map_err(|e| anyhow::anyhow!("Failed to parse config.json: {}", e))?;

        let safetensor_files = find_safetensors(&config.model_dir)?;
        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&safetensor_files, DTYPE, &device)? };

        // Checkpoints exported from a full pretraining head prefix weights
        // with "bert."; plain encoder exports do not.
        let model = BertModel::load(vb.clone(), &bert_config)
            .or_else(|_| BertModel::load(vb.pp("bert"), &bert_config))?;

        let mut tokenizer = Tokenizer::from_file(config.model_dir.join("tokenizer.json"))
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: config.max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to set truncation: {}", e))?;

        tracing::info!(
            hidden_size = bert_config.hidden_size,
            "Sentence encoder loaded"
        );

        Ok(Self {
            model,
            tokenizer,
            config: config.clone(),
            device,
        })
    }
}

impl SentenceEncoder for BertMeanEncoder {
    fn chunk_size(&self) -> usize {
        self.config.batch_size
    }

    fn encode_chunk(&self, sentences: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        if sentences.is_empty() {
            return Ok(vec![]);
        }
        let encodings = self
            .tokenizer
            .encode_batch(sentences.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        // Pad to the longest sequence in this chunk.
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);
        let mut ids = Vec::with_capacity(sentences.len());
        let mut masks = Vec::with_capacity(sentences.len());
        for encoding in &encodings {
            let mut row: Vec<u32> = encoding.get_ids().to_vec();
            let mut mask: Vec<u32> = encoding.get_attention_mask().to_vec();
            row.resize(max_len, 0);
            mask.resize(max_len, 0);
            ids.push(row);
            masks.push(mask);
        }

        let batch = sentences.len();
        let ids = Tensor::new(ids, &self.device)?;
        let mask = Tensor::new(masks, &self.device)?;
        let type_ids = ids.zeros_like()?;

        // (batch, seq, hidden)
        let hidden = self.model.forward(&ids, &type_ids, Some(&mask))?;

        // Mean over non-padding tokens, then L2 normalize.
        let mask_f = mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&mask_f)?.sum(1)?;
        let counts = mask_f.sum(1)?.clamp(1e-9, f64::INFINITY)?;
        let mean = summed.broadcast_div(&counts)?;
        let norm = mean.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(1e-12, f64::INFINITY)?;
        let normalized = mean.broadcast_div(&norm)?;

        let out = normalized.to_vec2::<f32>()?;
        debug_assert_eq!(out.len(), batch);
        Ok(out)
    }
}

/// Find all `.safetensors` files in a model directory, sorted by name.
fn find_safetensors(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", dir.display(), e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "safetensors"))
        .collect();
    files.sort();
    anyhow::ensure!(
        !files.is_empty(),
        "no .safetensors files found in {}",
        dir.display()
    );
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let json = r#"{"model_dir": "/tmp/bert"}"#;
        let cfg: BertEncoderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.batch_size, 64);
        assert_eq!(cfg.max_length, 128);
        assert_eq!(cfg.device, DeviceConfig::Cpu);
    }

    #[test]
    fn test_find_safetensors_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.safetensors"), b"x").unwrap();
        std::fs::write(dir.path().join("a.safetensors"), b"x").unwrap();
        std::fs::write(dir.path().join("config.json"), b"{}").unwrap();
        let files = find_safetensors(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.safetensors"));
    }

    #[test]
    fn test_find_safetensors_empty_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_safetensors(dir.path()).is_err());
    }
}
