//! Candle T5 wrapper implementing the trainer contract.

use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use candle_transformers::models::t5::{self, T5ForConditionalGeneration};
use rand::seq::SliceRandom;
use tokenizers::Tokenizer;

use encoders::SentenceEncoder;
use ntp_core::{NtpModel, NtpSample, ValidOutput};
use tasks::{ClusterLabelMapper, Task, TaskContext};

use crate::batch::{build_batch, T5Batch, T5Encoded};
use crate::config::NtpT5Config;
use crate::eval::{count_matches, map_to_labels};
use crate::generation::{beam_search, BeamSearchParams};
use crate::loss::masked_cross_entropy;

/// Pretrained encoder-decoder LM fine-tuned on templated prompt tasks.
///
/// Weights live in a `VarMap` so the whole network is trainable with a
/// candle optimizer; the sentence encoder is a separate frozen model used
/// only to map generated text back onto the label set.
pub struct NtpT5Model {
    model: T5ForConditionalGeneration,
    tokenizer: Tokenizer,
    varmap: VarMap,
    optim: AdamW,
    config: NtpT5Config,
    model_config: t5::Config,
    sentence_encoder: Box<dyn SentenceEncoder>,
    cluster_mapper: Option<ClusterLabelMapper>,
    /// Embeddings of every vocabulary label, computed once at load.
    encoded_labels: Vec<Vec<f32>>,
    device: Device,
    model_dir: PathBuf,
}

impl NtpT5Model {
    /// Load from a HuggingFace T5 model directory (config.json,
    /// tokenizer.json, model.safetensors).
    pub fn load(
        model_dir: &Path,
        config: NtpT5Config,
        sentence_encoder: Box<dyn SentenceEncoder>,
        cluster_mapper: Option<ClusterLabelMapper>,
    ) -> anyhow::Result<Self> {
        let device = config.device.to_candle_device()?;

        tracing::info!(
            model_dir = %model_dir.display(),
            tasks = config.training_tasks.len(),
            labels = config.vocab.len(),
            "Loading seq2seq model"
        );

        let config_path = model_dir.join("config.json");
        let config_json = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", config_path.display(), e))?;
        let model_config: t5::Config = serde_json::from_str(&config_json)
            .map_err(|e| anyhow::anyhow!("Failed to parse config.json: {}", e))?;

        // Trainable weights go through a VarMap, which only handles a
        // single-file checkpoint.
        let weights_path = model_dir.join("model.safetensors");
        anyhow::ensure!(
            weights_path.exists(),
            "expected a single model.safetensors in {} (sharded checkpoints are not supported)",
            model_dir.display()
        );
        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = T5ForConditionalGeneration::load(vb, &model_config)?;
        varmap.load(&weights_path)?;

        let mut tokenizer = Tokenizer::from_file(model_dir.join("tokenizer.json"))
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: config.max_input_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to set truncation: {}", e))?;

        let optim = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: config.lr,
                ..Default::default()
            },
        )?;

        let label_refs: Vec<&str> = config.vocab.labels().iter().map(|s| s.as_str()).collect();
        let encoded_labels = sentence_encoder.encode(&label_refs)?;

        tracing::info!(
            vocab_size = model_config.vocab_size,
            labels = encoded_labels.len(),
            "Seq2seq model loaded"
        );

        Ok(Self {
            model,
            tokenizer,
            varmap,
            optim,
            config,
            model_config,
            sentence_encoder,
            cluster_mapper,
            encoded_labels,
            device,
            model_dir: model_dir.to_path_buf(),
        })
    }

    /// Restore a checkpoint written by [`NtpModel::save`].
    pub fn load_saved(
        dir: &Path,
        sentence_encoder: Box<dyn SentenceEncoder>,
    ) -> anyhow::Result<Self> {
        let config_path = dir.join("ntp_config.json");
        let config: NtpT5Config = serde_json::from_reader(
            std::fs::File::open(&config_path)
                .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", config_path.display(), e))?,
        )?;
        let mapper_path = dir.join("cluster_mapper.json");
        let cluster_mapper = if mapper_path.exists() {
            Some(serde_json::from_reader(std::fs::File::open(&mapper_path)?)?)
        } else {
            None
        };
        Self::load(dir, config, sentence_encoder, cluster_mapper)
    }

    /// Switch the evaluation task, e.g. to score one trained model against
    /// each task variant in turn.
    pub fn set_test_task(&mut self, task: Task) {
        self.config.test_task = task;
    }

    pub fn config(&self) -> &NtpT5Config {
        &self.config
    }

    fn eos_token_id(&self) -> u32 {
        self.model_config.eos_token_id as u32
    }

    fn pad_token_id(&self) -> u32 {
        self.model_config.pad_token_id as u32
    }

    fn decoder_start_token_id(&self) -> u32 {
        self.model_config
            .decoder_start_token_id
            .unwrap_or(self.model_config.pad_token_id) as u32
    }

    fn encode_text(&self, text: &str, ensure_eos: bool) -> anyhow::Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;
        let mut ids = encoding.get_ids().to_vec();
        if ensure_eos && ids.last() != Some(&self.eos_token_id()) {
            ids.push(self.eos_token_id());
        }
        Ok(ids)
    }

    /// Teacher-forced logits over the whole target, `(batch, tgt, vocab)`.
    /// The decoder is fed one position at a time through its KV cache.
    ///
    /// `encode` takes no attention mask, so each row is encoded separately
    /// at its unpadded length; pad tokens never enter encoder attention and
    /// the loss does not depend on batch composition.
    fn decoder_logits(&mut self, batch: &T5Batch) -> anyhow::Result<Tensor> {
        let lengths = unpadded_lengths(&batch.attention_mask)?;
        let (_, tgt_len) = batch.decoder_input_ids.dims2()?;
        let mut rows = Vec::with_capacity(lengths.len());
        for (i, &len) in lengths.iter().enumerate() {
            let input_row = batch.input_ids.narrow(0, i, 1)?.narrow(1, 0, len)?;
            let encoder_output = self.model.encode(&input_row)?;
            self.model.clear_kv_cache();
            let decoder_row = batch.decoder_input_ids.narrow(0, i, 1)?;
            let mut steps = Vec::with_capacity(tgt_len);
            for t in 0..tgt_len {
                let step_input = decoder_row.narrow(1, t, 1)?;
                let logits = self.model.decode(&step_input, &encoder_output)?;
                steps.push(logits.unsqueeze(1)?);
            }
            rows.push(Tensor::cat(&steps, 1)?);
        }
        Ok(Tensor::cat(&rows, 0)?)
    }

    /// Beam-search candidate continuations for every input in the batch,
    /// decoded to text. One inner vec per input, best candidate first.
    fn generate_candidates(&mut self, batch: &T5Batch) -> anyhow::Result<Vec<Vec<String>>> {
        let gen = &self.config.generation;
        let params = BeamSearchParams {
            num_beams: gen.num_beams,
            num_return_sequences: gen.num_return_sequences,
            max_new_tokens: gen.max_new_tokens,
            no_repeat_ngram_size: gen.no_repeat_ngram_size,
            early_stopping: gen.early_stopping,
            decoder_start_token_id: self.decoder_start_token_id(),
            eos_token_id: self.eos_token_id(),
        };

        let lengths = unpadded_lengths(&batch.attention_mask)?;
        let mut all = Vec::with_capacity(lengths.len());
        for (i, &len) in lengths.iter().enumerate() {
            // Trim padding before encoding so generation for a given sample
            // does not depend on its batch neighbors.
            let input_row = batch.input_ids.narrow(0, i, 1)?.narrow(1, 0, len)?;
            let encoder_output = self.model.encode(&input_row)?;

            let model = &mut self.model;
            let device = self.device.clone();
            let mut step = |prefix: &[u32]| -> anyhow::Result<Vec<f32>> {
                model.clear_kv_cache();
                let prefix_tensor =
                    Tensor::from_vec(prefix.to_vec(), (1, prefix.len()), &device)?;
                let logits = model.decode(&prefix_tensor, &encoder_output)?;
                let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1)?;
                Ok(log_probs.squeeze(0)?.to_vec1::<f32>()?)
            };

            let sequences = beam_search(&params, &mut step)?;
            let mut texts = Vec::with_capacity(sequences.len());
            for tokens in sequences {
                let text = self
                    .tokenizer
                    .decode(&tokens, true)
                    .map_err(|e| anyhow::anyhow!("Detokenization failed: {}", e))?;
                texts.push(text.trim().to_string());
            }
            all.push(texts);
        }
        Ok(all)
    }
}

/// Unpadded length of each batch row, recovered from the attention mask.
fn unpadded_lengths(attention_mask: &Tensor) -> anyhow::Result<Vec<usize>> {
    let sums = attention_mask.sum(1)?.to_vec1::<u32>()?;
    anyhow::ensure!(
        sums.iter().all(|&n| n > 0),
        "batch row with no attended tokens"
    );
    Ok(sums.into_iter().map(|n| n as usize).collect())
}

/// Flatten per-input candidate blocks into a fixed `k` entries per input,
/// padding short blocks with `None` so block arithmetic lines up.
fn assemble_blocks(mapped: Vec<Option<String>>, counts: &[usize], k: usize) -> Vec<Option<String>> {
    let mut out = Vec::with_capacity(counts.len() * k);
    let mut cursor = 0;
    for &count in counts {
        for j in 0..k {
            if j < count {
                out.push(mapped[cursor + j].clone());
            } else {
                out.push(None);
            }
        }
        cursor += count;
    }
    out
}

impl NtpModel for NtpT5Model {
    type Encoded = T5Encoded;
    type Batch = T5Batch;

    fn tokenize(&self, sample: &NtpSample, training: bool) -> anyhow::Result<T5Encoded> {
        let mut rng = rand::thread_rng();
        let task = if training {
            self.config
                .training_tasks
                .choose(&mut rng)
                .ok_or_else(|| anyhow::anyhow!("no training tasks configured"))?
        } else {
            &self.config.test_task
        };

        let ctx = TaskContext {
            title_sequence: &sample.input_title_sequence,
            next_title: &sample.immediate_next_title,
            keywords: sample.input_keywords_sequence.as_deref(),
            cluster_mapper: self.cluster_mapper.as_ref(),
        };
        let prompt = task.render(&ctx, &mut rng)?;

        Ok(T5Encoded {
            input_ids: self.encode_text(&prompt.input_text, false)?,
            labels: self.encode_text(&prompt.target_text, true)?,
            next_title: sample.immediate_next_title.clone(),
        })
    }

    fn prepare_input(&self, encoded: Vec<T5Encoded>, _training: bool) -> anyhow::Result<T5Batch> {
        build_batch(
            encoded,
            self.pad_token_id(),
            self.decoder_start_token_id(),
            &self.device,
        )
    }

    fn train_step(&mut self, batch: T5Batch) -> anyhow::Result<f64> {
        let logits = self.decoder_logits(&batch)?;
        let loss = masked_cross_entropy(&logits, &batch.labels)?;
        self.optim.backward_step(&loss)?;
        Ok(loss.to_scalar::<f32>()? as f64)
    }

    fn valid_step(&mut self, batch: T5Batch) -> anyhow::Result<ValidOutput> {
        let logits = self.decoder_logits(&batch)?;
        let loss: f32 = masked_cross_entropy(&logits, &batch.labels)?.to_scalar()?;

        let candidates = self.generate_candidates(&batch)?;
        let counts: Vec<usize> = candidates.iter().map(|c| c.len()).collect();
        let flat: Vec<&str> = candidates
            .iter()
            .flat_map(|c| c.iter().map(|s| s.as_str()))
            .collect();
        let candidate_embeddings = self.sentence_encoder.encode(&flat)?;
        let mapped = map_to_labels(&candidate_embeddings, &self.encoded_labels, &self.config.vocab);

        let k = self.config.generation.num_return_sequences;
        anyhow::ensure!(k > 0, "num_return_sequences must be positive");
        let blocks = assemble_blocks(mapped, &counts, k);
        let matches = count_matches(&blocks, &batch.truths, k);

        // Top mapped candidate per input, for inspection.
        let predictions: Vec<String> = blocks
            .chunks(k)
            .map(|block| {
                block
                    .iter()
                    .flatten()
                    .next()
                    .cloned()
                    .unwrap_or_default()
            })
            .collect();

        Ok(ValidOutput {
            matches,
            total: batch.truths.len(),
            loss: loss as f64,
            predictions: Some(predictions),
            truths: Some(batch.truths),
        })
    }

    fn save(&self, dir: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)?;
        self.varmap.save(dir.join("model.safetensors"))?;
        serde_json::to_writer_pretty(
            std::fs::File::create(dir.join("ntp_config.json"))?,
            &self.config,
        )?;
        if let Some(mapper) = &self.cluster_mapper {
            serde_json::to_writer_pretty(
                std::fs::File::create(dir.join("cluster_mapper.json"))?,
                mapper,
            )?;
        }
        // The checkpoint is a standalone model directory.
        for file in ["config.json", "tokenizer.json"] {
            let src = self.model_dir.join(file);
            let dst = dir.join(file);
            if src != dst {
                std::fs::copy(&src, &dst).map_err(|e| {
                    anyhow::anyhow!("Failed to copy {} to {}: {}", src.display(), dst.display(), e)
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(names: &[&str]) -> Vec<Option<String>> {
        names.iter().map(|s| Some(s.to_string())).collect()
    }

    #[test]
    fn test_assemble_blocks_pads_short_blocks() {
        let mapped = some(&["a", "b", "c"]);
        let blocks = assemble_blocks(mapped, &[2, 1], 3);
        assert_eq!(
            blocks,
            vec![
                Some("a".to_string()),
                Some("b".to_string()),
                None,
                Some("c".to_string()),
                None,
                None,
            ]
        );
    }

    #[test]
    fn test_assemble_blocks_full() {
        let mapped = some(&["a", "b"]);
        let blocks = assemble_blocks(mapped, &[1, 1], 1);
        assert_eq!(blocks, some(&["a", "b"]));
    }

    #[test]
    fn test_assemble_blocks_empty_input() {
        assert!(assemble_blocks(vec![], &[], 5).is_empty());
    }

    #[test]
    fn test_unpadded_lengths_recover_rows_before_padding() {
        let encoded = vec![
            T5Encoded {
                input_ids: vec![11, 12, 13],
                labels: vec![21, 1],
                next_title: "x".into(),
            },
            T5Encoded {
                input_ids: vec![14],
                labels: vec![22, 1],
                next_title: "y".into(),
            },
        ];
        let batch = build_batch(encoded, 0, 0, &Device::Cpu).unwrap();
        let lengths = unpadded_lengths(&batch.attention_mask).unwrap();
        assert_eq!(lengths, vec![3, 1]);

        // Narrowing a padded row to its length yields the original ids, so
        // the encoder sees no pad tokens.
        let row = batch
            .input_ids
            .narrow(0, 1, 1)
            .unwrap()
            .narrow(1, 0, lengths[1])
            .unwrap();
        assert_eq!(row.to_vec2::<u32>().unwrap(), vec![vec![14]]);
    }
}
