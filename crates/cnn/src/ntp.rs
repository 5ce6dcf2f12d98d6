//! Trainer-facing wrapper: batching, optimization, checkpointing.

use std::path::Path;

use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{AdamWConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;

use ntp_core::{NtpModel, NtpSample, ValidOutput};

use crate::config::CnnModelConfig;
use crate::image::{build_image, images_to_tensor};
use crate::model::CnnClassifier;

/// Per-sample intermediate: the history window plus the target label id.
#[derive(Debug, Clone)]
pub struct CnnEncoded {
    pub titles: Vec<String>,
    pub label_id: usize,
    pub truth: String,
}

/// Collated batch of images and target label ids.
pub struct CnnBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
    pub truths: Vec<String>,
}

/// CNN classifier plus its optimizer state, driven by the generic trainer.
pub struct NtpCnnModel<B: AutodiffBackend, O: Optimizer<CnnClassifier<B>, B>> {
    model: CnnClassifier<B>,
    optim: O,
    config: CnnModelConfig,
    device: B::Device,
}

/// Build a fresh model with an AdamW optimizer.
pub fn new_cnn_model<B: AutodiffBackend>(
    config: CnnModelConfig,
    device: B::Device,
) -> anyhow::Result<NtpCnnModel<B, impl Optimizer<CnnClassifier<B>, B>>> {
    let model = config.init::<B>(&device)?;
    tracing::info!(
        stages = config.encoder.n_stages(),
        labels = config.vocab.len(),
        max_seq_len = config.max_seq_len,
        "Initialized CNN classifier"
    );
    Ok(NtpCnnModel {
        model,
        optim: AdamWConfig::new().init(),
        config,
        device,
    })
}

/// Restore a saved model (config.json + model.mpk) from `dir`.
pub fn load_cnn_model<B: AutodiffBackend>(
    dir: &Path,
    device: B::Device,
) -> anyhow::Result<NtpCnnModel<B, impl Optimizer<CnnClassifier<B>, B>>> {
    let config_path = dir.join("config.json");
    let config: CnnModelConfig = serde_json::from_reader(
        std::fs::File::open(&config_path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", config_path.display(), e))?,
    )
    .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", config_path.display(), e))?;
    let model = config.init::<B>(&device)?;
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let model = model
        .load_file(dir.join("model"), &recorder, &device)
        .map_err(|e| anyhow::anyhow!("Failed to load weights from {}: {}", dir.display(), e))?;
    tracing::info!(dir = %dir.display(), "Restored CNN checkpoint");
    Ok(NtpCnnModel {
        model,
        optim: AdamWConfig::new().init(),
        config,
        device,
    })
}

impl<B: AutodiffBackend, O: Optimizer<CnnClassifier<B>, B>> NtpCnnModel<B, O> {
    pub fn config(&self) -> &CnnModelConfig {
        &self.config
    }
}

impl<B: AutodiffBackend, O: Optimizer<CnnClassifier<B>, B>> NtpModel for NtpCnnModel<B, O> {
    type Encoded = CnnEncoded;
    type Batch = CnnBatch<B>;

    fn tokenize(&self, sample: &NtpSample, _training: bool) -> anyhow::Result<CnnEncoded> {
        let label_id = self.config.vocab.id(&sample.immediate_next_title)?;
        Ok(CnnEncoded {
            titles: sample.input_title_sequence.clone(),
            label_id,
            truth: sample.immediate_next_title.clone(),
        })
    }

    fn prepare_input(
        &self,
        encoded: Vec<CnnEncoded>,
        _training: bool,
    ) -> anyhow::Result<CnnBatch<B>> {
        anyhow::ensure!(!encoded.is_empty(), "empty batch");
        let h = self.config.max_seq_len;
        let w = self.config.vocab.len();
        let mut images = Vec::with_capacity(encoded.len());
        let mut targets = Vec::with_capacity(encoded.len());
        let mut truths = Vec::with_capacity(encoded.len());
        for item in encoded {
            images.push(build_image(&item.titles, &self.config.vocab, h)?);
            targets.push(item.label_id as i64);
            truths.push(item.truth);
        }
        let batch = images.len();
        Ok(CnnBatch {
            images: images_to_tensor::<B>(&images, h, w, &self.device),
            targets: Tensor::from_data(TensorData::new(targets, [batch]), &self.device),
            truths,
        })
    }

    fn train_step(&mut self, batch: CnnBatch<B>) -> anyhow::Result<f64> {
        let logits = self.model.forward(batch.images);
        let loss = CrossEntropyLossConfig::new()
            .init(&self.device)
            .forward(logits, batch.targets);
        let loss_val: f64 = loss.clone().into_scalar().elem();

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self.optim.step(self.config.lr, self.model.clone(), grads);
        Ok(loss_val)
    }

    fn valid_step(&mut self, batch: CnnBatch<B>) -> anyhow::Result<ValidOutput> {
        let model = self.model.valid();
        let images = batch.images.inner();
        let targets = batch.targets.inner();

        let logits = model.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), targets.clone());
        let loss_val: f64 = loss.into_scalar().elem();

        let predicted: Vec<i64> = logits
            .argmax(1)
            .squeeze_dim::<1>(1)
            .into_data()
            .to_vec()
            .map_err(|e| anyhow::anyhow!("Failed to read predictions: {e:?}"))?;
        let target_ids: Vec<i64> = targets
            .into_data()
            .to_vec()
            .map_err(|e| anyhow::anyhow!("Failed to read targets: {e:?}"))?;

        let matches = predicted
            .iter()
            .zip(&target_ids)
            .filter(|(p, t)| p == t)
            .count();
        let predictions = predicted
            .iter()
            .map(|&id| {
                self.config
                    .vocab
                    .label(id as usize)
                    .map(|s| s.to_string())
                    .ok_or_else(|| anyhow::anyhow!("predicted id {id} outside vocabulary"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(ValidOutput {
            matches,
            total: target_ids.len(),
            loss: loss_val,
            predictions: Some(predictions),
            truths: Some(batch.truths),
        })
    }

    fn save(&self, dir: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)?;
        serde_json::to_writer_pretty(
            std::fs::File::create(dir.join("config.json"))?,
            &self.config,
        )?;
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.model
            .clone()
            .save_file(dir.join("model"), &recorder)
            .map_err(|e| anyhow::anyhow!("Failed to save weights to {}: {}", dir.display(), e))?;
        Ok(())
    }
}
