//! Generic epoch-driven trainer over any [`NtpModel`].

use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::model::NtpModel;
use crate::sample::NtpSample;

/// Which validation signal selects the best checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStrategy {
    /// Lower validation loss wins.
    Loss,
    /// Higher validation accuracy wins.
    #[default]
    Metric,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NtpTrainer {
    pub n_epochs: usize,
    pub batch_size: usize,
    pub eval_batch_size: usize,
    pub seed: u64,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub monitor: MonitorStrategy,
}

#[derive(Debug, Clone)]
pub struct TrainReport {
    pub epoch_train_losses: Vec<f64>,
    pub epoch_eval_reports: Vec<EvalReport>,
    pub best_epoch: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct EvalReport {
    pub accuracy: f64,
    pub loss: f64,
}

impl NtpTrainer {
    /// Run the full training loop: shuffle, batch, step, evaluate, and keep
    /// the best checkpoint under `output_dir` according to the monitor.
    pub fn train<M: NtpModel>(
        &self,
        model: &mut M,
        train: &[NtpSample],
        validation: &[NtpSample],
    ) -> anyhow::Result<TrainReport> {
        anyhow::ensure!(self.batch_size > 0, "batch_size must be positive");
        anyhow::ensure!(self.n_epochs > 0, "n_epochs must be positive");
        std::fs::create_dir_all(&self.output_dir)?;

        let mut report = TrainReport {
            epoch_train_losses: Vec::with_capacity(self.n_epochs),
            epoch_eval_reports: Vec::with_capacity(self.n_epochs),
            best_epoch: 0,
        };
        let mut best_score = f64::NEG_INFINITY;

        let mut order: Vec<usize> = (0..train.len()).collect();
        for epoch in 0..self.n_epochs {
            // Distinct but reproducible shuffle per epoch.
            let mut rng = rand::rngs::StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64));
            order.shuffle(&mut rng);

            let n_batches = train.len().div_ceil(self.batch_size);
            let bar = ProgressBar::new(n_batches as u64);
            bar.set_style(
                ProgressStyle::with_template(
                    "{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )?
                .progress_chars("=> "),
            );
            bar.set_message(format!("epoch {}/{}", epoch + 1, self.n_epochs));

            let mut loss_sum = 0.0;
            let mut n_steps = 0usize;
            for chunk in order.chunks(self.batch_size) {
                let encoded = chunk
                    .iter()
                    .map(|&i| model.tokenize(&train[i], true))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                let batch = model.prepare_input(encoded, true)?;
                loss_sum += model.train_step(batch)?;
                n_steps += 1;
                bar.inc(1);
            }
            bar.finish_and_clear();

            let train_loss = if n_steps == 0 { 0.0 } else { loss_sum / n_steps as f64 };
            let eval = self.evaluate(model, validation)?;
            tracing::info!(
                epoch = epoch + 1,
                train_loss,
                val_loss = eval.loss,
                val_accuracy = eval.accuracy,
                "Epoch complete"
            );

            let score = match self.monitor {
                MonitorStrategy::Loss => -eval.loss,
                MonitorStrategy::Metric => eval.accuracy,
            };
            if score > best_score {
                best_score = score;
                report.best_epoch = epoch;
                model.save(&self.output_dir)?;
                tracing::info!(epoch = epoch + 1, "Saved best checkpoint");
            }

            report.epoch_train_losses.push(train_loss);
            report.epoch_eval_reports.push(eval);
        }
        Ok(report)
    }

    /// Evaluate over `samples` in eval-sized batches.
    pub fn evaluate<M: NtpModel>(
        &self,
        model: &mut M,
        samples: &[NtpSample],
    ) -> anyhow::Result<EvalReport> {
        anyhow::ensure!(self.eval_batch_size > 0, "eval_batch_size must be positive");
        let mut matches = 0usize;
        let mut total = 0usize;
        let mut loss_sum = 0.0;
        let mut n_batches = 0usize;
        for chunk in samples.chunks(self.eval_batch_size) {
            let encoded = chunk
                .iter()
                .map(|s| model.tokenize(s, false))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let batch = model.prepare_input(encoded, false)?;
            let out = model.valid_step(batch)?;
            matches += out.matches;
            total += out.total;
            loss_sum += out.loss;
            n_batches += 1;
        }
        Ok(EvalReport {
            accuracy: if total == 0 { 0.0 } else { matches as f64 / total as f64 },
            loss: if n_batches == 0 { 0.0 } else { loss_sum / n_batches as f64 },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValidOutput;
    use std::path::Path;

    /// Counts calls and pretends loss shrinks each step; predicts correctly
    /// for samples whose next title is "hit".
    struct MockModel {
        steps: usize,
    }

    struct MockBatch {
        truths: Vec<String>,
    }

    impl NtpModel for MockModel {
        type Encoded = String;
        type Batch = MockBatch;

        fn tokenize(&self, sample: &NtpSample, _training: bool) -> anyhow::Result<String> {
            Ok(sample.immediate_next_title.clone())
        }

        fn prepare_input(
            &self,
            encoded: Vec<String>,
            _training: bool,
        ) -> anyhow::Result<MockBatch> {
            Ok(MockBatch { truths: encoded })
        }

        fn train_step(&mut self, _batch: MockBatch) -> anyhow::Result<f64> {
            self.steps += 1;
            Ok(1.0 / self.steps as f64)
        }

        fn valid_step(&mut self, batch: MockBatch) -> anyhow::Result<ValidOutput> {
            let matches = batch.truths.iter().filter(|t| *t == "hit").count();
            Ok(ValidOutput {
                matches,
                total: batch.truths.len(),
                loss: 0.5,
                ..ValidOutput::default()
            })
        }

        fn save(&self, dir: &Path) -> anyhow::Result<()> {
            std::fs::write(dir.join("checkpoint"), self.steps.to_string())?;
            Ok(())
        }
    }

    fn sample(next: &str) -> NtpSample {
        NtpSample {
            input_title_sequence: vec!["a".into()],
            immediate_next_title: next.into(),
            input_keywords_sequence: None,
        }
    }

    fn trainer(dir: &Path) -> NtpTrainer {
        NtpTrainer {
            n_epochs: 2,
            batch_size: 2,
            eval_batch_size: 2,
            seed: 7,
            output_dir: dir.to_path_buf(),
            monitor: MonitorStrategy::Metric,
        }
    }

    #[test]
    fn test_train_runs_all_batches_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = MockModel { steps: 0 };
        let train: Vec<_> = (0..5).map(|_| sample("hit")).collect();
        let val = vec![sample("hit"), sample("miss")];

        let report = trainer(dir.path()).train(&mut model, &train, &val).unwrap();

        // 5 samples, batch_size 2 -> 3 batches per epoch, 2 epochs.
        assert_eq!(model.steps, 6);
        assert_eq!(report.epoch_train_losses.len(), 2);
        assert_eq!(report.epoch_eval_reports.len(), 2);
        assert!((report.epoch_eval_reports[0].accuracy - 0.5).abs() < 1e-9);
        assert!(dir.path().join("checkpoint").exists());
    }

    #[test]
    fn test_evaluate_aggregates_across_batches() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = MockModel { steps: 0 };
        let samples = vec![sample("hit"), sample("miss"), sample("hit")];
        let report = trainer(dir.path()).evaluate(&mut model, &samples).unwrap();
        assert!((report.accuracy - 2.0 / 3.0).abs() < 1e-9);
        assert!((report.loss - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_evaluate_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = MockModel { steps: 0 };
        let report = trainer(dir.path()).evaluate(&mut model, &[]).unwrap();
        assert_eq!(report.accuracy, 0.0);
        assert_eq!(report.loss, 0.0);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = MockModel { steps: 0 };
        let mut t = trainer(dir.path());
        t.batch_size = 0;
        assert!(t.train(&mut model, &[sample("hit")], &[]).is_err());
    }
}
