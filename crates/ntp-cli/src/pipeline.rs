//! Experiment pipelines wiring configs, data, and models together.

use std::path::PathBuf;

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;

use cnn_model::{new_cnn_model, CnnModelConfig};
use encoders::{BertMeanEncoder, SentenceEncoder};
use ntp_core::{LabelVocab, NtpDataset, NtpTrainer};
use t5_model::{NtpT5Config, NtpT5Model};
use tasks::{ClusterLabelMapper, KMeans, Task};

use crate::config::{load_experiment_toml, T5Section};

type CnnBackend = Autodiff<NdArray<f32>>;

pub struct TrainCnnArgs {
    pub config: PathBuf,
    pub dataset: PathBuf,
}

pub struct TrainT5Args {
    pub config: PathBuf,
    pub dataset: PathBuf,
}

pub struct EvalT5Args {
    pub config: PathBuf,
    pub dataset: PathBuf,
    pub checkpoint: PathBuf,
}

/// Train the CNN classifier and report test accuracy.
pub fn run_train_cnn(args: TrainCnnArgs) -> anyhow::Result<()> {
    let toml = load_experiment_toml(&args.config)?;
    let section = toml.cnn.unwrap_or_default();
    let dataset = NtpDataset::load(&args.dataset)?;
    let vocab = LabelVocab::from_labels(dataset.all_unique_labels.iter().cloned());

    let mut model_config = CnnModelConfig::new(vocab);
    model_config.encoder = section.encoder;
    model_config.max_seq_len = section.max_seq_len;
    model_config.lr = section.lr;

    let mut model = new_cnn_model::<CnnBackend>(model_config, Default::default())?;
    let trainer = toml.experiment.trainer();
    let report = trainer.train(&mut model, &dataset.train, &dataset.validation)?;
    tracing::info!(best_epoch = report.best_epoch + 1, "Training finished");

    if !dataset.test.is_empty() {
        let eval = trainer.evaluate(&mut model, &dataset.test)?;
        tracing::info!(
            accuracy = eval.accuracy,
            loss = eval.loss,
            "Test set evaluation"
        );
    }
    Ok(())
}

/// Fine-tune the seq2seq model on the configured task mix, then evaluate
/// each label-producing task variant on the test split.
pub fn run_train_t5(args: TrainT5Args) -> anyhow::Result<()> {
    let toml = load_experiment_toml(&args.config)?;
    let section = toml
        .t5
        .ok_or_else(|| anyhow::anyhow!("config has no [t5] section"))?;
    let dataset = NtpDataset::load(&args.dataset)?;
    let vocab = LabelVocab::from_labels(dataset.all_unique_labels.iter().cloned());

    let sentence_encoder = BertMeanEncoder::load(&section.sentence_encoder)?;
    let cluster_mapper = build_cluster_mapper(&section, &vocab, &sentence_encoder)?;
    let training_tasks = build_training_tasks(&section, &vocab, cluster_mapper.is_some());
    tracing::info!(tasks = ?training_tasks.iter().map(task_name).collect::<Vec<_>>(), "Training task mix");

    let model_config = NtpT5Config {
        training_tasks,
        test_task: Task::Direct,
        vocab,
        generation: section.generation.clone(),
        lr: section.lr,
        device: section.device.clone(),
        max_input_length: section.max_input_length,
    };
    let mut model = NtpT5Model::load(
        &section.model_dir,
        model_config,
        Box::new(sentence_encoder),
        cluster_mapper,
    )?;

    let trainer = toml.experiment.trainer();
    let report = trainer.train(&mut model, &dataset.train, &dataset.validation)?;
    tracing::info!(best_epoch = report.best_epoch + 1, "Training finished");

    if !dataset.test.is_empty() {
        evaluate_tasks(&trainer, &mut model, &dataset)?;
    }
    Ok(())
}

/// Evaluate a saved checkpoint against the test split.
pub fn run_eval_t5(args: EvalT5Args) -> anyhow::Result<()> {
    let toml = load_experiment_toml(&args.config)?;
    let section = toml
        .t5
        .ok_or_else(|| anyhow::anyhow!("config has no [t5] section"))?;
    let dataset = NtpDataset::load(&args.dataset)?;

    let sentence_encoder = BertMeanEncoder::load(&section.sentence_encoder)?;
    let mut model = NtpT5Model::load_saved(&args.checkpoint, Box::new(sentence_encoder))?;
    let trainer = toml.experiment.trainer();
    evaluate_tasks(&trainer, &mut model, &dataset)?;
    Ok(())
}

fn evaluate_tasks(
    trainer: &NtpTrainer,
    model: &mut NtpT5Model,
    dataset: &NtpDataset,
) -> anyhow::Result<()> {
    let split = if dataset.test.is_empty() {
        &dataset.validation
    } else {
        &dataset.test
    };
    let tasks: Vec<Task> = model
        .config()
        .training_tasks
        .iter()
        .filter(|t| !matches!(t, Task::BoolCandidate { .. }))
        .cloned()
        .collect();
    for task in tasks {
        let name = task_name(&task);
        model.set_test_task(task);
        let eval = trainer.evaluate(model, split)?;
        tracing::info!(
            task = name,
            accuracy = eval.accuracy,
            loss = eval.loss,
            "Task evaluation"
        );
    }
    Ok(())
}

fn build_training_tasks(section: &T5Section, vocab: &LabelVocab, clustered: bool) -> Vec<Task> {
    let mut tasks = vec![Task::Direct];
    if section.side_info {
        tasks.push(Task::DirectSideInfo);
    }
    if section.bool_task {
        tasks.push(Task::BoolCandidate {
            candidates: vocab.labels().to_vec(),
        });
    }
    if clustered {
        tasks.push(Task::Clustered);
        if section.side_info {
            tasks.push(Task::ClusteredSideInfo);
        }
    }
    tasks
}

fn build_cluster_mapper(
    section: &T5Section,
    vocab: &LabelVocab,
    encoder: &BertMeanEncoder,
) -> anyhow::Result<Option<ClusterLabelMapper>> {
    if section.n_clusters == 0 {
        return Ok(None);
    }
    let kmeans = KMeans::new(section.n_clusters);
    let encode = |sentences: &[&str]| encoder.encode(sentences);
    let mapper = ClusterLabelMapper::fit(vocab.labels(), &encode, &kmeans)?;
    Ok(Some(mapper))
}

fn task_name(task: &Task) -> &'static str {
    match task {
        Task::Direct => "direct",
        Task::DirectSideInfo => "direct_side_info",
        Task::BoolCandidate { .. } => "bool_candidate",
        Task::Clustered => "clustered",
        Task::ClusteredSideInfo => "clustered_side_info",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoders::BertEncoderConfig;

    fn section(side_info: bool, bool_task: bool) -> T5Section {
        T5Section {
            model_dir: PathBuf::from("models/t5"),
            sentence_encoder: BertEncoderConfig {
                model_dir: PathBuf::from("models/bert"),
                batch_size: 8,
                max_length: 64,
                device: Default::default(),
            },
            lr: 1e-3,
            max_input_length: 128,
            device: Default::default(),
            generation: Default::default(),
            side_info,
            bool_task,
            n_clusters: 0,
        }
    }

    #[test]
    fn test_task_mix_without_clustering() {
        let vocab = LabelVocab::from_labels(["a", "b"]);
        let tasks = build_training_tasks(&section(true, true), &vocab, false);
        assert_eq!(tasks.len(), 3);
        assert!(matches!(tasks[0], Task::Direct));
        assert!(matches!(tasks[1], Task::DirectSideInfo));
        assert!(
            matches!(&tasks[2], Task::BoolCandidate { candidates } if candidates.len() == 2)
        );
    }

    #[test]
    fn test_task_mix_with_clustering() {
        let vocab = LabelVocab::from_labels(["a", "b"]);
        let tasks = build_training_tasks(&section(true, false), &vocab, true);
        assert_eq!(tasks.len(), 4);
        assert!(matches!(tasks[3], Task::ClusteredSideInfo));
    }

    #[test]
    fn test_minimal_task_mix() {
        let vocab = LabelVocab::from_labels(["a"]);
        let tasks = build_training_tasks(&section(false, false), &vocab, false);
        assert_eq!(tasks.len(), 1);
        assert!(matches!(tasks[0], Task::Direct));
    }
}
