//! Core types and the trainer contract for next-title prediction (NTP).
//!
//! A model family (CNN classifier, seq2seq LM, ...) plugs into the generic
//! [`NtpTrainer`] by implementing [`NtpModel`]: a tokenize / prepare_input /
//! train_step / valid_step pipeline over [`NtpSample`]s. The trainer holds no
//! model-specific knowledge — it drives epochs, batching, and checkpointing.

pub mod model;
pub mod sample;
pub mod trainer;
pub mod vocab;

pub use model::{NtpModel, ValidOutput};
pub use sample::{NtpDataset, NtpSample};
pub use trainer::{EvalReport, MonitorStrategy, NtpTrainer, TrainReport};
pub use vocab::{LabelVocab, VocabError};
