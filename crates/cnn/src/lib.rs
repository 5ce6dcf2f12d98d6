//! CNN next-title classifier.
//!
//! A title history becomes a square "image": rows are the positions in the
//! sequence, columns the label vocabulary, and each cell the normalized
//! running count of the label up to that position. A small conv stack with
//! max-pooling feeds a linear head over the vocabulary, trained with
//! cross-entropy against the next title's label id.

pub mod config;
pub mod image;
pub mod model;
pub mod ntp;
pub mod shape;

pub use config::{CnnConfigError, CnnEncoderParams, CnnModelConfig};
pub use model::CnnClassifier;
pub use ntp::{load_cnn_model, new_cnn_model, CnnBatch, CnnEncoded, NtpCnnModel};
