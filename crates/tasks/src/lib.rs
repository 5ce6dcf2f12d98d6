//! Prompt task templates and label clustering.
//!
//! A [`Task`] renders an `NtpSample`-shaped context into an input/target
//! text pair for a seq2seq model. Clustered variants consult a
//! [`ClusterLabelMapper`] built by running k-means over label embeddings.

pub mod cluster;
pub mod kmeans;
pub mod task;

pub use cluster::ClusterLabelMapper;
pub use kmeans::{KMeans, KMeansError};
pub use task::{
    NegativeSampler, Prompt, Task, TaskContext, TaskError, UniformNegativeSampler,
};
