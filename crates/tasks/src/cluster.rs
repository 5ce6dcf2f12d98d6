//! Label-to-cluster mapping built from label embeddings.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::kmeans::KMeans;

/// Maps labels to cluster ids. Built once by embedding every unique label
/// and running k-means; saved alongside the model so evaluation uses the
/// same mapping as training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterLabelMapper {
    assignments: HashMap<String, usize>,
    n_clusters: usize,
}

impl ClusterLabelMapper {
    /// Embed `labels` with the given encode closure and cluster them.
    ///
    /// The closure is the seam to whatever sentence encoder the caller has
    /// loaded; this crate stays free of model dependencies.
    pub fn fit(
        labels: &[String],
        encode_fn: &dyn Fn(&[&str]) -> anyhow::Result<Vec<Vec<f32>>>,
        kmeans: &KMeans,
    ) -> anyhow::Result<Self> {
        let refs: Vec<&str> = labels.iter().map(|s| s.as_str()).collect();
        let embeddings = encode_fn(&refs)?;
        anyhow::ensure!(
            embeddings.len() == labels.len(),
            "encoder returned {} embeddings for {} labels",
            embeddings.len(),
            labels.len()
        );
        let cluster_ids = kmeans.fit(&embeddings)?;
        let assignments = labels
            .iter()
            .cloned()
            .zip(cluster_ids)
            .collect::<HashMap<_, _>>();
        tracing::info!(
            labels = labels.len(),
            clusters = kmeans.n_clusters,
            "Built label cluster mapping"
        );
        Ok(Self {
            assignments,
            n_clusters: kmeans.n_clusters,
        })
    }

    /// Build directly from known assignments.
    pub fn from_assignments(assignments: HashMap<String, usize>, n_clusters: usize) -> Self {
        Self {
            assignments,
            n_clusters,
        }
    }

    /// Cluster id of a label, if the label was clustered.
    pub fn cluster_of(&self, label: &str) -> Option<usize> {
        self.assignments.get(label).copied()
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}
