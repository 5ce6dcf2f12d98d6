//! Dataset record types and the JSON loader.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// One next-title-prediction example: an ordered (chronological) title
/// history, the title that immediately follows it, and optional auxiliary
/// keywords describing the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NtpSample {
    /// Ordered title history, oldest first.
    pub input_title_sequence: Vec<String>,
    /// Ground-truth next title.
    pub immediate_next_title: String,
    /// Auxiliary keywords aligned with the history, if the dataset has them.
    #[serde(default)]
    pub input_keywords_sequence: Option<Vec<String>>,
}

/// Materialized dataset with train/validation/test splits and the full
/// unique-label set used to build the label vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NtpDataset {
    pub train: Vec<NtpSample>,
    pub validation: Vec<NtpSample>,
    #[serde(default)]
    pub test: Vec<NtpSample>,
    /// All unique labels across splits. If absent in the file, it is
    /// recomputed from the splits on load.
    #[serde(default)]
    pub all_unique_labels: Vec<String>,
}

impl NtpDataset {
    /// Load a dataset from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("failed to open dataset {}: {e}", path.display()))?;
        let mut dataset: NtpDataset = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| anyhow::anyhow!("failed to parse dataset {}: {e}", path.display()))?;
        if dataset.all_unique_labels.is_empty() {
            dataset.all_unique_labels = dataset.collect_unique_labels();
        }
        tracing::info!(
            train = dataset.train.len(),
            validation = dataset.validation.len(),
            test = dataset.test.len(),
            labels = dataset.all_unique_labels.len(),
            "Loaded dataset"
        );
        Ok(dataset)
    }

    /// Collect all unique titles across splits, first-seen order.
    pub fn collect_unique_labels(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut labels = Vec::new();
        let splits = [&self.train, &self.validation, &self.test];
        for sample in splits.iter().flat_map(|s| s.iter()) {
            for title in sample
                .input_title_sequence
                .iter()
                .chain(std::iter::once(&sample.immediate_next_title))
            {
                if seen.insert(title.clone()) {
                    labels.push(title.clone());
                }
            }
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(history: &[&str], next: &str) -> NtpSample {
        NtpSample {
            input_title_sequence: history.iter().map(|s| s.to_string()).collect(),
            immediate_next_title: next.to_string(),
            input_keywords_sequence: None,
        }
    }

    #[test]
    fn test_sample_deserialize() {
        let json = r#"{
            "input_title_sequence": ["analyst", "engineer"],
            "immediate_next_title": "manager",
            "input_keywords_sequence": ["data", "teams"]
        }"#;
        let s: NtpSample = serde_json::from_str(json).unwrap();
        assert_eq!(s.input_title_sequence.len(), 2);
        assert_eq!(s.immediate_next_title, "manager");
        assert_eq!(s.input_keywords_sequence.as_deref().unwrap().len(), 2);
    }

    #[test]
    fn test_sample_keywords_optional() {
        let json = r#"{
            "input_title_sequence": ["analyst"],
            "immediate_next_title": "engineer"
        }"#;
        let s: NtpSample = serde_json::from_str(json).unwrap();
        assert!(s.input_keywords_sequence.is_none());
    }

    #[test]
    fn test_collect_unique_labels_first_seen_order() {
        let dataset = NtpDataset {
            train: vec![sample(&["a", "b"], "c"), sample(&["b"], "a")],
            validation: vec![sample(&["c"], "d")],
            test: vec![],
            all_unique_labels: vec![],
        };
        assert_eq!(dataset.collect_unique_labels(), vec!["a", "b", "c", "d"]);
    }
}
