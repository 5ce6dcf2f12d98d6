//! Label vocabulary: a dense, order-preserving title <-> id mapping.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VocabError {
    #[error("unknown label '{0}'")]
    UnknownLabel(String),
    #[error("vocabulary record is malformed: {0}")]
    Malformed(String),
}

/// Dense label <-> id vocabulary. Ids are assigned in first-seen order and
/// cover `0..len()` without gaps. Serializes as two parallel arrays so the
/// on-disk form is stable and diffable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "VocabRecord", try_from = "VocabRecord")]
pub struct LabelVocab {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VocabRecord {
    ids: Vec<usize>,
    labels: Vec<String>,
}

impl LabelVocab {
    /// Build a vocabulary from labels, deduplicating while preserving
    /// first-seen order.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = LabelVocab {
            labels: Vec::new(),
            index: HashMap::new(),
        };
        for label in labels {
            let label = label.into();
            if !vocab.index.contains_key(&label) {
                vocab.index.insert(label.clone(), vocab.labels.len());
                vocab.labels.push(label);
            }
        }
        vocab
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Id of a label. Unknown labels are a hard error: they indicate a
    /// vocabulary/dataset mismatch, not a recoverable condition.
    pub fn id(&self, label: &str) -> Result<usize, VocabError> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| VocabError::UnknownLabel(label.to_string()))
    }

    pub fn label(&self, id: usize) -> Option<&str> {
        self.labels.get(id).map(|s| s.as_str())
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl From<LabelVocab> for VocabRecord {
    fn from(vocab: LabelVocab) -> Self {
        VocabRecord {
            ids: (0..vocab.labels.len()).collect(),
            labels: vocab.labels,
        }
    }
}

impl TryFrom<VocabRecord> for LabelVocab {
    type Error = VocabError;

    fn try_from(record: VocabRecord) -> Result<Self, Self::Error> {
        if record.ids.len() != record.labels.len() {
            return Err(VocabError::Malformed(format!(
                "{} ids but {} labels",
                record.ids.len(),
                record.labels.len()
            )));
        }
        for (pos, id) in record.ids.iter().enumerate() {
            if *id != pos {
                return Err(VocabError::Malformed(format!(
                    "ids must be dense and ordered, found {id} at position {pos}"
                )));
            }
        }
        let mut index = HashMap::with_capacity(record.labels.len());
        for (id, label) in record.labels.iter().enumerate() {
            if index.insert(label.clone(), id).is_some() {
                return Err(VocabError::Malformed(format!("duplicate label '{label}'")));
            }
        }
        Ok(LabelVocab {
            labels: record.labels,
            index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_labels_dedups_preserving_order() {
        let vocab = LabelVocab::from_labels(["engineer", "analyst", "engineer", "manager"]);
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.id("engineer").unwrap(), 0);
        assert_eq!(vocab.id("analyst").unwrap(), 1);
        assert_eq!(vocab.id("manager").unwrap(), 2);
        assert_eq!(vocab.label(1), Some("analyst"));
    }

    #[test]
    fn test_unknown_label_is_error() {
        let vocab = LabelVocab::from_labels(["engineer"]);
        assert_eq!(
            vocab.id("cto"),
            Err(VocabError::UnknownLabel("cto".to_string()))
        );
    }

    #[test]
    fn test_serde_round_trip() {
        let vocab = LabelVocab::from_labels(["a", "b", "c"]);
        let json = serde_json::to_string(&vocab).unwrap();
        assert!(json.contains("\"ids\":[0,1,2]"));
        let back: LabelVocab = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vocab);
    }

    #[test]
    fn test_malformed_record_rejected() {
        let json = r#"{"ids":[0,2],"labels":["a","b"]}"#;
        assert!(serde_json::from_str::<LabelVocab>(json).is_err());
        let json = r#"{"ids":[0,1],"labels":["a","a"]}"#;
        assert!(serde_json::from_str::<LabelVocab>(json).is_err());
        let json = r#"{"ids":[0],"labels":["a","b"]}"#;
        assert!(serde_json::from_str::<LabelVocab>(json).is_err());
    }
}
