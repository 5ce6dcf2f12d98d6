//! Mapping generated text onto the label set and scoring it.

use encoders::{argmax_row, cosine_sim_matrix};
use ntp_core::LabelVocab;

/// Map each generated candidate onto the closest label by cosine
/// similarity between its embedding and the label embeddings. `None` when
/// the label set is empty.
pub fn map_to_labels(
    candidate_embeddings: &[Vec<f32>],
    label_embeddings: &[Vec<f32>],
    vocab: &LabelVocab,
) -> Vec<Option<String>> {
    let sim = cosine_sim_matrix(candidate_embeddings, label_embeddings);
    sim.iter()
        .map(|row| {
            argmax_row(row).and_then(|i| vocab.label(i).map(|s| s.to_string()))
        })
        .collect()
}

/// Count correct inputs given `k` mapped predictions per input, block-wise:
/// input `i` owns predictions `i*k .. (i+1)*k` and scores one match if any
/// of them equals its truth. A short final block scores over what it has.
pub fn count_matches(predictions: &[Option<String>], truths: &[String], k: usize) -> usize {
    if k == 0 {
        return 0;
    }
    truths
        .iter()
        .enumerate()
        .filter(|(i, truth)| {
            let start = i * k;
            let end = (start + k).min(predictions.len());
            predictions
                .get(start..end)
                .unwrap_or(&[])
                .iter()
                .any(|p| p.as_deref() == Some(truth.as_str()))
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_map_to_labels_picks_nearest() {
        let vocab = LabelVocab::from_labels(["engineer", "nurse"]);
        let labels = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let candidates = vec![vec![0.9, 0.1], vec![0.2, 0.8]];
        let mapped = map_to_labels(&candidates, &labels, &vocab);
        assert_eq!(
            mapped,
            vec![Some("engineer".to_string()), Some("nurse".to_string())]
        );
    }

    #[test]
    fn test_map_to_labels_empty_label_set() {
        let vocab = LabelVocab::from_labels(Vec::<String>::new());
        let mapped = map_to_labels(&[vec![1.0]], &[], &vocab);
        assert_eq!(mapped, vec![None]);
    }

    #[test]
    fn test_count_matches_blockwise() {
        // k = 3 candidates per input, 5 inputs. Inputs 1 and 3 have their
        // truth somewhere in their block; the rest do not.
        let predictions: Vec<Option<String>> = strings(&[
            "x", "y", "z", // input 0: miss
            "a", "b", "q", // input 1: hit "b"
            "c", "c", "c", // input 2: miss
            "d", "e", "f", // input 3: hit "f"
            "g", "h", "i", // input 4: miss
        ])
        .into_iter()
        .map(Some)
        .collect();
        let truths = strings(&["w", "b", "d", "f", "j"]);
        assert_eq!(count_matches(&predictions, &truths, 3), 2);
    }

    #[test]
    fn test_count_matches_short_final_block() {
        let predictions = vec![Some("a".to_string()), Some("b".to_string())];
        let truths = strings(&["a", "b"]);
        // k = 2: input 0 owns both predictions, input 1 owns none.
        assert_eq!(count_matches(&predictions, &truths, 2), 1);
    }

    #[test]
    fn test_count_matches_ignores_unmapped() {
        let predictions = vec![None, Some("a".to_string())];
        let truths = strings(&["a"]);
        assert_eq!(count_matches(&predictions, &truths, 2), 1);
        let truths = strings(&["b"]);
        assert_eq!(count_matches(&predictions, &truths, 2), 0);
    }

    #[test]
    fn test_zero_k() {
        assert_eq!(count_matches(&[], &strings(&["a"]), 0), 0);
    }
}
