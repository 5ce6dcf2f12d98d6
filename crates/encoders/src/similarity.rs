//! Cosine similarity over f32 embedding vectors.

/// Cosine similarity between two vectors. Zero-norm inputs score 0.0 so a
/// degenerate embedding never wins an argmax.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Pairwise cosine similarity: rows index `queries`, columns index `keys`.
pub fn cosine_sim_matrix(queries: &[Vec<f32>], keys: &[Vec<f32>]) -> Vec<Vec<f32>> {
    queries
        .iter()
        .map(|q| keys.iter().map(|k| cosine(q, k)).collect())
        .collect()
}

/// Index of the maximum entry in a row, or `None` for an empty row.
pub fn argmax_row(row: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in row.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        assert!((cosine(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
        assert!((cosine(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_norm_scores_zero() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_matrix_shape_and_argmax() {
        let queries = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let keys = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]];
        let sim = cosine_sim_matrix(&queries, &keys);
        assert_eq!(sim.len(), 2);
        assert_eq!(sim[0].len(), 3);
        assert_eq!(argmax_row(&sim[0]), Some(0));
        assert_eq!(argmax_row(&sim[1]), Some(1));
    }

    #[test]
    fn test_argmax_empty_and_ties() {
        assert_eq!(argmax_row(&[]), None);
        // First maximal entry wins.
        assert_eq!(argmax_row(&[0.5, 0.5]), Some(0));
    }
}
