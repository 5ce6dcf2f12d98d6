//! Beam-search decoding over an injected scoring function.
//!
//! The model side is a closure from a decoder-token prefix to next-token
//! log-probabilities, so the search itself is pure bookkeeping and testable
//! without any weights.

use std::collections::HashSet;

use ordered_float::OrderedFloat;

#[derive(Debug, Clone)]
pub struct BeamSearchParams {
    pub num_beams: usize,
    pub num_return_sequences: usize,
    pub max_new_tokens: usize,
    /// 0 disables the n-gram repetition ban.
    pub no_repeat_ngram_size: usize,
    /// Stop as soon as `num_return_sequences` beams have finished.
    pub early_stopping: bool,
    pub decoder_start_token_id: u32,
    pub eos_token_id: u32,
}

#[derive(Debug, Clone)]
struct Beam {
    tokens: Vec<u32>,
    score: f32,
    finished: bool,
}

/// Run beam search. `step` maps the current decoder prefix (starting with
/// the decoder start token) to log-probabilities over the vocabulary.
///
/// Returns up to `num_return_sequences` token sequences, best first, with
/// the start and EOS tokens stripped.
pub fn beam_search(
    params: &BeamSearchParams,
    step: &mut dyn FnMut(&[u32]) -> anyhow::Result<Vec<f32>>,
) -> anyhow::Result<Vec<Vec<u32>>> {
    anyhow::ensure!(params.num_beams > 0, "num_beams must be positive");
    anyhow::ensure!(
        params.num_return_sequences <= params.num_beams,
        "cannot return {} sequences from {} beams",
        params.num_return_sequences,
        params.num_beams
    );

    let mut beams = vec![Beam {
        tokens: vec![params.decoder_start_token_id],
        score: 0.0,
        finished: false,
    }];

    for _ in 0..params.max_new_tokens {
        if beams.iter().all(|b| b.finished) {
            break;
        }
        if params.early_stopping
            && beams.iter().filter(|b| b.finished).count() >= params.num_return_sequences
        {
            break;
        }

        let mut candidates: Vec<Beam> = Vec::new();
        for beam in &beams {
            if beam.finished {
                candidates.push(beam.clone());
                continue;
            }
            let log_probs = step(&beam.tokens)?;
            anyhow::ensure!(!log_probs.is_empty(), "scoring function returned no logits");

            let banned = if params.no_repeat_ngram_size > 0 {
                banned_ngram_tokens(&beam.tokens, params.no_repeat_ngram_size)
            } else {
                HashSet::new()
            };

            let mut ranked: Vec<(usize, f32)> = log_probs
                .iter()
                .copied()
                .enumerate()
                .filter(|(token, _)| !banned.contains(&(*token as u32)))
                .collect();
            ranked.sort_by_key(|&(_, lp)| std::cmp::Reverse(OrderedFloat(lp)));

            for &(token, lp) in ranked.iter().take(params.num_beams) {
                let token = token as u32;
                let mut tokens = beam.tokens.clone();
                tokens.push(token);
                candidates.push(Beam {
                    tokens,
                    score: beam.score + lp,
                    finished: token == params.eos_token_id,
                });
            }
        }

        candidates.sort_by_key(|b| std::cmp::Reverse(OrderedFloat(b.score)));
        candidates.truncate(params.num_beams);
        beams = candidates;
    }

    beams.sort_by_key(|b| std::cmp::Reverse(OrderedFloat(b.score)));
    Ok(beams
        .into_iter()
        .take(params.num_return_sequences)
        .map(|beam| {
            beam.tokens
                .into_iter()
                .skip(1)
                .filter(|&t| t != params.eos_token_id)
                .collect()
        })
        .collect())
}

/// Tokens that would complete an `n`-gram already present in `tokens`.
fn banned_ngram_tokens(tokens: &[u32], n: usize) -> HashSet<u32> {
    let mut banned = HashSet::new();
    if n == 0 || tokens.len() < n {
        return banned;
    }
    let prefix = &tokens[tokens.len() + 1 - n..];
    for window in tokens.windows(n) {
        if &window[..n - 1] == prefix {
            banned.insert(window[n - 1]);
        }
    }
    banned
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: u32 = 0;
    const EOS: u32 = 1;

    fn params(num_beams: usize, num_return: usize) -> BeamSearchParams {
        BeamSearchParams {
            num_beams,
            num_return_sequences: num_return,
            max_new_tokens: 10,
            no_repeat_ngram_size: 0,
            early_stopping: true,
            decoder_start_token_id: START,
            eos_token_id: EOS,
        }
    }

    /// Vocabulary {start, eos, 2, 3}. Token 2 is most likely first, then
    /// eos ends every sequence.
    fn fixed_scores(prefix: &[u32]) -> anyhow::Result<Vec<f32>> {
        Ok(if prefix.len() == 1 {
            vec![-10.0, -1.0, -0.5, -2.0]
        } else {
            vec![-10.0, -0.1, -3.0, -3.0]
        })
    }

    #[test]
    fn test_best_sequence_first() {
        let out = beam_search(&params(3, 2), &mut fixed_scores).unwrap();
        assert_eq!(out.len(), 2);
        // "2" then eos scores -0.6; immediate eos scores -1.0.
        assert_eq!(out[0], vec![2]);
        assert_eq!(out[1], Vec::<u32>::new());
    }

    #[test]
    fn test_eos_strip_and_empty_sequence() {
        // eos immediately most likely: the best sequence is empty.
        let mut step = |_: &[u32]| Ok(vec![-10.0f32, -0.1, -5.0, -5.0]);
        let out = beam_search(&params(2, 1), &mut step).unwrap();
        assert_eq!(out[0], Vec::<u32>::new());
    }

    #[test]
    fn test_max_new_tokens_bounds_length() {
        // eos is never likely; generation must stop at the cap.
        let mut step = |_: &[u32]| Ok(vec![-10.0f32, -50.0, -0.1, -0.2]);
        let mut p = params(2, 1);
        p.max_new_tokens = 4;
        let out = beam_search(&p, &mut step).unwrap();
        assert_eq!(out[0].len(), 4);
    }

    #[test]
    fn test_no_repeat_ngram_ban() {
        // Token 2 dominates; with a bigram ban the sequence 2,2 is blocked
        // after the first repetition, forcing a 3 in between.
        let mut step = |_: &[u32]| Ok(vec![-10.0f32, -50.0, -0.1, -0.2]);
        let mut p = params(1, 1);
        p.max_new_tokens = 4;
        p.no_repeat_ngram_size = 2;
        let out = beam_search(&p, &mut step).unwrap();
        // Greedy without the ban would emit 2,2,2,2; with it every bigram
        // appears at most once.
        assert_eq!(out[0], vec![2, 2, 3, 2]);
        let bigrams: Vec<&[u32]> = out[0].windows(2).collect();
        let unique: HashSet<&[u32]> = bigrams.iter().copied().collect();
        assert_eq!(bigrams.len(), unique.len());
    }

    #[test]
    fn test_banned_ngram_tokens() {
        // Sequence 5 6 5: prefix for bigrams is [5], and 5 is followed by 6.
        let banned = banned_ngram_tokens(&[5, 6, 5], 2);
        assert_eq!(banned, [6].into_iter().collect());
        // Too short for trigram banning.
        assert!(banned_ngram_tokens(&[5, 6], 3).is_empty());
    }

    #[test]
    fn test_more_returns_than_beams_rejected() {
        assert!(beam_search(&params(2, 3), &mut fixed_scores).is_err());
    }

    #[test]
    fn test_scores_accumulate_across_steps() {
        // Two-token vocabulary beyond control tokens; make the second step
        // depend on the prefix so beams diverge.
        let mut step = |prefix: &[u32]| {
            Ok(if prefix.len() == 1 {
                vec![-10.0f32, -50.0, -0.7, -0.7]
            } else if prefix[1] == 2 {
                vec![-10.0f32, -0.1, -5.0, -5.0]
            } else {
                vec![-10.0f32, -3.0, -5.0, -5.0]
            })
        };
        let out = beam_search(&params(2, 2), &mut step).unwrap();
        // The beam that started with 2 reaches eos cheaply and wins.
        assert_eq!(out[0], vec![2]);
        assert_eq!(out[1], vec![3]);
    }
}
