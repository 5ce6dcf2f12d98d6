//! Cross-entropy over decoder logits with ignored padding positions.

use candle_core::{DType, Tensor, D};

use crate::batch::IGNORE_INDEX;

/// Mean negative log-likelihood of `labels` under `logits`, skipping
/// positions labeled [`IGNORE_INDEX`].
///
/// `logits` is `(batch, seq, vocab)` f32, `labels` is `(batch, seq)` i64.
/// Returns a scalar tensor; all-ignored input yields zero loss.
pub fn masked_cross_entropy(logits: &Tensor, labels: &Tensor) -> anyhow::Result<Tensor> {
    let log_probs = candle_nn::ops::log_softmax(logits, D::Minus1)?;

    let mask = labels.ne(IGNORE_INDEX)?;
    let mask_f = mask.to_dtype(DType::F32)?;

    let valid: f32 = mask_f.sum_all()?.to_scalar()?;
    if valid == 0.0 {
        return Ok(Tensor::zeros((), DType::F32, logits.device())?);
    }

    // Ignored positions index token 0; the mask zeroes them out afterwards.
    let safe_labels = mask.where_cond(labels, &labels.zeros_like()?)?;
    let picked = log_probs
        .gather(&safe_labels.unsqueeze(D::Minus1)?, D::Minus1)?
        .squeeze(D::Minus1)?;

    let total = (picked * mask_f)?.sum_all()?.neg()?;
    Ok((total / valid as f64)?)
}
