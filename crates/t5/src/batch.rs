//! Batch assembly: padding, label masking, decoder input shifting.

use candle_core::{Device, Tensor};

/// Label positions with this value are excluded from the loss.
pub const IGNORE_INDEX: i64 = -100;

/// Per-sample intermediate: tokenized prompt and target plus the raw truth
/// for evaluation bookkeeping.
#[derive(Debug, Clone)]
pub struct T5Encoded {
    pub input_ids: Vec<u32>,
    pub labels: Vec<u32>,
    pub next_title: String,
}

/// Collated batch. `labels` carries [`IGNORE_INDEX`] at padding positions;
/// `decoder_input_ids` is the shifted-right form the decoder consumes;
/// `attention_mask` records each row's unpadded extent, which the model
/// uses to trim rows before encoding.
pub struct T5Batch {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub labels: Tensor,
    pub decoder_input_ids: Tensor,
    pub truths: Vec<String>,
}

/// Pad rows to the longest row in the batch; second vec is the 1/0
/// attention mask.
pub fn pad_to_batch_max(rows: &[Vec<u32>], pad: u32) -> (Vec<Vec<u32>>, Vec<Vec<u32>>) {
    let max_len = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    let mut padded = Vec::with_capacity(rows.len());
    let mut masks = Vec::with_capacity(rows.len());
    for row in rows {
        let mut p = row.clone();
        let mut m = vec![1u32; row.len()];
        p.resize(max_len, pad);
        m.resize(max_len, 0);
        padded.push(p);
        masks.push(m);
    }
    (padded, masks)
}

/// Pad target rows with [`IGNORE_INDEX`] so loss skips padding.
pub fn labels_with_ignore(rows: &[Vec<u32>]) -> Vec<Vec<i64>> {
    let max_len = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    rows.iter()
        .map(|row| {
            let mut p: Vec<i64> = row.iter().map(|&t| t as i64).collect();
            p.resize(max_len, IGNORE_INDEX);
            p
        })
        .collect()
}

/// Decoder inputs: start token followed by the labels shifted one right,
/// with ignored positions mapped back to the pad token.
pub fn shift_right(labels_row: &[i64], decoder_start: u32, pad: u32) -> Vec<u32> {
    let mut out = Vec::with_capacity(labels_row.len());
    out.push(decoder_start);
    for &label in &labels_row[..labels_row.len().saturating_sub(1)] {
        out.push(if label == IGNORE_INDEX { pad } else { label as u32 });
    }
    out
}

/// Assemble tensors for one batch.
pub fn build_batch(
    encoded: Vec<T5Encoded>,
    pad: u32,
    decoder_start: u32,
    device: &Device,
) -> anyhow::Result<T5Batch> {
    anyhow::ensure!(!encoded.is_empty(), "empty batch");
    let batch = encoded.len();

    let inputs: Vec<Vec<u32>> = encoded.iter().map(|e| e.input_ids.clone()).collect();
    let targets: Vec<Vec<u32>> = encoded.iter().map(|e| e.labels.clone()).collect();
    let truths: Vec<String> = encoded.into_iter().map(|e| e.next_title).collect();

    let (input_rows, mask_rows) = pad_to_batch_max(&inputs, pad);
    let label_rows = labels_with_ignore(&targets);
    let decoder_rows: Vec<Vec<u32>> = label_rows
        .iter()
        .map(|row| shift_right(row, decoder_start, pad))
        .collect();

    let seq = input_rows.first().map(|r| r.len()).unwrap_or(0);
    let tgt = label_rows.first().map(|r| r.len()).unwrap_or(0);
    anyhow::ensure!(seq > 0 && tgt > 0, "batch with empty sequences");

    Ok(T5Batch {
        input_ids: rows_to_tensor_u32(input_rows, batch, seq, device)?,
        attention_mask: rows_to_tensor_u32(mask_rows, batch, seq, device)?,
        labels: Tensor::from_vec(
            label_rows.into_iter().flatten().collect::<Vec<i64>>(),
            (batch, tgt),
            device,
        )?,
        decoder_input_ids: rows_to_tensor_u32(decoder_rows, batch, tgt, device)?,
        truths,
    })
}

fn rows_to_tensor_u32(
    rows: Vec<Vec<u32>>,
    batch: usize,
    seq: usize,
    device: &Device,
) -> anyhow::Result<Tensor> {
    Ok(Tensor::from_vec(
        rows.into_iter().flatten().collect::<Vec<u32>>(),
        (batch, seq),
        device,
    )?)
}
