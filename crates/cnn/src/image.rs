//! Co-occurrence image construction from title histories.
//!
//! Row `i` of the image holds the running count of every vocabulary label
//! among the first `i + 1` titles of the history; rows past the end of the
//! history stay zero, and the whole image is scaled by its maximum count.

use burn::prelude::*;
use burn::tensor::TensorData;

use ntp_core::{LabelVocab, VocabError};

/// Build one `max_seq_len x vocab.len()` image, row-major. Histories longer
/// than `max_seq_len` keep only their most recent titles.
pub fn build_image(
    titles: &[String],
    vocab: &LabelVocab,
    max_seq_len: usize,
) -> Result<Vec<f32>, VocabError> {
    let width = vocab.len();
    let mut image = vec![0.0f32; max_seq_len * width];
    let start = titles.len().saturating_sub(max_seq_len);
    let window = &titles[start..];

    let mut counts = vec![0.0f32; width];
    for (row, title) in window.iter().enumerate() {
        counts[vocab.id(title)?] += 1.0;
        image[row * width..(row + 1) * width].copy_from_slice(&counts);
    }
    normalize_max(&mut image);
    Ok(image)
}

/// Scale so the largest entry becomes 1.0. All-zero input stays untouched.
pub fn normalize_max(values: &mut [f32]) {
    let max = values.iter().cloned().fold(0.0f32, f32::max);
    if max > 0.0 {
        for v in values.iter_mut() {
            *v /= max;
        }
    }
}

/// Stack flat images into a `(batch, 1, h, w)` tensor.
pub fn images_to_tensor<B: Backend>(
    images: &[Vec<f32>],
    h: usize,
    w: usize,
    device: &B::Device,
) -> Tensor<B, 4> {
    let batch = images.len();
    assert!(batch > 0, "empty image batch");
    let mut flat = Vec::with_capacity(batch * h * w);
    for image in images {
        assert_eq!(image.len(), h * w, "image size mismatch");
        flat.extend_from_slice(image);
    }
    Tensor::from_data(TensorData::new(flat, [batch, 1, h, w]), device)
}
