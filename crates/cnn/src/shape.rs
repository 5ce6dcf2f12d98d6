//! Analytic output-shape derivation for the conv/pool stack.
//!
//! Convolutions use same-padding, so only the pooling layers shrink the
//! spatial dimensions. Deriving the flattened feature size up front lets the
//! classifier head be built before any tensor flows through the network.

use crate::config::{CnnConfigError, CnnEncoderParams};

pub const POOL_KERNEL: usize = 2;
pub const POOL_STRIDE: usize = 2;
pub const POOL_DILATION: usize = 1;

/// Spatial size after one max-pool, 0 when the input is smaller than the
/// pooling window.
pub fn pooled_dim(d: usize) -> usize {
    let window = POOL_DILATION * (POOL_KERNEL - 1) + 1;
    if d < window {
        0
    } else {
        (d - window) / POOL_STRIDE + 1
    }
}

/// Flattened feature size after the whole stack for an `h x w` input.
pub fn flattened_dim(
    params: &CnnEncoderParams,
    mut h: usize,
    mut w: usize,
) -> Result<usize, CnnConfigError> {
    for _ in 0..params.n_stages() {
        h = pooled_dim(h);
        w = pooled_dim(w);
        if h == 0 || w == 0 {
            return Err(CnnConfigError::ImageCollapsed {
                stages: params.n_stages(),
            });
        }
    }
    Ok(h * w * params.last_channels())
}
