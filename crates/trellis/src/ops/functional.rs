//! Engine-owned tensor routines: path drop, edge normalization, the
//! identity/zero bypasses, and the scoring helpers used by edge valuation.
//!
//! Everything here operates on host tensors; anything heavier belongs behind
//! the operation factory.

use anyhow::{ensure, Result};
use rand::{Rng, RngCore};

use crate::tensor::Tensor;

/// Shape-preserving bypass used to mute an edge without touching topology.
/// At stride 1 the input passes through untouched; at larger strides it is
/// spatially subsampled so downstream shapes still line up.
pub fn identity_bypass(x: &Tensor, stride: usize) -> Result<Tensor> {
    x.subsample_hw(stride)
}

/// Zero contribution matching the configured stride. The dormant path of an
/// edge whose operations have all been pruned.
pub fn zero_output(x: &Tensor, stride: usize) -> Result<Tensor> {
    Ok(x.subsample_hw(stride)?.zeros_like())
}

/// Drops the whole path per batch sample with probability `drop_prob`,
/// rescaling survivors by the keep probability so expectation stays constant.
pub fn drop_path(x: Tensor, drop_prob: f32, rng: &mut dyn RngCore) -> Result<Tensor> {
    if drop_prob <= 0.0 {
        return Ok(x);
    }
    ensure!(
        (0.0..1.0).contains(&drop_prob),
        "drop probability must be in [0, 1)"
    );
    let keep = 1.0 - drop_prob;
    let n = x.shape().batch();
    let sample_len = x.len() / n.max(1);
    let mut out = x;
    for sample in 0..n {
        let start = sample * sample_len;
        let slice = &mut out.data_mut()[start..start + sample_len];
        if rng.gen_bool(f64::from(drop_prob)) {
            slice.fill(0.0);
        } else {
            for v in slice.iter_mut() {
                *v /= keep;
            }
        }
    }
    Ok(out)
}

/// Normalization stage applied after summing an edge's candidate outputs.
/// Standardizes each channel over every other axis.
#[derive(Debug, Clone)]
pub struct ChannelNorm {
    channels: usize,
    eps: f32,
}

impl ChannelNorm {
    pub fn new(channels: usize) -> Self {
        ChannelNorm {
            channels,
            eps: 1e-5,
        }
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let dims = x.shape().dims();
        ensure!(
            dims.len() >= 2 && dims[1] == self.channels,
            "norm expects channel axis of {} channels, got shape {:?}",
            self.channels,
            dims
        );
        let n = dims[0];
        let c = dims[1];
        let inner: usize = dims[2..].iter().product::<usize>().max(1);
        let per_channel = (n * inner) as f32;

        let mut means = vec![0.0f32; c];
        let mut vars = vec![0.0f32; c];
        for ni in 0..n {
            for ci in 0..c {
                let base = (ni * c + ci) * inner;
                for v in &x.data()[base..base + inner] {
                    means[ci] += v;
                }
            }
        }
        for m in means.iter_mut() {
            *m /= per_channel;
        }
        for ni in 0..n {
            for ci in 0..c {
                let base = (ni * c + ci) * inner;
                for v in &x.data()[base..base + inner] {
                    let d = v - means[ci];
                    vars[ci] += d * d;
                }
            }
        }
        for v in vars.iter_mut() {
            *v /= per_channel;
        }

        let mut out = x.clone();
        for ni in 0..n {
            for ci in 0..c {
                let base = (ni * c + ci) * inner;
                let inv = (vars[ci] + self.eps).sqrt().recip();
                for v in &mut out.data_mut()[base..base + inner] {
                    *v = (*v - means[ci]) * inv;
                }
            }
        }
        Ok(out)
    }
}

/// Top-1 correctness per example for `[n, classes]` logits.
pub fn top1_correct(logits: &Tensor, targets: &[usize]) -> Result<Vec<bool>> {
    let dims = logits.shape().dims();
    ensure!(
        dims.len() == 2,
        "top-1 scoring expects [n, classes] logits, got shape {:?}",
        dims
    );
    ensure!(
        dims[0] == targets.len(),
        "logit batch ({}) does not match target count ({})",
        dims[0],
        targets.len()
    );
    let classes = dims[1];
    let mut correct = Vec::with_capacity(targets.len());
    for (row, &target) in targets.iter().enumerate() {
        let scores = &logits.data()[row * classes..(row + 1) * classes];
        let mut best = 0;
        for (i, &s) in scores.iter().enumerate() {
            if s > scores[best] {
                best = i;
            }
        }
        correct.push(best == target);
    }
    Ok(correct)
}

/// Mean of `draws` sample-with-replacement means over a correctness vector.
pub fn bootstrap_mean(values: &[f64], draws: usize, rng: &mut dyn RngCore) -> Result<f64> {
    ensure!(
        !values.is_empty(),
        "bootstrap estimate requires a non-empty sample"
    );
    let n = values.len();
    let mut total = 0.0;
    for _ in 0..draws {
        let mut acc = 0.0;
        for _ in 0..n {
            acc += values[rng.gen_range(0..n)];
        }
        total += acc / n as f64;
    }
    Ok(total / draws as f64)
}
