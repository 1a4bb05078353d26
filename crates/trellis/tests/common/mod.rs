//! Deterministic stub collaborators for exercising the engine.
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{ensure, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;

use trellis::config::MutationMetric;
use trellis::net::{AttributionBackend, GrowthMetric, Network, ProbeBatch, SizeProbe};
use trellis::ops::{AuxHead, BuiltOp, Catalog, EdgeDim, GrowthSample, OpFactory, PruneGate, TensorOp};
use trellis::{Hypers, OpKind, Shape, SortDir, Tensor};

/// Stride-aware scale op: subsample spatially, multiply by a per-kind gain.
struct StubOp {
    gain: f32,
    stride: usize,
    growth: f64,
}

impl TensorOp for StubOp {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        Ok(x.subsample_hw(self.stride)?.scale(self.gain))
    }

    fn growth_sample(&self) -> GrowthSample {
        GrowthSample {
            weight: Some(self.growth),
            grad: Some(self.growth),
        }
    }
}

struct ZeroOp {
    stride: usize,
}

impl TensorOp for ZeroOp {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        Ok(x.subsample_hw(self.stride)?.zeros_like())
    }
}

/// Gate that never removes its operation.
struct NeverGate;

impl PruneGate for NeverGate {
    fn deadhead(&mut self, _interval: usize) -> bool {
        false
    }
}

/// Gate that removes its operation on the first sweep.
struct KillGate {
    fired: bool,
}

impl PruneGate for KillGate {
    fn deadhead(&mut self, _interval: usize) -> bool {
        if self.fired {
            false
        } else {
            self.fired = true;
            true
        }
    }
}

/// Projects `[n, ci, h, w]` onto `out_channels` by averaging input channels.
struct ChannelProject {
    out_channels: usize,
}

impl TensorOp for ChannelProject {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let dims = x.shape().dims();
        ensure!(dims.len() == 4, "projection expects [n, c, h, w]");
        let (n, ci, h, w) = (dims[0], dims[1], dims[2], dims[3]);
        let plane = h * w;
        let mut out = Tensor::zeros(Shape::new([n, self.out_channels, h, w]));
        for ni in 0..n {
            for p in 0..plane {
                let mut acc = 0.0;
                for c in 0..ci {
                    acc += x.data()[(ni * ci + c) * plane + p];
                }
                let mean = acc / ci as f32;
                for co in 0..self.out_channels {
                    out.data_mut()[(ni * self.out_channels + co) * plane + p] = mean;
                }
            }
        }
        Ok(out)
    }
}

struct Subsample {
    stride: usize,
}

impl TensorOp for Subsample {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        x.subsample_hw(self.stride)
    }
}

/// Head producing `[n, classes]` logits from the per-sample mean activation.
struct StubHead {
    classes: usize,
}

impl AuxHead for StubHead {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let n = x.shape().batch();
        let sample_len = x.len() / n;
        let mut logits = Vec::with_capacity(n * self.classes);
        for s in 0..n {
            let slice = &x.data()[s * sample_len..(s + 1) * sample_len];
            let mean = slice.iter().sum::<f32>() / sample_len as f32;
            for k in 0..self.classes {
                logits.push(mean * (k + 1) as f32);
            }
        }
        Tensor::from_vec(Shape::new([n, self.classes]), logits)
    }
}

/// Factory wiring the stubs together. `kill_gates` makes every gate fire on
/// the first pruning sweep; `kill_kinds` restricts that to specific kinds.
pub struct StubFactory {
    pub op_kib: f64,
    pub op_params: u64,
    pub kill_gates: bool,
    pub kill_kinds: Vec<OpKind>,
}

impl Default for StubFactory {
    fn default() -> Self {
        StubFactory {
            op_kib: 4.0,
            op_params: 100,
            kill_gates: false,
            kill_kinds: Vec::new(),
        }
    }
}

impl StubFactory {
    fn gate(&self, kind: OpKind) -> Box<dyn PruneGate> {
        if self.kill_gates || self.kill_kinds.contains(&kind) {
            Box::new(KillGate { fired: false })
        } else {
            Box::new(NeverGate)
        }
    }
}

impl OpFactory for StubFactory {
    fn build_op(&self, kind: OpKind, dim: EdgeDim) -> Result<BuiltOp> {
        let op: Box<dyn TensorOp> = match kind {
            OpKind::Zero => Box::new(ZeroOp { stride: dim.stride }),
            _ => Box::new(StubOp {
                gain: match kind {
                    OpKind::Identity => 1.0,
                    OpKind::SepConv3 => 0.5,
                    OpKind::SepConv5 => 0.25,
                    OpKind::DilConv3 => 0.75,
                    OpKind::MaxPool3 => 0.3,
                    OpKind::AvgPool3 => 0.2,
                    OpKind::Zero => unreachable!(),
                },
                stride: dim.stride,
                growth: 0.1,
            }),
        };
        Ok(BuiltOp {
            op,
            gate: self.gate(kind),
            mem_kib: if kind.is_zero() { 0.0 } else { self.op_kib },
            params: if kind.is_zero() { 0 } else { self.op_params },
        })
    }

    fn build_stem(&self, _in_channels: usize, out_channels: usize) -> Result<Box<dyn TensorOp>> {
        Ok(Box::new(ChannelProject { out_channels }))
    }

    fn build_scaler(&self, _in_channels: usize, out_channels: usize) -> Result<Box<dyn TensorOp>> {
        Ok(Box::new(ChannelProject { out_channels }))
    }

    fn build_residual(&self, _channels: usize, stride: usize) -> Result<Box<dyn TensorOp>> {
        Ok(Box::new(Subsample { stride }))
    }

    fn build_head(&self, _channels: usize, classes: usize) -> Result<Box<dyn AuxHead>> {
        Ok(Box::new(StubHead { classes }))
    }
}

/// Fixed-answer size probe.
pub struct StubProbe {
    pub size_kib: f64,
    pub overfill: bool,
}

impl SizeProbe for StubProbe {
    fn measure(&mut self, _net: &Network) -> Result<(f64, bool)> {
        Ok((self.size_kib, self.overfill))
    }
}

/// Scores the baseline and evaluation rows through the engine's scoring
/// function and spreads the gap evenly over every edge.
pub struct DiffAttribution;

impl AttributionBackend for DiffAttribution {
    fn attribute(
        &self,
        score: &mut dyn FnMut(&[Vec<f64>]) -> Result<Vec<f64>>,
        baseline: &[f64],
        evaluation: &[f64],
        _samples: usize,
    ) -> Result<Vec<f64>> {
        let scores = score(&[baseline.to_vec(), evaluation.to_vec()])?;
        let delta = scores[1] - scores[0];
        Ok(vec![delta / baseline.len() as f64; baseline.len()])
    }
}

/// Hands back a fixed attribution vector without consulting the scorer.
pub struct FixedAttribution(pub Vec<f64>);

impl AttributionBackend for FixedAttribution {
    fn attribute(
        &self,
        _score: &mut dyn FnMut(&[Vec<f64>]) -> Result<Vec<f64>>,
        _baseline: &[f64],
        _evaluation: &[f64],
        _samples: usize,
    ) -> Result<Vec<f64>> {
        Ok(self.0.clone())
    }
}

pub fn rng() -> StdRng {
    StdRng::seed_from_u64(7)
}

pub fn catalog() -> Catalog {
    Catalog::common(Arc::new(StubFactory::default()))
}

pub fn killer_catalog() -> Catalog {
    Catalog::common(Arc::new(StubFactory {
        kill_gates: true,
        ..StubFactory::default()
    }))
}

pub fn selective_killer_catalog(kill_kinds: Vec<OpKind>) -> Catalog {
    Catalog::common(Arc::new(StubFactory {
        kill_kinds,
        ..StubFactory::default()
    }))
}

pub fn hypers(chains: usize, reductions: usize, metric: GrowthMetric, sort_dir: SortDir) -> Hypers {
    Hypers {
        input_dim: [2, 3, 8, 8],
        classes: 4,
        reductions,
        scale: 4,
        chains,
        drop_prob: 0.0,
        memory_budget_kib: 1e9,
        mutation: MutationMetric { metric, sort_dir },
        device: "cpu".to_string(),
        prune: true,
    }
}

pub fn network(chains: usize, reductions: usize) -> Network {
    Network::new(
        hypers(chains, reductions, GrowthMetric::AbsMeanGrad, SortDir::Max),
        catalog(),
    )
    .expect("network construction")
}

pub fn probe_batches() -> Vec<ProbeBatch> {
    let mut r = rng();
    vec![ProbeBatch {
        inputs: Tensor::randn(Shape::new([2, 3, 8, 8]), 1.0, &mut r),
        targets: vec![0, 3],
    }]
}
