use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::net::growth::GrowthMetric;

/// Ranking direction for the mutation-selection metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Min,
    Max,
}

/// Which growth statistic drives edge selection, and in which direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MutationMetric {
    pub metric: GrowthMetric,
    pub sort_dir: SortDir,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypers {
    /// Input activations as `[n, c, h, w]`.
    pub input_dim: [usize; 4],
    pub classes: usize,
    /// Number of reduction steps; each chain carries `reductions + 1` cells.
    pub reductions: usize,
    /// Channel scale of the first chain; chain `c` runs at `scale * 2^c`.
    pub scale: usize,
    pub chains: usize,
    pub drop_prob: f32,
    /// Memory budget for structural growth, in KiB.
    pub memory_budget_kib: f64,
    pub mutation: MutationMetric,
    pub device: String,
    #[serde(default = "default_prune")]
    pub prune: bool,
}

fn default_prune() -> bool {
    true
}

impl Default for Hypers {
    fn default() -> Self {
        Self {
            input_dim: [1, 3, 32, 32],
            classes: 10,
            reductions: 2,
            scale: 16,
            chains: 2,
            drop_prob: 0.3,
            memory_budget_kib: 4_000_000.0,
            mutation: MutationMetric {
                metric: GrowthMetric::AbsMeanGrad,
                sort_dir: SortDir::Max,
            },
            device: "cpu".to_string(),
            prune: true,
        }
    }
}

impl Hypers {
    /// Builds hyperparameters from an opaque JSON value; loading the value
    /// from disk or a launcher stays with the caller.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).context("invalid hyperparameter object")
    }
}
