//! Aggregated growth statistics used as mutation-selection signals.

use serde::{Deserialize, Serialize};

use crate::graph::{CellId, EdgeKey};

/// One growth statistic an edge can be ranked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthMetric {
    MeanWeight,
    MeanGrad,
    StdWeight,
    StdGrad,
    AbsMeanWeight,
    AbsMeanGrad,
    AbsStdWeight,
    AbsStdGrad,
    Shap,
}

/// Fixed-key snapshot of an edge's accumulated growth samples plus its last
/// SHAP attribution. All-null when no samples exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GrowthRecord {
    pub mean_weight: Option<f64>,
    pub mean_grad: Option<f64>,
    pub std_weight: Option<f64>,
    pub std_grad: Option<f64>,
    pub abs_mean_weight: Option<f64>,
    pub abs_mean_grad: Option<f64>,
    pub abs_std_weight: Option<f64>,
    pub abs_std_grad: Option<f64>,
    pub shap: Option<f64>,
}

impl GrowthRecord {
    /// Computes the eight statistics from the raw sample buffers. Either
    /// buffer being empty yields the all-null record (the SHAP slot still
    /// carries through).
    pub(crate) fn from_samples(weight: &[f64], grad: &[f64], shap: Option<f64>) -> Self {
        if weight.is_empty() || grad.is_empty() {
            return GrowthRecord {
                shap,
                ..GrowthRecord::default()
            };
        }
        let abs_weight: Vec<f64> = weight.iter().map(|w| w.abs()).collect();
        let abs_grad: Vec<f64> = grad.iter().map(|g| g.abs()).collect();
        GrowthRecord {
            mean_weight: Some(mean(weight)),
            mean_grad: Some(mean(grad)),
            std_weight: Some(std(weight)),
            std_grad: Some(std(grad)),
            abs_mean_weight: Some(mean(&abs_weight)),
            abs_mean_grad: Some(mean(&abs_grad)),
            abs_std_weight: Some(std(&abs_weight)),
            abs_std_grad: Some(std(&abs_grad)),
            shap,
        }
    }

    /// Looks up one statistic by metric name.
    pub fn metric(&self, metric: GrowthMetric) -> Option<f64> {
        match metric {
            GrowthMetric::MeanWeight => self.mean_weight,
            GrowthMetric::MeanGrad => self.mean_grad,
            GrowthMetric::StdWeight => self.std_weight,
            GrowthMetric::StdGrad => self.std_grad,
            GrowthMetric::AbsMeanWeight => self.abs_mean_weight,
            GrowthMetric::AbsMeanGrad => self.abs_mean_grad,
            GrowthMetric::AbsStdWeight => self.abs_std_weight,
            GrowthMetric::AbsStdGrad => self.abs_std_grad,
            GrowthMetric::Shap => self.shap,
        }
    }

    /// True when no statistics are populated (SHAP aside).
    pub fn is_null(&self) -> bool {
        self.mean_weight.is_none() && self.mean_grad.is_none()
    }
}

/// Per-edge growth snapshot in deterministic chain-then-cell-then-key order.
pub type GrowthSnapshot = Vec<((CellId, EdgeKey), GrowthRecord)>;

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population standard deviation.
fn std(xs: &[f64]) -> f64 {
    let m = mean(xs);
    (xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / xs.len() as f64).sqrt()
}
