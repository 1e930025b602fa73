//! Multiclass losses in the joint ("natural") formulation
//!
//! The true-class score is compared against every other class score at
//! once. Coordinate descent keeps the residuals
//! `errors[k] = 1 - (s_y - s_k)` current instead of the scores, so each loss
//! also has an errors-based form. `errors[y]` is always 1 and is ignored
//! where a loss sums over competing classes only.

use crate::core::{Penalty, Result, SolverError};
use crate::loss::Loss;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MulticlassLoss {
    /// Multinomial logistic: ln Σ_k exp(s_k - s_y)
    Log,
    /// Crammer–Singer: max(0, 1 - s_y + max_{k≠y} s_k)
    Hinge,
    /// Σ_{k≠y} max(0, 1 - s_y + s_k)²
    SquaredHinge,
}

impl MulticlassLoss {
    /// Joint counterpart of a binary loss
    pub fn from_binary(loss: &Loss) -> Result<Self> {
        match loss {
            Loss::Log => Ok(MulticlassLoss::Log),
            Loss::Hinge { .. } => Ok(MulticlassLoss::Hinge),
            Loss::SquaredHinge { .. } => Ok(MulticlassLoss::SquaredHinge),
            other => Err(SolverError::config(format!(
                "loss '{}' has no multiclass formulation",
                other.name()
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MulticlassLoss::Log => "log",
            MulticlassLoss::Hinge => "hinge",
            MulticlassLoss::SquaredHinge => "squared_hinge",
        }
    }

    /// Whether the group coordinate descent solver can optimize this loss
    pub fn supports_coordinate_descent(&self) -> bool {
        !matches!(self, MulticlassLoss::Hinge)
    }

    /// Loss value for one sample's class scores
    pub fn loss(&self, scores: &[f64], y: usize) -> f64 {
        let sy = scores[y];
        match self {
            MulticlassLoss::Log => log_sum_exp(scores.iter().map(|&s| s - sy)),
            MulticlassLoss::Hinge => match strongest_rival(scores, y) {
                Some(k) => (1.0 - sy + scores[k]).max(0.0),
                None => 0.0,
            },
            MulticlassLoss::SquaredHinge => scores
                .iter()
                .enumerate()
                .filter(|&(k, _)| k != y)
                .map(|(_, &s)| {
                    let m = (1.0 - sy + s).max(0.0);
                    m * m
                })
                .sum(),
        }
    }

    /// Gradient with respect to each class score, written into `out`
    pub fn gradient(&self, scores: &[f64], y: usize, out: &mut [f64]) {
        out.iter_mut().for_each(|g| *g = 0.0);
        let sy = scores[y];
        match self {
            MulticlassLoss::Log => {
                softmax_into(scores.iter().map(|&s| s - sy), out);
                out[y] -= 1.0;
            }
            MulticlassLoss::Hinge => {
                if let Some(k) = strongest_rival(scores, y) {
                    if 1.0 - sy + scores[k] > 0.0 {
                        out[k] = 1.0;
                        out[y] = -1.0;
                    }
                }
            }
            MulticlassLoss::SquaredHinge => {
                for (k, &s) in scores.iter().enumerate() {
                    if k == y {
                        continue;
                    }
                    let m = 1.0 - sy + s;
                    if m > 0.0 {
                        out[k] = 2.0 * m;
                        out[y] -= 2.0 * m;
                    }
                }
            }
        }
    }

    /// Loss value from one sample's residuals
    pub fn loss_from_errors(&self, errors: &[f64], y: usize) -> f64 {
        match self {
            MulticlassLoss::Log => log_sum_exp(errors.iter().map(|&e| e - 1.0)),
            MulticlassLoss::Hinge => errors
                .iter()
                .enumerate()
                .filter(|&(k, _)| k != y)
                .map(|(_, &e)| e.max(0.0))
                .fold(0.0, f64::max),
            MulticlassLoss::SquaredHinge => errors
                .iter()
                .enumerate()
                .filter(|&(k, _)| k != y)
                .map(|(_, &e)| e.max(0.0) * e.max(0.0))
                .sum(),
        }
    }

    /// Score derivatives from one sample's residuals
    ///
    /// `grad[k]` receives ∂L/∂s_k and `curv[k]` the diagonal second
    /// derivative used as the block Newton curvature.
    pub fn derivatives_from_errors(
        &self,
        errors: &[f64],
        y: usize,
        grad: &mut [f64],
        curv: &mut [f64],
    ) {
        grad.iter_mut().for_each(|g| *g = 0.0);
        curv.iter_mut().for_each(|h| *h = 0.0);
        match self {
            MulticlassLoss::Log => {
                softmax_into(errors.iter().map(|&e| e - 1.0), grad);
                for (g, h) in grad.iter().zip(curv.iter_mut()) {
                    *h = g * (1.0 - g);
                }
                grad[y] -= 1.0;
            }
            MulticlassLoss::SquaredHinge => {
                for (k, &e) in errors.iter().enumerate() {
                    if k == y || e <= 0.0 {
                        continue;
                    }
                    grad[k] = 2.0 * e;
                    grad[y] -= 2.0 * e;
                    curv[k] = 2.0;
                    curv[y] += 2.0;
                }
            }
            MulticlassLoss::Hinge => {
                let mut scores: Vec<f64> = errors.iter().map(|&e| e - 1.0).collect();
                scores[y] = 0.0;
                self.gradient(&scores, y, grad);
            }
        }
    }

    /// Loss of the all-zero model on any sample
    pub fn loss_at_zero(&self, n_classes: usize) -> f64 {
        match self {
            MulticlassLoss::Log => (n_classes as f64).ln(),
            MulticlassLoss::Hinge => 1.0,
            MulticlassLoss::SquaredHinge => (n_classes.saturating_sub(1)) as f64,
        }
    }

    /// Bound on the norm of the per-sample gradient over all class rows
    pub fn max_gradient(&self, squared_norms: &[f64]) -> Option<f64> {
        let max_norm = squared_norms.iter().copied().fold(0.0f64, f64::max).sqrt();
        match self {
            MulticlassLoss::Log | MulticlassLoss::Hinge => {
                Some(std::f64::consts::SQRT_2 * max_norm)
            }
            MulticlassLoss::SquaredHinge => None,
        }
    }

    /// Diameter of the region that contains the regularized minimizer
    pub fn max_diameter(&self, n_classes: usize, penalty: Penalty, lambda: f64) -> f64 {
        let r0 = self.loss_at_zero(n_classes);
        match penalty {
            Penalty::L2 => 2.0 * (2.0 * r0 / lambda).sqrt(),
            Penalty::L1 | Penalty::L1L2 => 2.0 * r0 / lambda,
        }
    }
}

impl TryFrom<&Loss> for MulticlassLoss {
    type Error = SolverError;

    fn try_from(loss: &Loss) -> Result<Self> {
        MulticlassLoss::from_binary(loss)
    }
}

/// Highest-scoring class other than `y`; the lowest index wins ties
fn strongest_rival(scores: &[f64], y: usize) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (k, &s) in scores.iter().enumerate() {
        if k == y {
            continue;
        }
        match best {
            Some(b) if scores[b] >= s => {}
            _ => best = Some(k),
        }
    }
    best
}

fn log_sum_exp(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let max = values.clone().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.map(|v| (v - max).exp()).sum::<f64>().ln()
}

fn softmax_into(values: impl Iterator<Item = f64> + Clone, out: &mut [f64]) {
    let max = values.clone().fold(f64::NEG_INFINITY, f64::max);
    let mut total = 0.0;
    for (o, v) in out.iter_mut().zip(values) {
        *o = (v - max).exp();
        total += *o;
    }
    out.iter_mut().for_each(|o| *o /= total);
}
