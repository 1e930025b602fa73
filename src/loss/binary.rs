//! Binary loss functions
//!
//! Every loss is expressed in terms of the prediction `p` and the target
//! `y`. Classification losses expect `y` in {-1, +1} and depend only on the
//! margin `z = p * y`; regression-style losses (squared, Huber,
//! epsilon-insensitive) work on the residual `p - y`.

use crate::core::{Penalty, Result, SolverError};
use serde::{Deserialize, Serialize};

/// Exponent cutoff past which the logistic terms are replaced by their
/// asymptotes
const LOG_CUTOFF: f64 = 18.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Loss {
    /// max(0, t - z)
    Hinge { threshold: f64 },
    /// max(0, t - z)²
    SquaredHinge { threshold: f64 },
    /// ln(1 + e^(-z))
    Log,
    /// Modified Huber scaled by 1/4: (1 - z)²/4 on (-1, 1), -z below -1
    SparseLog,
    /// (1 - z)² on [-1, 1), -4z below -1, 0 above
    ModifiedHuber,
    /// ½(p - y)²
    Squared,
    /// ½r² for |r| <= ε, ε|r| - ½ε² otherwise
    Huber { epsilon: f64 },
    /// max(0, |p - y| - ε)
    EpsilonInsensitive { epsilon: f64 },
}

impl Loss {
    /// Resolve a loss by name
    ///
    /// `epsilon` is used by `huber` and `epsilon_insensitive` only.
    pub fn from_name(name: &str, epsilon: f64) -> Result<Self> {
        let loss = match name.to_ascii_lowercase().as_str() {
            "hinge" => Loss::Hinge { threshold: 1.0 },
            "perceptron" => Loss::Hinge { threshold: 0.0 },
            "squared_hinge" | "squared-hinge" => Loss::SquaredHinge { threshold: 1.0 },
            "log" | "logistic" => Loss::Log,
            "sparse_log" | "sparse-log" => Loss::SparseLog,
            "modified_huber" | "modified-huber" => Loss::ModifiedHuber,
            "squared" | "squared_loss" | "squared-loss" => Loss::Squared,
            "huber" => Loss::Huber { epsilon },
            "epsilon_insensitive" | "epsilon-insensitive" => Loss::EpsilonInsensitive { epsilon },
            other => return Err(SolverError::config(format!("unknown loss '{}'", other))),
        };
        loss.validate()?;
        Ok(loss)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Loss::Hinge { threshold } if *threshold == 0.0 => "perceptron",
            Loss::Hinge { .. } => "hinge",
            Loss::SquaredHinge { .. } => "squared_hinge",
            Loss::Log => "log",
            Loss::SparseLog => "sparse_log",
            Loss::ModifiedHuber => "modified_huber",
            Loss::Squared => "squared",
            Loss::Huber { .. } => "huber",
            Loss::EpsilonInsensitive { .. } => "epsilon_insensitive",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Loss::Hinge { threshold } | Loss::SquaredHinge { threshold } => {
                if !threshold.is_finite() {
                    return Err(SolverError::config("hinge threshold must be finite"));
                }
            }
            Loss::Huber { epsilon } if !(epsilon > 0.0 && epsilon.is_finite()) => {
                return Err(SolverError::config(format!(
                    "huber epsilon must be positive, got {}",
                    epsilon
                )));
            }
            Loss::EpsilonInsensitive { epsilon } if !(epsilon >= 0.0 && epsilon.is_finite()) => {
                return Err(SolverError::config(format!(
                    "epsilon-insensitive epsilon must be non-negative, got {}",
                    epsilon
                )));
            }
            _ => {}
        }
        Ok(())
    }

    /// Loss value
    pub fn loss(&self, p: f64, y: f64) -> f64 {
        let z = p * y;
        match *self {
            Loss::Hinge { threshold } => (threshold - z).max(0.0),
            Loss::SquaredHinge { threshold } => {
                let m = (threshold - z).max(0.0);
                m * m
            }
            Loss::Log => {
                if z > LOG_CUTOFF {
                    (-z).exp()
                } else if z < -LOG_CUTOFF {
                    -z
                } else {
                    (-z).exp().ln_1p()
                }
            }
            Loss::SparseLog => {
                if z >= 1.0 {
                    0.0
                } else if z > -1.0 {
                    (1.0 - z) * (1.0 - z) / 4.0
                } else {
                    -z
                }
            }
            Loss::ModifiedHuber => {
                if z >= 1.0 {
                    0.0
                } else if z >= -1.0 {
                    (1.0 - z) * (1.0 - z)
                } else {
                    -4.0 * z
                }
            }
            Loss::Squared => 0.5 * (p - y) * (p - y),
            Loss::Huber { epsilon } => {
                let r = (p - y).abs();
                if r <= epsilon {
                    0.5 * r * r
                } else {
                    epsilon * r - 0.5 * epsilon * epsilon
                }
            }
            Loss::EpsilonInsensitive { epsilon } => ((p - y).abs() - epsilon).max(0.0),
        }
    }

    /// Derivative of the loss with respect to the prediction
    ///
    /// For the non-smooth losses this is a subgradient. Hinge takes -y at the
    /// kink itself, so the perceptron (threshold 0) moves off the zero
    /// predictor.
    pub fn gradient(&self, p: f64, y: f64) -> f64 {
        let z = p * y;
        match *self {
            Loss::Hinge { threshold } => {
                if z <= threshold {
                    -y
                } else {
                    0.0
                }
            }
            Loss::SquaredHinge { threshold } => {
                let m = threshold - z;
                if m > 0.0 {
                    -2.0 * y * m
                } else {
                    0.0
                }
            }
            Loss::Log => {
                if z > LOG_CUTOFF {
                    -y * (-z).exp()
                } else if z < -LOG_CUTOFF {
                    -y
                } else {
                    -y / (1.0 + z.exp())
                }
            }
            Loss::SparseLog => {
                if z >= 1.0 {
                    0.0
                } else if z > -1.0 {
                    -y * (1.0 - z) / 2.0
                } else {
                    -y
                }
            }
            Loss::ModifiedHuber => {
                if z >= 1.0 {
                    0.0
                } else if z >= -1.0 {
                    -2.0 * y * (1.0 - z)
                } else {
                    -4.0 * y
                }
            }
            Loss::Squared => p - y,
            Loss::Huber { epsilon } => {
                let r = p - y;
                if r.abs() <= epsilon {
                    r
                } else {
                    epsilon * r.signum()
                }
            }
            Loss::EpsilonInsensitive { epsilon } => {
                let r = p - y;
                if r.abs() > epsilon {
                    r.signum()
                } else {
                    0.0
                }
            }
        }
    }

    /// Second derivative with respect to the prediction (generalized where
    /// the first derivative has a kink)
    pub fn second_derivative(&self, p: f64, y: f64) -> f64 {
        let z = p * y;
        match *self {
            Loss::Hinge { .. } | Loss::EpsilonInsensitive { .. } => 0.0,
            Loss::SquaredHinge { threshold } => {
                if z < threshold {
                    2.0
                } else {
                    0.0
                }
            }
            Loss::Log => {
                if z.abs() > LOG_CUTOFF {
                    (-z.abs()).exp()
                } else {
                    let s = 1.0 / (1.0 + (-z).exp());
                    s * (1.0 - s)
                }
            }
            Loss::SparseLog => {
                if z > -1.0 && z < 1.0 {
                    0.5
                } else {
                    0.0
                }
            }
            Loss::ModifiedHuber => {
                if (-1.0..1.0).contains(&z) {
                    2.0
                } else {
                    0.0
                }
            }
            Loss::Squared => 1.0,
            Loss::Huber { epsilon } => {
                if (p - y).abs() <= epsilon {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Whether coordinate descent can optimize this loss (needs a
    /// differentiable loss)
    pub fn supports_coordinate_descent(&self) -> bool {
        !matches!(self, Loss::Hinge { .. } | Loss::EpsilonInsensitive { .. })
    }

    /// Whether the one-dimensional Newton step is exact (quadratic loss)
    pub fn has_exact_newton_step(&self) -> bool {
        matches!(self, Loss::Squared)
    }

    /// Bound on |dL/dp|, `None` when the gradient is unbounded
    pub fn lipschitz(&self) -> Option<f64> {
        match *self {
            Loss::Hinge { .. } | Loss::Log | Loss::SparseLog => Some(1.0),
            Loss::EpsilonInsensitive { .. } => Some(1.0),
            Loss::ModifiedHuber => Some(4.0),
            Loss::Huber { epsilon } => Some(epsilon),
            Loss::SquaredHinge { .. } | Loss::Squared => None,
        }
    }

    /// Largest possible gradient norm over the samples with the given
    /// squared feature norms
    pub fn max_gradient(&self, squared_norms: &[f64]) -> Option<f64> {
        let max_norm = squared_norms.iter().copied().fold(0.0f64, f64::max).sqrt();
        self.lipschitz().map(|l| l * max_norm)
    }

    /// Diameter of the region that contains the regularized minimizer
    ///
    /// With r0 the loss at the zero predictor, the optimum satisfies
    /// λ/2‖w‖² <= r0 for L2 and λ‖w‖₁ <= r0 for L1 penalties.
    pub fn max_diameter(&self, penalty: Penalty, lambda: f64) -> f64 {
        let r0 = self.loss(0.0, 1.0);
        match penalty {
            Penalty::L2 => 2.0 * (2.0 * r0 / lambda).sqrt(),
            Penalty::L1 | Penalty::L1L2 => 2.0 * r0 / lambda,
        }
    }
}
