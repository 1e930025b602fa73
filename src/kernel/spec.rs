//! Kernel specification: name + parameters resolved to a kernel function
//!
//! `KernelSpec` is the value solvers and model files carry around. The
//! `Precomputed` variant reads kernel values straight out of a dataset whose
//! entry `(i, j)` already holds K(x_i, x_j).

use crate::core::{Dataset, Result, SolverError, SparseRow};
use crate::data::DenseDataset;
use crate::kernel::{Kernel, LinearKernel, PolynomialKernel, RBFKernel, SigmoidKernel};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KernelSpec {
    #[default]
    Linear,
    Polynomial { gamma: f64, coef0: f64, degree: u32 },
    Rbf { gamma: f64 },
    Sigmoid { gamma: f64, coef0: f64 },
    Precomputed,
}

impl KernelSpec {
    /// Resolve a kernel name and its parameters
    ///
    /// Parameters a kernel does not use are ignored.
    pub fn from_name(name: &str, gamma: f64, coef0: f64, degree: u32) -> Result<Self> {
        let spec = match name.to_ascii_lowercase().as_str() {
            "linear" => KernelSpec::Linear,
            "poly" | "polynomial" => KernelSpec::Polynomial {
                gamma,
                coef0,
                degree,
            },
            "rbf" | "gaussian" => KernelSpec::Rbf { gamma },
            "sigmoid" | "tanh" => KernelSpec::Sigmoid { gamma, coef0 },
            "precomputed" => KernelSpec::Precomputed,
            other => {
                return Err(SolverError::config(format!("unknown kernel '{}'", other)));
            }
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn name(&self) -> &'static str {
        match self {
            KernelSpec::Linear => "linear",
            KernelSpec::Polynomial { .. } => "poly",
            KernelSpec::Rbf { .. } => "rbf",
            KernelSpec::Sigmoid { .. } => "sigmoid",
            KernelSpec::Precomputed => "precomputed",
        }
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        let gamma = match *self {
            KernelSpec::Polynomial { gamma, degree, .. } => {
                if degree == 0 {
                    return Err(SolverError::config("polynomial degree must be positive"));
                }
                Some(gamma)
            }
            KernelSpec::Rbf { gamma } | KernelSpec::Sigmoid { gamma, .. } => Some(gamma),
            KernelSpec::Linear | KernelSpec::Precomputed => None,
        };

        match gamma {
            Some(g) if !(g.is_finite() && g > 0.0) => Err(SolverError::config(format!(
                "kernel gamma must be positive and finite, got {}",
                g
            ))),
            _ => Ok(()),
        }
    }

    pub fn is_precomputed(&self) -> bool {
        matches!(self, KernelSpec::Precomputed)
    }

    /// Kernel value between two feature vectors
    ///
    /// Returns `None` for `Precomputed`, which has no feature vectors.
    pub fn compute_rows(&self, x: SparseRow<'_>, y: SparseRow<'_>) -> Option<f64> {
        match *self {
            KernelSpec::Linear => Some(LinearKernel.compute(x, y)),
            KernelSpec::Polynomial {
                gamma,
                coef0,
                degree,
            } => Some(PolynomialKernel::new(degree, gamma, coef0).compute(x, y)),
            KernelSpec::Rbf { gamma } => Some(RBFKernel::new(gamma).compute(x, y)),
            KernelSpec::Sigmoid { gamma, coef0 } => {
                Some(SigmoidKernel::new(gamma, coef0).compute(x, y))
            }
            KernelSpec::Precomputed => None,
        }
    }

    /// K(a_i, b_j)
    ///
    /// With `Precomputed`, `a` must hold kernel values: entry `(i, j)` of `a`
    /// is returned and `b` is not consulted.
    pub fn evaluate<A, B>(&self, a: &A, i: usize, b: &B, j: usize) -> f64
    where
        A: Dataset + ?Sized,
        B: Dataset + ?Sized,
    {
        if self.is_precomputed() {
            return a.value(i, j);
        }
        self.compute_rows(a.row(i), b.row(j)).unwrap_or_default()
    }

    /// Full n_samples x n_samples Gram matrix of a dataset
    pub fn gram_matrix<D: Dataset + ?Sized>(&self, ds: &D) -> Result<DenseDataset> {
        self.cross_matrix(ds, ds)
    }

    /// Kernel values between every sample of `a` and every sample of `b`
    pub fn cross_matrix<A, B>(&self, a: &A, b: &B) -> Result<DenseDataset>
    where
        A: Dataset + ?Sized,
        B: Dataset + ?Sized,
    {
        let (n, m) = (a.n_samples(), b.n_samples());
        let mut data = Vec::with_capacity(n * m);
        for i in 0..n {
            for j in 0..m {
                data.push(self.evaluate(a, i, b, j));
            }
        }
        DenseDataset::new(n, m, data)
    }
}
