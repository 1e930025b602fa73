//! Fit results and decision functions

use crate::core::{Dataset, Matrix, Result, SolverError};
use crate::kernel::KernelSpec;

/// Output of a fit call
///
/// `coef` has one row per binary sub-problem or class. Its width is
/// `n_features` for linear fits and `n_samples` for kernel fits, where
/// column `j` weighs K(·, x_j).
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub coef: Matrix,
    pub intercept: Vec<f64>,
    /// Margin residuals, one row per coefficient row, one column per sample
    pub errors: Matrix,
    /// Coordinates still eligible at the end of the fit, ascending
    pub active_set: Vec<usize>,
    /// Outer passes (CD, Newton) or epochs (SGD)
    pub n_iter: usize,
    /// Largest optimality violation of the last full pass, if measured
    pub violation: Option<f64>,
    pub converged: bool,
    /// Coordinate steps abandoned after a failed line search
    pub stalls: usize,
    /// Regularized objective at the returned coefficients
    pub objective: f64,
}

impl Solution {
    pub fn n_vectors(&self) -> usize {
        self.coef.rows()
    }

    /// Number of nonzero coefficients
    pub fn n_nonzero(&self) -> usize {
        self.coef.count_nonzero()
    }

    /// Columns with at least one nonzero coefficient; in kernel mode these
    /// are the support vectors
    pub fn support_indices(&self) -> Vec<usize> {
        self.coef.nonzero_columns()
    }

    pub fn n_support_vectors(&self) -> usize {
        self.support_indices().len()
    }

    /// Decision values X·Wᵀ + b for a linear fit
    pub fn decision_function<D: Dataset + ?Sized>(&self, ds: &D) -> Result<Matrix> {
        if ds.n_features() != self.coef.cols() {
            return Err(SolverError::DimensionMismatch {
                expected: self.coef.cols(),
                actual: ds.n_features(),
            });
        }
        let mut out = Matrix::zeros(ds.n_samples(), self.n_vectors());
        for i in 0..ds.n_samples() {
            let row = ds.row(i);
            for k in 0..self.n_vectors() {
                out.set(i, k, row.dot_dense(self.coef.row(k)) + self.intercept[k]);
            }
        }
        Ok(out)
    }

    /// Decision values Σ_j W_kj K(x, x_j) + b_k for a kernel fit
    ///
    /// With a precomputed kernel, `test` holds K(test_i, train_j) and `train`
    /// is only used for its sample count.
    pub fn kernel_decision_function<A, B>(
        &self,
        kernel: &KernelSpec,
        test: &A,
        train: &B,
    ) -> Result<Matrix>
    where
        A: Dataset + ?Sized,
        B: Dataset + ?Sized,
    {
        kernel.validate()?;
        if train.n_samples() != self.coef.cols() {
            return Err(SolverError::DimensionMismatch {
                expected: self.coef.cols(),
                actual: train.n_samples(),
            });
        }
        if kernel.is_precomputed() && test.n_features() != train.n_samples() {
            return Err(SolverError::DimensionMismatch {
                expected: train.n_samples(),
                actual: test.n_features(),
            });
        }

        let support = self.support_indices();
        let mut out = Matrix::zeros(test.n_samples(), self.n_vectors());
        for i in 0..test.n_samples() {
            for &j in &support {
                let value = kernel.evaluate(test, i, train, j);
                for k in 0..self.n_vectors() {
                    out.add(i, k, self.coef.get(k, j) * value);
                }
            }
            for k in 0..self.n_vectors() {
                out.add(i, k, self.intercept[k]);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DenseDataset;
    use approx::assert_relative_eq;

    fn solution(coef: Matrix, intercept: Vec<f64>) -> Solution {
        let rows = coef.rows();
        Solution {
            coef,
            intercept,
            errors: Matrix::zeros(rows, 0),
            active_set: Vec::new(),
            n_iter: 1,
            violation: None,
            converged: true,
            stalls: 0,
            objective: 0.0,
        }
    }

    #[test]
    fn test_linear_decision_function() {
        let ds = DenseDataset::from_rows(vec![vec![1.0, 2.0], vec![-1.0, 0.5]])
            .expect("Should build dataset");
        let sol = solution(Matrix::from_rows(vec![vec![0.5, -1.0]]), vec![0.25]);

        let scores = sol.decision_function(&ds).expect("Should score");
        assert_relative_eq!(scores.get(0, 0), 0.5 - 2.0 + 0.25);
        assert_relative_eq!(scores.get(1, 0), -0.5 - 0.5 + 0.25);
        assert_eq!(sol.n_nonzero(), 2);
    }

    #[test]
    fn test_linear_decision_function_width_check() {
        let ds = DenseDataset::from_rows(vec![vec![1.0]]).expect("Should build dataset");
        let sol = solution(Matrix::zeros(1, 3), vec![0.0]);
        assert!(sol.decision_function(&ds).is_err());
    }

    #[test]
    fn test_kernel_decision_function_uses_support_only() {
        let train = DenseDataset::from_rows(vec![vec![1.0], vec![2.0], vec![3.0]])
            .expect("Should build dataset");
        let test = DenseDataset::from_rows(vec![vec![1.0], vec![-1.0]]).expect("Should build");
        let sol = solution(Matrix::from_rows(vec![vec![1.0, 0.0, -0.5]]), vec![0.0]);

        assert_eq!(sol.support_indices(), vec![0, 2]);
        let scores = sol
            .kernel_decision_function(&KernelSpec::Linear, &test, &train)
            .expect("Should score");
        // x * (1*1 - 0.5*3)
        assert_relative_eq!(scores.get(0, 0), -0.5);
        assert_relative_eq!(scores.get(1, 0), 0.5);

        let gram = KernelSpec::Linear
            .cross_matrix(&test, &train)
            .expect("Should build cross kernel");
        let precomputed = sol
            .kernel_decision_function(&KernelSpec::Precomputed, &gram, &train)
            .expect("Should score");
        assert_eq!(precomputed, scores);
    }

    #[test]
    fn test_kernel_decision_function_rejects_invalid_kernel() {
        let train = DenseDataset::from_rows(vec![vec![1.0], vec![2.0]]).expect("Should build");
        let sol = solution(Matrix::from_rows(vec![vec![1.0, -1.0]]), vec![0.0]);

        for kernel in [
            KernelSpec::Rbf { gamma: 0.0 },
            KernelSpec::Rbf { gamma: f64::NAN },
            KernelSpec::Polynomial { gamma: 1.0, coef0: 0.0, degree: 0 },
        ] {
            assert!(matches!(
                sol.kernel_decision_function(&kernel, &train, &train),
                Err(SolverError::Configuration(_))
            ));
        }
    }
}
