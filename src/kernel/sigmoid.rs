//! Sigmoid (Tanh) Kernel Implementation
//!
//! K(x, y) = tanh(γ * <x, y> + r)
//!
//! The kernel is not positive semi-definite for every parameter choice, so
//! solvers treat it as an ordinary similarity and make no convexity claims.

use crate::core::SparseRow;
use crate::kernel::traits::Kernel;

/// Sigmoid (Hyperbolic Tangent) kernel
#[derive(Debug, Clone, Copy)]
pub struct SigmoidKernel {
    /// Scaling parameter for the dot product (must be positive)
    pub gamma: f64,
    /// Bias/offset parameter
    pub coef0: f64,
}

impl SigmoidKernel {
    /// Creates a new Sigmoid kernel with specified parameters
    ///
    /// # Panics
    /// Panics if gamma is not positive
    pub fn new(gamma: f64, coef0: f64) -> Self {
        if gamma <= 0.0 {
            panic!("Gamma must be positive, got: {}", gamma);
        }
        Self { gamma, coef0 }
    }
}

impl Kernel for SigmoidKernel {
    fn compute(&self, x: SparseRow<'_>, y: SparseRow<'_>) -> f64 {
        (self.gamma * x.dot(&y) + self.coef0).tanh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SparseVector;
    use approx::assert_relative_eq;

    #[test]
    fn test_sigmoid_kernel_bounded() {
        let kernel = SigmoidKernel::new(10.0, 1.0);
        let x = SparseVector::new(vec![0], vec![100.0]);
        let value = kernel.compute(x.as_row(), x.as_row());
        assert!(value <= 1.0 && value > 0.99);
    }

    #[test]
    fn test_sigmoid_kernel_value() {
        let kernel = SigmoidKernel::new(0.5, -1.0);
        let x = SparseVector::new(vec![0, 1], vec![1.0, 1.0]);
        let y = SparseVector::new(vec![1], vec![4.0]);
        assert_relative_eq!(kernel.compute(x.as_row(), y.as_row()), 1.0f64.tanh());
    }

    #[test]
    #[should_panic(expected = "Gamma must be positive")]
    fn test_sigmoid_kernel_invalid_gamma() {
        SigmoidKernel::new(-1.0, 0.0);
    }
}
