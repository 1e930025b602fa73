//! Polynomial Kernel Implementation
//!
//! The polynomial kernel is defined as:
//! K(x, y) = (γ * <x, y> + r)^d
//!
//! Where:
//! - γ (gamma): scaling factor for the dot product
//! - r (coef0): independent term in the polynomial
//! - d (degree): degree of the polynomial

use crate::core::SparseRow;
use crate::kernel::traits::Kernel;

/// Polynomial kernel with configurable degree, gamma, and coefficient
#[derive(Debug, Clone, Copy)]
pub struct PolynomialKernel {
    /// Scaling factor for the dot product
    pub gamma: f64,
    /// Independent term in the polynomial
    pub coef0: f64,
    /// Degree of the polynomial
    pub degree: u32,
}

impl PolynomialKernel {
    /// Creates a new polynomial kernel with the specified parameters
    ///
    /// # Panics
    /// Panics if the degree is zero or gamma is not positive
    pub fn new(degree: u32, gamma: f64, coef0: f64) -> Self {
        assert!(degree > 0, "Polynomial degree must be positive");
        assert!(gamma > 0.0, "Gamma must be positive");

        Self {
            gamma,
            coef0,
            degree,
        }
    }
}

impl Kernel for PolynomialKernel {
    fn compute(&self, x: SparseRow<'_>, y: SparseRow<'_>) -> f64 {
        (self.gamma * x.dot(&y) + self.coef0).powi(self.degree as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SparseVector;
    use approx::assert_relative_eq;

    #[test]
    fn test_polynomial_kernel_values() {
        let kernel = PolynomialKernel::new(2, 0.5, 1.0);
        let x = SparseVector::new(vec![0, 1], vec![1.0, 2.0]);
        let y = SparseVector::new(vec![0, 1], vec![3.0, 1.0]);

        // <x, y> = 5, (0.5 * 5 + 1)^2 = 12.25
        assert_relative_eq!(kernel.compute(x.as_row(), y.as_row()), 12.25);
    }

    #[test]
    fn test_polynomial_kernel_negative_base() {
        // Odd degrees keep the sign of the base
        let kernel = PolynomialKernel::new(3, 1.0, 0.0);
        let x = SparseVector::new(vec![0], vec![1.0]);
        let y = SparseVector::new(vec![0], vec![-2.0]);
        assert_relative_eq!(kernel.compute(x.as_row(), y.as_row()), -8.0);
    }

    #[test]
    #[should_panic(expected = "Polynomial degree must be positive")]
    fn test_polynomial_kernel_zero_degree() {
        PolynomialKernel::new(0, 1.0, 1.0);
    }
}
