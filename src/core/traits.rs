//! Core traits shared by datasets and solvers

use crate::core::SparseRow;

/// Dataset abstraction for row and column access
///
/// Coordinate descent in linear mode walks feature columns, everything else
/// walks sample rows, so implementations provide both views.
pub trait Dataset: Send + Sync {
    /// Number of samples in the dataset
    fn n_samples(&self) -> usize;

    /// Number of features (dimensionality)
    fn n_features(&self) -> usize;

    /// Stored entries of sample `i`
    ///
    /// # Panics
    /// Panics if `i >= n_samples()`
    fn row(&self, i: usize) -> SparseRow<'_>;

    /// Stored entries of feature `j`, indexed by sample
    ///
    /// # Panics
    /// Panics if `j >= n_features()`
    fn column(&self, j: usize) -> SparseRow<'_>;

    /// Single entry lookup
    fn value(&self, i: usize, j: usize) -> f64 {
        self.row(i).get(j)
    }

    /// Squared L2 norm of every sample
    fn row_norms_squared(&self) -> Vec<f64> {
        (0..self.n_samples())
            .map(|i| self.row(i).norm_squared())
            .collect()
    }

    /// Check if the dataset is empty
    fn is_empty(&self) -> bool {
        self.n_samples() == 0
    }
}
