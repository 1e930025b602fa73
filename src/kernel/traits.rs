//! Kernel trait definition

use crate::core::SparseRow;

/// Kernel function trait
///
/// Computes the similarity K(x, y) between two sparse feature vectors.
/// Implementations are stateless and cheap to copy.
pub trait Kernel: Send + Sync {
    /// Compute kernel value K(x, y)
    fn compute(&self, x: SparseRow<'_>, y: SparseRow<'_>) -> f64;
}
