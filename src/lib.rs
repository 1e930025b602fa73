//! Linear and kernel classifiers trained in the primal
//!
//! Coordinate descent (L1, L2 and L1/L2 group penalties, shrinking, warm
//! starts), stochastic gradient descent and a primal Newton solver, sharing
//! one bounded LRU cache of kernel rows.

pub mod cache;
pub mod core;
pub mod data;
pub mod kernel;
pub mod loss;
pub mod model;
pub mod persistence;
pub mod solver;
pub mod utils;

// Re-export main types for convenience
pub use crate::cache::{CacheStats, KernelRowCache};
pub use crate::core::traits::*;
pub use crate::core::types::*;
pub use crate::core::{Result, SolverError};
pub use crate::data::{DenseDataset, LabeledData, SparseDataset};
pub use crate::kernel::{Kernel, KernelSpec};
pub use crate::loss::{Loss, MulticlassLoss};
pub use crate::model::Solution;
pub use crate::solver::{CoordinateDescent, PrimalNewton, StochasticGradient};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
