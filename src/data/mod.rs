//! In-memory datasets and file loaders
//!
//! `DenseDataset` and `SparseDataset` implement the `Dataset` trait the
//! solvers borrow during a fit. The loaders return features and raw labels
//! side by side.

pub mod csv;
pub mod dense;
pub mod libsvm;
pub mod sparse;

pub use self::csv::{load_csv, read_csv};
pub use self::dense::DenseDataset;
pub use self::libsvm::{load_libsvm, read_libsvm};
pub use self::sparse::SparseDataset;

/// Features plus the labels read alongside them
#[derive(Debug, Clone)]
pub struct LabeledData<D> {
    pub data: D,
    pub labels: Vec<f64>,
}
