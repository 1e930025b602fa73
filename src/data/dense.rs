//! Dense in-memory dataset
//!
//! Stores a row-major and a column-major copy so both sample rows and
//! feature columns are contiguous slices. Precomputed Gram matrices are held
//! in this form too.

use crate::core::{Dataset, Result, SolverError, SparseRow};

#[derive(Debug, Clone, PartialEq)]
pub struct DenseDataset {
    n_samples: usize,
    n_features: usize,
    rows: Vec<f64>,
    columns: Vec<f64>,
    /// 0..max(n_samples, n_features), sliced to serve as index lists
    positions: Vec<usize>,
}

impl DenseDataset {
    /// Create a dataset from row-major values
    pub fn new(n_samples: usize, n_features: usize, rows: Vec<f64>) -> Result<Self> {
        if rows.len() != n_samples * n_features {
            return Err(SolverError::DimensionMismatch {
                expected: n_samples * n_features,
                actual: rows.len(),
            });
        }

        let mut columns = vec![0.0; rows.len()];
        for i in 0..n_samples {
            for j in 0..n_features {
                columns[j * n_samples + i] = rows[i * n_features + j];
            }
        }

        Ok(Self {
            n_samples,
            n_features,
            rows,
            columns,
            positions: (0..n_samples.max(n_features)).collect(),
        })
    }

    /// Create a dataset from one vector per sample
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n_samples = rows.len();
        let n_features = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().find(|r| r.len() != n_features) {
            return Err(SolverError::DimensionMismatch {
                expected: n_features,
                actual: bad.len(),
            });
        }
        Self::new(n_samples, n_features, rows.into_iter().flatten().collect())
    }

    /// Entry (i, j)
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.rows[i * self.n_features + j]
    }

    /// Dense slice of sample `i`
    pub fn dense_row(&self, i: usize) -> &[f64] {
        &self.rows[i * self.n_features..(i + 1) * self.n_features]
    }

    /// Dense slice of feature `j`
    pub fn dense_column(&self, j: usize) -> &[f64] {
        &self.columns[j * self.n_samples..(j + 1) * self.n_samples]
    }
}

impl Dataset for DenseDataset {
    fn n_samples(&self) -> usize {
        self.n_samples
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn row(&self, i: usize) -> SparseRow<'_> {
        SparseRow::new(&self.positions[..self.n_features], self.dense_row(i))
    }

    fn column(&self, j: usize) -> SparseRow<'_> {
        SparseRow::new(&self.positions[..self.n_samples], self.dense_column(j))
    }

    fn value(&self, i: usize, j: usize) -> f64 {
        self.get(i, j)
    }
}
