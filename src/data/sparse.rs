//! Sparse in-memory dataset (CSR rows with a CSC copy for column access)

use crate::core::{Dataset, Result, SolverError, SparseRow, SparseVector};

#[derive(Debug, Clone, PartialEq)]
pub struct SparseDataset {
    n_samples: usize,
    n_features: usize,
    row_ptr: Vec<usize>,
    row_indices: Vec<usize>,
    row_values: Vec<f64>,
    col_ptr: Vec<usize>,
    col_indices: Vec<usize>,
    col_values: Vec<f64>,
}

impl SparseDataset {
    /// Build from per-sample sparse vectors
    ///
    /// `n_features` defaults to one past the largest index seen.
    pub fn from_vectors(rows: &[SparseVector], n_features: Option<usize>) -> Result<Self> {
        let max_index = rows
            .iter()
            .filter_map(|r| r.indices.last().copied())
            .max()
            .map_or(0, |m| m + 1);
        let n_features = match n_features {
            Some(d) if d < max_index => {
                return Err(SolverError::DimensionMismatch {
                    expected: d,
                    actual: max_index,
                });
            }
            Some(d) => d,
            None => max_index,
        };

        let mut row_ptr = Vec::with_capacity(rows.len() + 1);
        let mut row_indices = Vec::new();
        let mut row_values = Vec::new();
        row_ptr.push(0);
        for row in rows {
            row_indices.extend_from_slice(&row.indices);
            row_values.extend_from_slice(&row.values);
            row_ptr.push(row_indices.len());
        }

        // Counting sort into column-major order; rows are visited in order so
        // each column's sample indices come out sorted.
        let mut col_ptr = vec![0; n_features + 1];
        for &j in &row_indices {
            col_ptr[j + 1] += 1;
        }
        for j in 0..n_features {
            col_ptr[j + 1] += col_ptr[j];
        }
        let mut next = col_ptr.clone();
        let mut col_indices = vec![0; row_indices.len()];
        let mut col_values = vec![0.0; row_indices.len()];
        for (i, row) in rows.iter().enumerate() {
            for (j, v) in row.as_row().iter() {
                col_indices[next[j]] = i;
                col_values[next[j]] = v;
                next[j] += 1;
            }
        }

        Ok(Self {
            n_samples: rows.len(),
            n_features,
            row_ptr,
            row_indices,
            row_values,
            col_ptr,
            col_indices,
            col_values,
        })
    }

    /// Build from dense rows, dropping zeros
    pub fn from_dense(rows: &[Vec<f64>]) -> Result<Self> {
        let n_features = rows.first().map_or(0, Vec::len);
        let vectors: Vec<SparseVector> = rows.iter().map(|r| SparseVector::from_dense(r)).collect();
        Self::from_vectors(&vectors, Some(n_features))
    }

    /// Total number of stored entries
    pub fn nnz(&self) -> usize {
        self.row_values.len()
    }
}

impl Dataset for SparseDataset {
    fn n_samples(&self) -> usize {
        self.n_samples
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn row(&self, i: usize) -> SparseRow<'_> {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        SparseRow::new(&self.row_indices[range.clone()], &self.row_values[range])
    }

    fn column(&self, j: usize) -> SparseRow<'_> {
        let range = self.col_ptr[j]..self.col_ptr[j + 1];
        SparseRow::new(&self.col_indices[range.clone()], &self.col_values[range])
    }
}
