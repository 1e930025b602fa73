//! Core type definitions shared by datasets, kernels and solvers

use serde::{Deserialize, Serialize};

/// Borrowed view of a sparse row or column with sorted indices
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseRow<'a> {
    /// Sorted indices of stored elements
    pub indices: &'a [usize],
    /// Values corresponding to indices
    pub values: &'a [f64],
}

impl<'a> SparseRow<'a> {
    pub fn new(indices: &'a [usize], values: &'a [f64]) -> Self {
        debug_assert_eq!(indices.len(), values.len());
        Self { indices, values }
    }

    /// Number of stored elements
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Iterate over (index, value) pairs
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + 'a {
        let (indices, values) = (self.indices, self.values);
        indices.iter().copied().zip(values.iter().copied())
    }

    /// Get the value at a specific index (0 if not present)
    pub fn get(&self, index: usize) -> f64 {
        match self.indices.binary_search(&index) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    /// Dot product with another sparse row
    ///
    /// Both index lists are sorted, so this is a linear merge over the
    /// stored elements of the two rows.
    pub fn dot(&self, other: &SparseRow<'_>) -> f64 {
        let mut result = 0.0;
        let mut i = 0;
        let mut j = 0;

        while i < self.indices.len() && j < other.indices.len() {
            let a = self.indices[i];
            let b = other.indices[j];

            if a == b {
                result += self.values[i] * other.values[j];
                i += 1;
                j += 1;
            } else if a < b {
                i += 1;
            } else {
                j += 1;
            }
        }

        result
    }

    /// Dot product with a dense vector indexed by this row's indices
    pub fn dot_dense(&self, dense: &[f64]) -> f64 {
        self.iter().map(|(j, v)| v * dense[j]).sum()
    }

    /// Compute squared L2 norm
    pub fn norm_squared(&self) -> f64 {
        self.values.iter().map(|&v| v * v).sum()
    }

    /// Copy into an owned sparse vector
    pub fn to_owned_vector(&self) -> SparseVector {
        SparseVector {
            indices: self.indices.to_vec(),
            values: self.values.to_vec(),
        }
    }
}

/// Owned sparse vector representation with sorted indices
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    /// Sorted indices of non-zero elements
    pub indices: Vec<usize>,
    /// Values corresponding to indices
    pub values: Vec<f64>,
}

impl SparseVector {
    /// Create a new sparse vector, ensuring indices are sorted
    pub fn new(indices: Vec<usize>, values: Vec<f64>) -> Self {
        assert_eq!(
            indices.len(),
            values.len(),
            "Indices and values must have same length"
        );

        let mut pairs: Vec<_> = indices.into_iter().zip(values).collect();
        pairs.sort_by_key(|&(idx, _)| idx);

        let (indices, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        Self { indices, values }
    }

    /// Create an empty sparse vector
    pub fn empty() -> Self {
        Self {
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Build from a dense slice, keeping only non-zero entries
    pub fn from_dense(dense: &[f64]) -> Self {
        let (indices, values) = dense
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0.0)
            .map(|(j, &v)| (j, v))
            .unzip();
        Self { indices, values }
    }

    pub fn as_row(&self) -> SparseRow<'_> {
        SparseRow::new(&self.indices, &self.values)
    }

    /// Get the value at a specific index (0 if not present)
    pub fn get(&self, index: usize) -> f64 {
        self.as_row().get(index)
    }

    /// Compute squared L2 norm
    pub fn norm_squared(&self) -> f64 {
        self.as_row().norm_squared()
    }

    /// Number of non-zero elements
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Check if vector is empty
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Dense row-major matrix used for coefficients and margin residuals
///
/// Row `k` holds the coefficient vector (or per-sample errors) of the
/// `k`-th binary sub-problem or class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Matrix with every entry set to `value`
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Build from row vectors, all of the same length
    ///
    /// # Panics
    /// Panics if the rows have different lengths
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        let cols = rows.first().map_or(0, Vec::len);
        assert!(
            rows.iter().all(|r| r.len() == cols),
            "All rows must have the same length"
        );
        let n_rows = rows.len();
        Self {
            rows: n_rows,
            cols,
            data: rows.into_iter().flatten().collect(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn row(&self, k: usize) -> &[f64] {
        &self.data[k * self.cols..(k + 1) * self.cols]
    }

    pub fn row_mut(&mut self, k: usize) -> &mut [f64] {
        &mut self.data[k * self.cols..(k + 1) * self.cols]
    }

    pub fn get(&self, k: usize, j: usize) -> f64 {
        self.data[k * self.cols + j]
    }

    pub fn set(&mut self, k: usize, j: usize, value: f64) {
        self.data[k * self.cols + j] = value;
    }

    pub fn add(&mut self, k: usize, j: usize, delta: f64) {
        self.data[k * self.cols + j] += delta;
    }

    /// Flat row-major storage
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn fill(&mut self, value: f64) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    /// Number of non-zero entries
    pub fn count_nonzero(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0.0).count()
    }

    /// Columns with at least one non-zero entry, in ascending order
    pub fn nonzero_columns(&self) -> Vec<usize> {
        (0..self.cols)
            .filter(|&j| (0..self.rows).any(|k| self.get(k, j) != 0.0))
            .collect()
    }

    /// Copy of the matrix restricted to the given columns
    pub fn select_columns(&self, columns: &[usize]) -> Matrix {
        let mut out = Matrix::zeros(self.rows, columns.len());
        for k in 0..self.rows {
            for (c, &j) in columns.iter().enumerate() {
                out.set(k, c, self.get(k, j));
            }
        }
        out
    }
}
