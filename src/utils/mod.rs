//! Utility functions around the solvers: label encoding, prediction
//! helpers and synthetic data

use crate::core::{Matrix, Result, SolverError};

/// Label encoding between raw dataset labels and solver labels
pub mod labels {
    use super::*;

    /// Sorted distinct labels and the class index of every sample
    pub fn encode_classes(labels: &[f64]) -> Result<(Vec<f64>, Vec<usize>)> {
        if let Some(&bad) = labels.iter().find(|v| !v.is_finite()) {
            return Err(SolverError::InvalidLabel(bad));
        }
        let mut classes = labels.to_vec();
        classes.sort_by(f64::total_cmp);
        classes.dedup();

        let indices = labels
            .iter()
            .map(|v| classes.partition_point(|c| c < v))
            .collect();
        Ok((classes, indices))
    }

    /// Binary {-1, +1} labels from class indices: class 1 is positive
    pub fn binary_labels(classes: &[usize]) -> Vec<f64> {
        classes
            .iter()
            .map(|&c| if c == 1 { 1.0 } else { -1.0 })
            .collect()
    }

    /// Class index per sample from decision values
    ///
    /// A single column is a binary model (positive score → class 1); with
    /// several columns the highest score wins, the lowest index on ties.
    pub fn predict_classes(scores: &Matrix) -> Vec<usize> {
        (0..scores.rows())
            .map(|i| {
                let row = scores.row(i);
                if row.len() == 1 {
                    usize::from(row[0] > 0.0)
                } else {
                    let mut best = 0;
                    for (k, &s) in row.iter().enumerate() {
                        if s > row[best] {
                            best = k;
                        }
                    }
                    best
                }
            })
            .collect()
    }
}

/// Evaluation metrics
pub mod metrics {
    /// Fraction of matching predictions
    pub fn accuracy(predicted: &[usize], truth: &[usize]) -> f64 {
        if truth.is_empty() {
            return 0.0;
        }
        let correct = predicted
            .iter()
            .zip(truth)
            .filter(|(p, t)| p == t)
            .count();
        correct as f64 / truth.len() as f64
    }
}

/// Synthetic datasets for examples, tests and benchmarks
pub mod synthetic {
    use super::*;
    use crate::data::{DenseDataset, LabeledData};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;

    /// Gaussian blobs around class centroids
    ///
    /// Each class gets a centroid whose first `n_informative` coordinates
    /// are ±`class_sep`; every coordinate then receives standard normal
    /// noise. Labels are class indices stored as `f64`.
    pub fn make_classification(
        n_samples: usize,
        n_features: usize,
        n_informative: usize,
        n_classes: usize,
        class_sep: f64,
        seed: u64,
    ) -> Result<LabeledData<DenseDataset>> {
        if n_samples == 0 || n_features == 0 {
            return Err(SolverError::EmptyDataset);
        }
        if n_classes < 2 || n_informative == 0 || n_informative > n_features {
            return Err(SolverError::config(format!(
                "invalid generator shape: {} classes, {} of {} informative features",
                n_classes, n_informative, n_features
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let centroids: Vec<Vec<f64>> = (0..n_classes)
            .map(|_| {
                (0..n_informative)
                    .map(|_| if rng.gen::<bool>() { class_sep } else { -class_sep })
                    .collect()
            })
            .collect();

        let mut rows = Vec::with_capacity(n_samples * n_features);
        let mut labels = Vec::with_capacity(n_samples);
        for i in 0..n_samples {
            let class = i % n_classes;
            for j in 0..n_features {
                let noise: f64 = rng.sample(StandardNormal);
                let center = if j < n_informative { centroids[class][j] } else { 0.0 };
                rows.push(center + noise);
            }
            labels.push(class as f64);
        }

        Ok(LabeledData {
            data: DenseDataset::new(n_samples, n_features, rows)?,
            labels,
        })
    }
}

pub use self::labels::*;
pub use self::metrics::*;
pub use self::synthetic::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Dataset;

    #[test]
    fn test_encode_classes() {
        let (classes, indices) = encode_classes(&[3.0, -1.0, 3.0, 7.5]).expect("Should encode");
        assert_eq!(classes, vec![-1.0, 3.0, 7.5]);
        assert_eq!(indices, vec![1, 0, 1, 2]);

        assert!(encode_classes(&[1.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_binary_labels() {
        assert_eq!(binary_labels(&[0, 1, 1, 0]), vec![-1.0, 1.0, 1.0, -1.0]);
    }

    #[test]
    fn test_predict_classes() {
        let binary = Matrix::from_rows(vec![vec![0.3], vec![-0.1], vec![0.0]]);
        assert_eq!(predict_classes(&binary), vec![1, 0, 0]);

        let multi = Matrix::from_rows(vec![vec![0.1, 0.5, 0.2], vec![1.0, 1.0, -1.0]]);
        assert_eq!(predict_classes(&multi), vec![1, 0]);
    }

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[0, 1, 1, 2], &[0, 1, 2, 2]), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_make_classification_is_deterministic() {
        let a = make_classification(30, 5, 2, 3, 2.0, 7).expect("Should generate");
        let b = make_classification(30, 5, 2, 3, 2.0, 7).expect("Should generate");
        assert_eq!(a.data.n_samples(), 30);
        assert_eq!(a.data.n_features(), 5);
        assert_eq!(a.labels, b.labels);
        for i in 0..30 {
            assert_eq!(a.data.dense_row(i), b.data.dense_row(i));
        }
        assert!(make_classification(10, 2, 3, 2, 1.0, 0).is_err());
    }
}
