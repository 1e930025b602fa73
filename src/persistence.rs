//! Model serialization and persistence
//!
//! Trained models are stored as pretty-printed JSON. Kernel models keep only
//! the support columns of the coefficient matrix together with the support
//! vectors themselves, so a loaded model can score new data without the
//! training set (except for precomputed kernels, where the caller supplies
//! K(test, train) and the stored support indices select its columns).

use crate::core::{Dataset, Matrix, Result, SolverError, SparseVector};
use crate::kernel::KernelSpec;
use crate::loss::Loss;
use crate::model::Solution;
use crate::utils::predict_classes;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Serializable representation of a trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializableModel {
    /// Solver that produced the model ("cd", "sgd" or "newton")
    pub solver: String,
    /// `None` for linear models
    pub kernel: Option<KernelSpec>,
    pub loss: Loss,
    /// Original label values, sorted; class k of the model is `classes[k]`
    pub classes: Vec<f64>,
    /// Coefficient rows over features (linear) or support vectors (kernel)
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
    /// Training-set indices of the support vectors (kernel models)
    pub support_indices: Vec<usize>,
    /// Support vectors (kernel models with a vector kernel)
    pub support_vectors: Vec<SparseVector>,
    /// Width of the training data
    pub n_features: usize,
    pub metadata: ModelMetadata,
}

/// Model metadata for tracking and validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Library version used to create the model
    pub library_version: String,
    pub n_nonzero: usize,
    pub n_iter: usize,
    pub converged: bool,
    pub objective: f64,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
}

impl SerializableModel {
    /// Build a model file from a fit result
    ///
    /// `train` is the dataset the solution was fitted on; kernel models copy
    /// their support vectors from it.
    pub fn from_solution<D: Dataset + ?Sized>(
        solver: &str,
        solution: &Solution,
        kernel: Option<KernelSpec>,
        loss: Loss,
        classes: Vec<f64>,
        train: &D,
    ) -> Result<Self> {
        let expected = if classes.len() == 2 { 1 } else { classes.len() };
        if solution.n_vectors() != expected {
            return Err(SolverError::DimensionMismatch {
                expected,
                actual: solution.n_vectors(),
            });
        }

        let (coef, support_indices, support_vectors) = match &kernel {
            None => (solution.coef.clone(), Vec::new(), Vec::new()),
            Some(spec) => {
                let support = solution.support_indices();
                let vectors = if spec.is_precomputed() {
                    Vec::new()
                } else {
                    support.iter().map(|&j| train.row(j).to_owned_vector()).collect()
                };
                (solution.coef.select_columns(&support), support, vectors)
            }
        };

        Ok(Self {
            solver: solver.to_string(),
            kernel,
            loss,
            classes,
            coef: (0..coef.rows()).map(|k| coef.row(k).to_vec()).collect(),
            intercept: solution.intercept.clone(),
            support_indices,
            support_vectors,
            n_features: train.n_features(),
            metadata: ModelMetadata {
                library_version: env!("CARGO_PKG_VERSION").to_string(),
                n_nonzero: solution.n_nonzero(),
                n_iter: solution.n_iter,
                converged: solution.converged,
                objective: solution.objective,
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        })
    }

    /// Save model to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| SolverError::SerializationError(e.to_string()))?;
        Ok(())
    }

    /// Load model from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let model: Self = serde_json::from_reader(reader)
            .map_err(|e| SolverError::SerializationError(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    /// Check internal consistency of a deserialized model
    pub fn validate(&self) -> Result<()> {
        let n_classes = self.classes.len();
        let expected_rows = if n_classes == 2 { 1 } else { n_classes };
        if n_classes < 2 || self.coef.len() != expected_rows {
            return Err(SolverError::SerializationError(format!(
                "{} classes need {} coefficient rows, found {}",
                n_classes,
                expected_rows,
                self.coef.len()
            )));
        }
        if self.coef.len() != self.intercept.len() {
            return Err(SolverError::SerializationError(format!(
                "{} coefficient rows but {} intercepts",
                self.coef.len(),
                self.intercept.len()
            )));
        }
        let width = match &self.kernel {
            None => self.n_features,
            Some(_) => self.support_indices.len(),
        };
        if self.coef.iter().any(|row| row.len() != width) {
            return Err(SolverError::SerializationError(format!(
                "coefficient rows must have {} entries",
                width
            )));
        }
        if let Some(spec) = &self.kernel {
            spec.validate()?;
            if !spec.is_precomputed() && self.support_vectors.len() != width {
                return Err(SolverError::SerializationError(
                    "support vectors do not match the coefficient columns".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn n_support_vectors(&self) -> usize {
        self.support_indices.len()
    }

    /// Decision values, one column per coefficient row
    ///
    /// Features past the training width are ignored. With a precomputed
    /// kernel, `ds` holds K(x, x_train) with one column per training sample.
    pub fn decision_function<D: Dataset + ?Sized>(&self, ds: &D) -> Result<Matrix> {
        let n_vectors = self.coef.len();
        let mut out = Matrix::zeros(ds.n_samples(), n_vectors);

        match &self.kernel {
            None => {
                for i in 0..ds.n_samples() {
                    let row = ds.row(i);
                    for (k, w) in self.coef.iter().enumerate() {
                        let score: f64 = row
                            .iter()
                            .filter(|&(j, _)| j < w.len())
                            .map(|(j, x)| w[j] * x)
                            .sum();
                        out.set(i, k, score + self.intercept[k]);
                    }
                }
            }
            Some(spec) if spec.is_precomputed() => {
                if let Some(&max) = self.support_indices.iter().max() {
                    if max >= ds.n_features() {
                        return Err(SolverError::DimensionMismatch {
                            expected: max + 1,
                            actual: ds.n_features(),
                        });
                    }
                }
                for i in 0..ds.n_samples() {
                    for (s, &j) in self.support_indices.iter().enumerate() {
                        let value = ds.value(i, j);
                        for (k, w) in self.coef.iter().enumerate() {
                            out.add(i, k, w[s] * value);
                        }
                    }
                    for (k, b) in self.intercept.iter().enumerate() {
                        out.add(i, k, *b);
                    }
                }
            }
            Some(spec) => {
                for i in 0..ds.n_samples() {
                    let row = ds.row(i);
                    for (s, sv) in self.support_vectors.iter().enumerate() {
                        let value = spec.compute_rows(row, sv.as_row()).unwrap_or(0.0);
                        for (k, w) in self.coef.iter().enumerate() {
                            out.add(i, k, w[s] * value);
                        }
                    }
                    for (k, b) in self.intercept.iter().enumerate() {
                        out.add(i, k, *b);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Predicted label values in the original label space
    pub fn predict<D: Dataset + ?Sized>(&self, ds: &D) -> Result<Vec<f64>> {
        let scores = self.decision_function(ds)?;
        predict_classes(&scores)
            .into_iter()
            .map(|k| {
                self.classes.get(k).copied().ok_or(SolverError::InvalidClass {
                    class: k,
                    n_classes: self.classes.len(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DenseDataset;
    use approx::assert_relative_eq;
    use tempfile::NamedTempFile;

    fn solution(coef: Matrix) -> Solution {
        let rows = coef.rows();
        Solution {
            coef,
            intercept: vec![0.5; rows],
            errors: Matrix::zeros(rows, 0),
            active_set: Vec::new(),
            n_iter: 3,
            violation: None,
            converged: true,
            stalls: 0,
            objective: 1.25,
        }
    }

    fn train() -> DenseDataset {
        DenseDataset::from_rows(vec![vec![1.0, 0.0], vec![0.0, 2.0], vec![1.0, 1.0]])
            .expect("Should build dataset")
    }

    #[test]
    fn test_linear_model_round_trip() {
        let ds = train();
        let sol = solution(Matrix::from_rows(vec![vec![1.0, -1.0]]));
        let model =
            SerializableModel::from_solution("cd", &sol, None, Loss::Log, vec![-1.0, 1.0], &ds)
                .expect("Should build model");

        let file = NamedTempFile::new().expect("Should create temp file");
        model.save_to_file(file.path()).expect("Should save");
        let loaded = SerializableModel::load_from_file(file.path()).expect("Should load");

        assert_eq!(loaded, model);
        assert_eq!(loaded.metadata.n_iter, 3);
        assert_eq!(loaded.predict(&ds).expect("Should predict"), vec![1.0, -1.0, 1.0]);
    }

    #[test]
    fn test_kernel_model_keeps_support_only() {
        let ds = train();
        let sol = solution(Matrix::from_rows(vec![vec![0.5, 0.0, -0.25]]));
        let kernel = KernelSpec::Rbf { gamma: 0.5 };
        let model = SerializableModel::from_solution(
            "sgd",
            &sol,
            Some(kernel),
            Loss::Hinge { threshold: 1.0 },
            vec![0.0, 1.0],
            &ds,
        )
        .expect("Should build model");

        assert_eq!(model.support_indices, vec![0, 2]);
        assert_eq!(model.support_vectors.len(), 2);
        assert_eq!(model.coef, vec![vec![0.5, -0.25]]);

        let direct = sol
            .kernel_decision_function(&kernel, &ds, &ds)
            .expect("Should score");
        let stored = model.decision_function(&ds).expect("Should score");
        for i in 0..3 {
            assert_relative_eq!(direct.get(i, 0), stored.get(i, 0), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_class_count_must_match() {
        let ds = train();
        let sol = solution(Matrix::zeros(2, 2));
        assert!(
            SerializableModel::from_solution("cd", &sol, None, Loss::Log, vec![0.0, 1.0], &ds)
                .is_err()
        );
    }

    #[test]
    fn test_load_rejects_mismatched_classes() {
        let ds = train();
        let sol = solution(Matrix::from_rows(vec![vec![1.0, -1.0]]));
        let model =
            SerializableModel::from_solution("cd", &sol, None, Loss::Log, vec![-1.0, 1.0], &ds)
                .expect("Should build model");
        let file = NamedTempFile::new().expect("Should create temp file");

        for classes in [vec![0.0, 1.0, 2.0], vec![1.0], Vec::new()] {
            let mut edited = model.clone();
            edited.classes = classes;
            assert!(edited.validate().is_err());

            edited.save_to_file(file.path()).expect("Should save");
            assert!(matches!(
                SerializableModel::load_from_file(file.path()),
                Err(SolverError::SerializationError(_))
            ));
        }
    }

    #[test]
    fn test_load_rejects_garbage() {
        let file = NamedTempFile::new().expect("Should create temp file");
        std::fs::write(file.path(), "{ not json").expect("Should write");
        assert!(matches!(
            SerializableModel::load_from_file(file.path()),
            Err(SolverError::SerializationError(_))
        ));
    }
}
