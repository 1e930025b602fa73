//! Primal Newton solver for kernel squared-hinge SVMs
//!
//! Minimizes λ/2·βᵀKβ + ½·Σ_i max(0, 1 - y_i (Kβ)_i)². Given the current
//! support set SV = {i : 1 - y_i f(x_i) > 0}, the Newton step lands exactly
//! on the solution of (K_SV + λI)·β_SV = y_SV with β zero elsewhere. The
//! support set is then recomputed, and the iteration stops once it no longer
//! changes.

use crate::cache::KernelRowCache;
use crate::core::{Dataset, Matrix, NewtonConfig, Result, SolverError};
use crate::model::Solution;

/// Kernel squared-hinge solver based on Newton iterations and conjugate
/// gradient solves
#[derive(Debug, Clone)]
pub struct PrimalNewton {
    config: NewtonConfig,
}

impl PrimalNewton {
    pub fn new(config: NewtonConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &NewtonConfig {
        &self.config
    }

    /// Fit a binary problem with labels in {-1, +1}
    pub fn fit<D: Dataset + ?Sized>(&self, ds: &D, y: &[f64]) -> Result<Solution> {
        let mut cache =
            KernelRowCache::for_dataset(self.config.kernel, ds, self.config.cache_bytes)?;
        self.fit_with_cache(ds, y, &mut cache)
    }

    pub fn fit_with_cache<D: Dataset + ?Sized>(
        &self,
        ds: &D,
        y: &[f64],
        cache: &mut KernelRowCache,
    ) -> Result<Solution> {
        self.check_inputs(ds, y.len(), cache)?;
        if let Some(&bad) = y.iter().find(|&&v| v != 1.0 && v != -1.0) {
            return Err(SolverError::InvalidLabel(bad));
        }
        let fit = self.solve(ds, y, cache);
        Ok(self.finish(vec![fit]))
    }

    /// One-vs-rest fit with labels in [0, n_classes)
    pub fn fit_multiclass<D: Dataset + ?Sized>(
        &self,
        ds: &D,
        y: &[usize],
        n_classes: usize,
    ) -> Result<Solution> {
        let mut cache =
            KernelRowCache::for_dataset(self.config.kernel, ds, self.config.cache_bytes)?;
        self.fit_multiclass_with_cache(ds, y, n_classes, &mut cache)
    }

    pub fn fit_multiclass_with_cache<D: Dataset + ?Sized>(
        &self,
        ds: &D,
        y: &[usize],
        n_classes: usize,
        cache: &mut KernelRowCache,
    ) -> Result<Solution> {
        self.check_inputs(ds, y.len(), cache)?;
        if n_classes < 2 {
            return Err(SolverError::config("at least two classes are required"));
        }
        if let Some(&bad) = y.iter().find(|&&c| c >= n_classes) {
            return Err(SolverError::InvalidClass {
                class: bad,
                n_classes,
            });
        }

        let n_vectors = if n_classes == 2 { 1 } else { n_classes };
        let fits = (0..n_vectors)
            .map(|k| {
                let positive = if n_classes == 2 { 1 } else { k };
                let yk: Vec<f64> = y
                    .iter()
                    .map(|&c| if c == positive { 1.0 } else { -1.0 })
                    .collect();
                log::debug!("one-vs-rest problem {} of {}", k + 1, n_vectors);
                self.solve(ds, &yk, cache)
            })
            .collect();
        Ok(self.finish(fits))
    }

    fn check_inputs<D: Dataset + ?Sized>(
        &self,
        ds: &D,
        n_labels: usize,
        cache: &KernelRowCache,
    ) -> Result<()> {
        if ds.n_samples() == 0 {
            return Err(SolverError::EmptyDataset);
        }
        if n_labels != ds.n_samples() {
            return Err(SolverError::DimensionMismatch {
                expected: ds.n_samples(),
                actual: n_labels,
            });
        }
        if cache.kernel() != &self.config.kernel {
            return Err(SolverError::config(format!(
                "cache was built for kernel '{}' but the solver uses '{}'",
                cache.kernel().name(),
                self.config.kernel.name()
            )));
        }
        cache.check_compatible(ds)
    }

    fn solve<D: Dataset + ?Sized>(
        &self,
        ds: &D,
        y: &[f64],
        cache: &mut KernelRowCache,
    ) -> NewtonFit {
        let n = ds.n_samples();
        let lambda = self.config.lambda;
        let mut support: Vec<usize> = (0..n).collect();
        let mut coef = vec![0.0; n];
        let mut errors = vec![1.0; n];
        let mut converged = false;
        let mut cg_failures = 0;
        let mut n_iter = 0;

        for iter in 0..self.config.max_iter {
            n_iter = iter + 1;
            if support.is_empty() {
                converged = true;
                break;
            }

            let start: Vec<f64> = support.iter().map(|&i| coef[i]).collect();
            let rhs: Vec<f64> = support.iter().map(|&i| y[i]).collect();
            let (beta, solved) = self.conjugate_gradient(ds, cache, &support, &rhs, start);
            if !solved {
                cg_failures += 1;
                log::debug!("conjugate gradient hit its iteration cap on {} rows", support.len());
            }

            coef.iter_mut().for_each(|c| *c = 0.0);
            for (&i, &b) in support.iter().zip(&beta) {
                coef[i] = b;
            }

            for i in 0..n {
                let row = cache.full_row(ds, i);
                let f: f64 = support.iter().map(|&j| coef[j] * row[j]).sum();
                errors[i] = 1.0 - y[i] * f;
            }

            let next: Vec<usize> = (0..n).filter(|&i| errors[i] > 0.0).collect();
            log::debug!("newton iteration {}: {} support vectors", iter + 1, next.len());
            if next == support {
                converged = true;
                break;
            }
            support = next;
        }

        // βᵀKβ = Σ β_i f_i with f_i = y_i (1 - e_i)
        let quadratic: f64 = (0..n).map(|i| coef[i] * y[i] * (1.0 - errors[i])).sum();
        let data: f64 = errors.iter().map(|&e| e.max(0.0).powi(2)).sum();

        NewtonFit {
            coef,
            errors,
            support,
            n_iter,
            converged,
            cg_failures,
            objective: 0.5 * lambda * quadratic + 0.5 * data,
        }
    }

    /// Solve (K_SV + λI)·β = rhs, returning the solution and whether the
    /// residual tolerance was reached
    fn conjugate_gradient<D: Dataset + ?Sized>(
        &self,
        ds: &D,
        cache: &mut KernelRowCache,
        support: &[usize],
        rhs: &[f64],
        mut x: Vec<f64>,
    ) -> (Vec<f64>, bool) {
        let m = support.len();
        let lambda = self.config.lambda;
        let preconditioner: Option<Vec<f64>> = if self.config.preconditioning {
            let diag = cache.compute_diag(ds);
            Some(support.iter().map(|&i| 1.0 / (diag[i] + lambda)).collect())
        } else {
            None
        };
        let precondition = |r: &[f64]| -> Vec<f64> {
            match &preconditioner {
                Some(p) => r.iter().zip(p).map(|(a, b)| a * b).collect(),
                None => r.to_vec(),
            }
        };

        let mut ax = vec![0.0; m];
        block_product(ds, cache, support, lambda, &x, &mut ax);
        let mut r: Vec<f64> = rhs.iter().zip(&ax).map(|(b, a)| b - a).collect();
        let mut z = precondition(&r);
        let mut p = z.clone();
        let mut rz = dot(&r, &z);
        let threshold = self.config.tol * dot(rhs, rhs).sqrt();
        let mut ap = vec![0.0; m];

        for _ in 0..self.config.cg_max_iter {
            if dot(&r, &r).sqrt() <= threshold {
                return (x, true);
            }
            block_product(ds, cache, support, lambda, &p, &mut ap);
            let alpha = rz / dot(&p, &ap);
            for a in 0..m {
                x[a] += alpha * p[a];
                r[a] -= alpha * ap[a];
            }
            z = precondition(&r);
            let rz_next = dot(&r, &z);
            let beta = rz_next / rz;
            rz = rz_next;
            for a in 0..m {
                p[a] = z[a] + beta * p[a];
            }
        }
        let solved = dot(&r, &r).sqrt() <= threshold;
        (x, solved)
    }

    fn finish(&self, fits: Vec<NewtonFit>) -> Solution {
        let n_vectors = fits.len();
        let mut support = std::collections::BTreeSet::new();
        let mut coef = Vec::with_capacity(n_vectors);
        let mut errors = Vec::with_capacity(n_vectors);
        let (mut n_iter, mut stalls, mut objective) = (0, 0, 0.0);
        let mut converged = true;

        for fit in fits {
            n_iter = n_iter.max(fit.n_iter);
            stalls += fit.cg_failures;
            objective += fit.objective;
            converged &= fit.converged;
            support.extend(fit.support);
            coef.push(fit.coef);
            errors.push(fit.errors);
        }

        let solution = Solution {
            coef: Matrix::from_rows(coef),
            intercept: vec![0.0; n_vectors],
            errors: Matrix::from_rows(errors),
            active_set: support.into_iter().collect(),
            n_iter,
            violation: None,
            converged,
            stalls,
            objective,
        };
        if solution.converged {
            log::info!(
                "newton converged after {} iterations: {} support vectors, objective {:.6}",
                solution.n_iter,
                solution.n_support_vectors(),
                solution.objective
            );
        } else {
            log::warn!(
                "newton stopped after {} iterations with a changing support set",
                solution.n_iter
            );
        }
        solution
    }
}

struct NewtonFit {
    coef: Vec<f64>,
    errors: Vec<f64>,
    support: Vec<usize>,
    n_iter: usize,
    converged: bool,
    cg_failures: usize,
    objective: f64,
}

/// out = (K_SV + λI)·v
fn block_product<D: Dataset + ?Sized>(
    ds: &D,
    cache: &mut KernelRowCache,
    support: &[usize],
    lambda: f64,
    v: &[f64],
    out: &mut [f64],
) {
    for (a, &i) in support.iter().enumerate() {
        let row = cache.full_row(ds, i);
        let kv: f64 = support.iter().zip(v).map(|(&j, &vb)| row[j] * vb).sum();
        out[a] = kv + lambda * v[a];
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
