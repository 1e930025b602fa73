//! Stochastic (sub)gradient descent
//!
//! Each epoch visits every sample once in a freshly shuffled order. The
//! coefficients are stored as `scale · v`, so the L2 shrinkage applied on
//! every step is a single multiplication.
//!
//! Three coefficient spaces are supported:
//! - linear: one coefficient per feature, the step touches the sample's
//!   stored features;
//! - kernel: one coefficient per training sample, f(x) = Σ_j w_j K(x, x_j),
//!   and the step touches only the sampled example's own coefficient;
//! - kernel components: a fixed random subset of samples acts as an explicit
//!   feature map x ↦ (K(x, x_c))_c and the step touches every component.

use crate::cache::KernelRowCache;
use crate::core::{
    Dataset, Eta0, LearningRate, Matrix, Multiclass, Penalty, Result, SgdConfig, SolverError,
    SparseRow,
};
use crate::loss::MulticlassLoss;
use crate::model::Solution;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Renormalize `v` once the scale falls below this
const MIN_SCALE: f64 = 1e-9;

/// Stochastic gradient solver
#[derive(Debug, Clone)]
pub struct StochasticGradient {
    config: SgdConfig,
}

impl StochasticGradient {
    pub fn new(config: SgdConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SgdConfig {
        &self.config
    }

    /// Fit a binary problem with labels in {-1, +1}
    pub fn fit<D: Dataset + ?Sized>(&self, ds: &D, y: &[f64]) -> Result<Solution> {
        match self.config.kernel {
            Some(kernel) => {
                let mut cache = KernelRowCache::for_dataset(kernel, ds, self.config.cache_bytes)?;
                self.fit_binary_impl(ds, y, Some(&mut cache))
            }
            None => self.fit_binary_impl(ds, y, None),
        }
    }

    /// Fit a binary kernel problem through a caller-owned cache
    pub fn fit_with_cache<D: Dataset + ?Sized>(
        &self,
        ds: &D,
        y: &[f64],
        cache: &mut KernelRowCache,
    ) -> Result<Solution> {
        self.check_cache(ds, cache)?;
        self.fit_binary_impl(ds, y, Some(cache))
    }

    /// Fit a multiclass problem with labels in [0, n_classes)
    pub fn fit_multiclass<D: Dataset + ?Sized>(
        &self,
        ds: &D,
        y: &[usize],
        n_classes: usize,
    ) -> Result<Solution> {
        match self.config.kernel {
            Some(kernel) => {
                let mut cache = KernelRowCache::for_dataset(kernel, ds, self.config.cache_bytes)?;
                self.fit_multiclass_impl(ds, y, n_classes, Some(&mut cache))
            }
            None => self.fit_multiclass_impl(ds, y, n_classes, None),
        }
    }

    /// Fit a multiclass kernel problem through a caller-owned cache
    pub fn fit_multiclass_with_cache<D: Dataset + ?Sized>(
        &self,
        ds: &D,
        y: &[usize],
        n_classes: usize,
        cache: &mut KernelRowCache,
    ) -> Result<Solution> {
        self.check_cache(ds, cache)?;
        self.fit_multiclass_impl(ds, y, n_classes, Some(cache))
    }

    fn check_cache<D: Dataset + ?Sized>(&self, ds: &D, cache: &KernelRowCache) -> Result<()> {
        match &self.config.kernel {
            Some(kernel) if kernel == cache.kernel() => cache.check_compatible(ds),
            Some(kernel) => Err(SolverError::config(format!(
                "cache was built for kernel '{}' but the solver uses '{}'",
                cache.kernel().name(),
                kernel.name()
            ))),
            None => Err(SolverError::config(
                "a kernel cache was given to a linear solver",
            )),
        }
    }

    fn fit_binary_impl<D: Dataset + ?Sized>(
        &self,
        ds: &D,
        y: &[f64],
        cache: Option<&mut KernelRowCache>,
    ) -> Result<Solution> {
        check_dataset(ds, y.len())?;
        if let Some(&bad) = y.iter().find(|&&v| v != 1.0 && v != -1.0) {
            return Err(SolverError::InvalidLabel(bad));
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut examples = self.examples(ds, cache, &mut rng);
        let eta0 = self.initial_rate(&mut examples, None)?;

        let fit = self.run_binary(&mut examples, y, eta0, &mut rng);
        let objective = fit.objective;
        let errors = vec![fit.errors];
        Ok(self.solution(&examples, vec![fit.coef], vec![fit.intercept], errors, objective))
    }

    fn fit_multiclass_impl<D: Dataset + ?Sized>(
        &self,
        ds: &D,
        y: &[usize],
        n_classes: usize,
        cache: Option<&mut KernelRowCache>,
    ) -> Result<Solution> {
        check_dataset(ds, y.len())?;
        if n_classes < 2 {
            return Err(SolverError::config("at least two classes are required"));
        }
        if let Some(&bad) = y.iter().find(|&&c| c >= n_classes) {
            return Err(SolverError::InvalidClass {
                class: bad,
                n_classes,
            });
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut examples = self.examples(ds, cache, &mut rng);

        match self.config.multiclass {
            Multiclass::Natural => {
                let loss = MulticlassLoss::from_binary(&self.config.loss)?;
                let eta0 = self.initial_rate(&mut examples, Some((loss, n_classes)))?;
                let fit = self.run_natural(&mut examples, loss, y, n_classes, eta0, &mut rng);
                Ok(self.solution(&examples, fit.coef, fit.intercept, fit.errors, fit.objective))
            }
            Multiclass::OneVsRest => {
                let eta0 = self.initial_rate(&mut examples, None)?;
                let n_vectors = if n_classes == 2 { 1 } else { n_classes };
                let mut coef = Vec::with_capacity(n_vectors);
                let mut intercept = Vec::with_capacity(n_vectors);
                let mut errors = Vec::with_capacity(n_vectors);
                let mut objective = 0.0;

                for k in 0..n_vectors {
                    let positive = if n_classes == 2 { 1 } else { k };
                    let yk: Vec<f64> = y
                        .iter()
                        .map(|&c| if c == positive { 1.0 } else { -1.0 })
                        .collect();
                    log::debug!("one-vs-rest problem {} of {}", k + 1, n_vectors);
                    let fit = self.run_binary(&mut examples, &yk, eta0, &mut rng);
                    coef.push(fit.coef);
                    intercept.push(fit.intercept);
                    errors.push(fit.errors);
                    objective += fit.objective;
                }
                Ok(self.solution(&examples, coef, intercept, errors, objective))
            }
        }
    }

    fn examples<'a, D: Dataset + ?Sized>(
        &self,
        ds: &'a D,
        cache: Option<&'a mut KernelRowCache>,
        rng: &mut StdRng,
    ) -> Examples<'a, D> {
        let space = match (&cache, self.config.n_components) {
            (None, _) => Space::Linear,
            (Some(_), 0) => Space::Kernel,
            (Some(_), n) => {
                let n = n.min(ds.n_samples());
                let mut components = rand::seq::index::sample(rng, ds.n_samples(), n).into_vec();
                components.sort_unstable();
                log::debug!("using {} random kernel components", components.len());
                Space::Components(components)
            }
        };
        Examples { ds, cache, space }
    }

    /// η0 from the configuration, or derived from the loss bounds
    fn initial_rate<D: Dataset + ?Sized>(
        &self,
        examples: &mut Examples<'_, D>,
        multiclass: Option<(MulticlassLoss, usize)>,
    ) -> Result<f64> {
        let config = &self.config;
        match config.eta0 {
            Eta0::Value(eta0) => Ok(eta0),
            Eta0::Auto => {
                let norms = examples.squared_norms();
                let (diameter, gradient) = match multiclass {
                    Some((loss, n_classes)) => (
                        loss.max_diameter(n_classes, config.penalty, config.lambda),
                        loss.max_gradient(&norms),
                    ),
                    None => (
                        config.loss.max_diameter(config.penalty, config.lambda),
                        config.loss.max_gradient(&norms),
                    ),
                };
                match gradient {
                    Some(_) if diameter <= 0.0 => Err(SolverError::config(format!(
                        "automatic eta0 needs a loss positive at the zero predictor, got '{}'",
                        config.loss.name()
                    ))),
                    Some(g) if g > 0.0 => {
                        let eta0 = diameter / (4.0 * g);
                        log::info!(
                            "automatic eta0 = {:.6e} (diameter {:.4}, gradient bound {:.4})",
                            eta0,
                            diameter,
                            g
                        );
                        Ok(eta0)
                    }
                    Some(_) => Err(SolverError::InvalidDataset(
                        "automatic eta0 needs at least one nonzero sample".to_string(),
                    )),
                    None => Err(SolverError::config(format!(
                        "automatic eta0 needs a loss with bounded gradient, got '{}'",
                        config.loss.name()
                    ))),
                }
            }
        }
    }

    fn learning_rate(&self, eta0: f64, t: usize) -> f64 {
        let t = t as f64;
        match self.config.learning_rate {
            LearningRate::Constant => eta0,
            LearningRate::Pegasos => 1.0 / (self.config.lambda * t),
            LearningRate::InvScaling => eta0 / t.powf(self.config.power_t),
        }
    }

    /// Per-step L2 shrinkage
    fn regularize_step(&self, weights: &mut Weights, eta: f64) {
        if self.config.penalty == Penalty::L2 {
            weights.shrink(1.0 - eta * self.config.lambda);
        }
    }

    fn truncate(&self, weights: &mut Weights, j: usize, eta: f64) {
        let amount = eta * self.config.lambda;
        match self.config.penalty {
            Penalty::L2 => {}
            Penalty::L1 => weights.truncate(j, amount),
            Penalty::L1L2 => weights.group_truncate(j, amount),
        }
    }

    fn run_binary<D: Dataset + ?Sized>(
        &self,
        examples: &mut Examples<'_, D>,
        y: &[f64],
        eta0: f64,
        rng: &mut StdRng,
    ) -> BinaryFit {
        let config = &self.config;
        let loss = config.loss;
        let n_samples = examples.ds.n_samples();
        let mut weights = Weights::new(1, examples.dim());
        let mut intercept = 0.0;
        let mut order: Vec<usize> = (0..n_samples).collect();
        let mut touched = Vec::new();
        let mut t = 1usize;

        for epoch in 0..config.max_iter {
            order.shuffle(rng);
            let mut epoch_loss = 0.0;

            for &i in &order {
                let eta = self.learning_rate(eta0, t);
                let sample = examples.sample(i);
                let p = weights.margin(0, &sample) + intercept;
                epoch_loss += loss.loss(p, y[i]);
                let g = loss.gradient(p, y[i]);

                self.regularize_step(&mut weights, eta);
                touched.clear();
                sample.for_each_update(|j, x| {
                    if g != 0.0 {
                        weights.add(0, j, -eta * g * x);
                    }
                    touched.push(j);
                });
                if config.fit_intercept {
                    intercept -= eta * g * config.intercept_decay;
                }
                for &j in &touched {
                    self.truncate(&mut weights, j, eta);
                }
                t += 1;
            }

            log::debug!(
                "epoch {}: mean loss {:.6}, {} nonzero",
                epoch + 1,
                epoch_loss / n_samples as f64,
                weights.count_nonzero()
            );
        }

        let mut errors = Vec::with_capacity(n_samples);
        let mut data_loss = 0.0;
        for i in 0..n_samples {
            let sample = examples.sample(i);
            let p = weights.margin(0, &sample) + intercept;
            errors.push(1.0 - y[i] * p);
            data_loss += loss.loss(p, y[i]);
        }
        let objective =
            config.lambda * weights.penalty(config.penalty) + data_loss / n_samples as f64;

        BinaryFit {
            coef: weights.to_matrix().row(0).to_vec(),
            intercept,
            errors,
            objective,
        }
    }

    fn run_natural<D: Dataset + ?Sized>(
        &self,
        examples: &mut Examples<'_, D>,
        loss: MulticlassLoss,
        y: &[usize],
        n_classes: usize,
        eta0: f64,
        rng: &mut StdRng,
    ) -> NaturalFit {
        let config = &self.config;
        let n_samples = examples.ds.n_samples();
        let mut weights = Weights::new(n_classes, examples.dim());
        let mut intercept = vec![0.0; n_classes];
        let mut scores = vec![0.0; n_classes];
        let mut grad = vec![0.0; n_classes];
        let mut order: Vec<usize> = (0..n_samples).collect();
        let mut touched = Vec::new();
        let mut t = 1usize;

        for epoch in 0..config.max_iter {
            order.shuffle(rng);
            let mut epoch_loss = 0.0;

            for &i in &order {
                let eta = self.learning_rate(eta0, t);
                let sample = examples.sample(i);
                for (k, s) in scores.iter_mut().enumerate() {
                    *s = weights.margin(k, &sample) + intercept[k];
                }
                epoch_loss += loss.loss(&scores, y[i]);
                loss.gradient(&scores, y[i], &mut grad);

                self.regularize_step(&mut weights, eta);
                touched.clear();
                sample.for_each_update(|j, x| {
                    for (k, &g) in grad.iter().enumerate() {
                        if g != 0.0 {
                            weights.add(k, j, -eta * g * x);
                        }
                    }
                    touched.push(j);
                });
                if config.fit_intercept {
                    for (b, &g) in intercept.iter_mut().zip(&grad) {
                        *b -= eta * g * config.intercept_decay;
                    }
                }
                for &j in &touched {
                    self.truncate(&mut weights, j, eta);
                }
                t += 1;
            }

            log::debug!(
                "epoch {}: mean loss {:.6}, {} nonzero",
                epoch + 1,
                epoch_loss / n_samples as f64,
                weights.count_nonzero()
            );
        }

        let mut errors = Matrix::zeros(n_classes, n_samples);
        let mut data_loss = 0.0;
        for i in 0..n_samples {
            let sample = examples.sample(i);
            for (k, s) in scores.iter_mut().enumerate() {
                *s = weights.margin(k, &sample) + intercept[k];
            }
            let sy = scores[y[i]];
            for (k, &s) in scores.iter().enumerate() {
                errors.set(k, i, 1.0 - (sy - s));
            }
            data_loss += loss.loss(&scores, y[i]);
        }
        let objective =
            config.lambda * weights.penalty(config.penalty) + data_loss / n_samples as f64;

        NaturalFit {
            coef: (0..n_classes).map(|k| weights.to_matrix().row(k).to_vec()).collect(),
            intercept,
            errors: (0..n_classes).map(|k| errors.row(k).to_vec()).collect(),
            objective,
        }
    }

    /// Assemble the fit output; kernel-component coefficients are scattered
    /// back to their sample columns
    fn solution<D: Dataset + ?Sized>(
        &self,
        examples: &Examples<'_, D>,
        coef: Vec<Vec<f64>>,
        intercept: Vec<f64>,
        errors: Vec<Vec<f64>>,
        objective: f64,
    ) -> Solution {
        let coef = match &examples.space {
            Space::Components(components) => {
                let n_samples = examples.ds.n_samples();
                coef.into_iter()
                    .map(|row| {
                        let mut full = vec![0.0; n_samples];
                        for (&c, &w) in components.iter().zip(&row) {
                            full[c] = w;
                        }
                        full
                    })
                    .collect()
            }
            Space::Linear | Space::Kernel => coef,
        };
        let coef = Matrix::from_rows(coef);
        let active_set = match &examples.space {
            Space::Components(components) => components.clone(),
            Space::Linear | Space::Kernel => (0..coef.cols()).collect(),
        };

        log::info!(
            "sgd finished {} epochs: {} nonzero coefficients, objective {:.6}",
            self.config.max_iter,
            coef.count_nonzero(),
            objective
        );

        Solution {
            coef,
            intercept,
            errors: Matrix::from_rows(errors),
            active_set,
            n_iter: self.config.max_iter,
            violation: None,
            converged: false,
            stalls: 0,
            objective,
        }
    }
}

fn check_dataset<D: Dataset + ?Sized>(ds: &D, n_labels: usize) -> Result<()> {
    if ds.n_samples() == 0 {
        return Err(SolverError::EmptyDataset);
    }
    if n_labels != ds.n_samples() {
        return Err(SolverError::DimensionMismatch {
            expected: ds.n_samples(),
            actual: n_labels,
        });
    }
    Ok(())
}

struct BinaryFit {
    coef: Vec<f64>,
    intercept: f64,
    errors: Vec<f64>,
    objective: f64,
}

struct NaturalFit {
    coef: Vec<Vec<f64>>,
    intercept: Vec<f64>,
    errors: Vec<Vec<f64>>,
    objective: f64,
}

/// Coefficient space of the fit
#[derive(Debug, Clone)]
enum Space {
    Linear,
    Kernel,
    /// Sorted sample indices used as explicit kernel features
    Components(Vec<usize>),
}

/// Sample access in the fit's coefficient space
struct Examples<'a, D: Dataset + ?Sized> {
    ds: &'a D,
    cache: Option<&'a mut KernelRowCache>,
    space: Space,
}

impl<'a, D: Dataset + ?Sized> Examples<'a, D> {
    fn dim(&self) -> usize {
        match &self.space {
            Space::Linear => self.ds.n_features(),
            Space::Kernel => self.ds.n_samples(),
            Space::Components(components) => components.len(),
        }
    }

    fn sample(&mut self, i: usize) -> Sample<'_> {
        let ds = self.ds;
        match (&self.space, self.cache.as_deref_mut()) {
            (Space::Kernel, Some(cache)) => Sample::Kernel {
                i,
                row: cache.full_row(ds, i),
            },
            (Space::Components(components), Some(cache)) => Sample::Components {
                components,
                row: cache.full_row(ds, i),
            },
            _ => Sample::Linear(ds.row(i)),
        }
    }

    /// Squared feature-map norm of every sample
    fn squared_norms(&mut self) -> Vec<f64> {
        let n_samples = self.ds.n_samples();
        let ds = self.ds;
        match (&self.space, self.cache.as_deref_mut()) {
            (Space::Kernel, Some(cache)) => cache.compute_diag(ds).to_vec(),
            (Space::Components(components), Some(cache)) => (0..n_samples)
                .map(|i| {
                    let row = cache.full_row(ds, i);
                    components.iter().map(|&c| row[c] * row[c]).sum()
                })
                .collect(),
            _ => ds.row_norms_squared(),
        }
    }
}

/// One sampled example as seen by the weights
enum Sample<'a> {
    Linear(SparseRow<'a>),
    /// Kernel row of sample `i`; the step only touches coefficient `i`
    Kernel { i: usize, row: &'a [f64] },
    Components { components: &'a [usize], row: &'a [f64] },
}

impl Sample<'_> {
    /// Visit the (coordinate, feature value) pairs a gradient step updates
    fn for_each_update(&self, mut f: impl FnMut(usize, f64)) {
        match self {
            Sample::Linear(row) => row.iter().for_each(|(j, x)| f(j, x)),
            Sample::Kernel { i, .. } => f(*i, 1.0),
            Sample::Components { components, row } => {
                for (k, &c) in components.iter().enumerate() {
                    f(k, row[c]);
                }
            }
        }
    }
}

/// Class rows stored as `scale · v`
#[derive(Debug, Clone)]
struct Weights {
    v: Matrix,
    scale: f64,
    /// Coordinates that have ever been updated, used for kernel margins
    support: Vec<usize>,
    in_support: Vec<bool>,
}

impl Weights {
    fn new(rows: usize, dim: usize) -> Self {
        Self {
            v: Matrix::zeros(rows, dim),
            scale: 1.0,
            support: Vec::new(),
            in_support: vec![false; dim],
        }
    }

    fn get(&self, k: usize, j: usize) -> f64 {
        self.scale * self.v.get(k, j)
    }

    fn margin(&self, k: usize, sample: &Sample<'_>) -> f64 {
        let v = self.v.row(k);
        let raw = match sample {
            Sample::Linear(row) => row.dot_dense(v),
            Sample::Kernel { row, .. } => self.support.iter().map(|&j| v[j] * row[j]).sum(),
            Sample::Components { components, row } => components
                .iter()
                .zip(v)
                .map(|(&c, &w)| w * row[c])
                .sum(),
        };
        self.scale * raw
    }

    /// Multiply every row by `factor`; a non-positive factor resets to zero
    fn shrink(&mut self, factor: f64) {
        if factor <= 0.0 {
            self.v.fill(0.0);
            self.scale = 1.0;
            return;
        }
        self.scale *= factor;
        if self.scale < MIN_SCALE {
            let scale = self.scale;
            for k in 0..self.v.rows() {
                self.v.row_mut(k).iter_mut().for_each(|w| *w *= scale);
            }
            self.scale = 1.0;
        }
    }

    fn add(&mut self, k: usize, j: usize, delta: f64) {
        self.v.add(k, j, delta / self.scale);
        if !self.in_support[j] {
            self.in_support[j] = true;
            self.support.push(j);
        }
    }

    /// Soft-threshold coordinate `j` of every row by `amount`
    fn truncate(&mut self, j: usize, amount: f64) {
        for k in 0..self.v.rows() {
            let w = self.get(k, j);
            let shrunk = w.signum() * (w.abs() - amount).max(0.0);
            self.v.set(k, j, shrunk / self.scale);
        }
    }

    /// Shrink column `j` across rows towards zero by `amount` in norm
    fn group_truncate(&mut self, j: usize, amount: f64) {
        let norm = (0..self.v.rows())
            .map(|k| self.get(k, j).powi(2))
            .sum::<f64>()
            .sqrt();
        let factor = if norm > 0.0 {
            (1.0 - amount / norm).max(0.0)
        } else {
            0.0
        };
        for k in 0..self.v.rows() {
            let w = self.v.get(k, j);
            self.v.set(k, j, w * factor);
        }
    }

    fn penalty(&self, penalty: Penalty) -> f64 {
        let w = self.to_matrix();
        match penalty {
            Penalty::L2 => 0.5 * w.as_slice().iter().map(|x| x * x).sum::<f64>(),
            Penalty::L1 => w.as_slice().iter().map(|x| x.abs()).sum(),
            Penalty::L1L2 => (0..w.cols())
                .map(|j| {
                    (0..w.rows())
                        .map(|k| w.get(k, j).powi(2))
                        .sum::<f64>()
                        .sqrt()
                })
                .sum(),
        }
    }

    fn count_nonzero(&self) -> usize {
        self.v.count_nonzero()
    }

    fn to_matrix(&self) -> Matrix {
        let mut out = self.v.clone();
        let scale = self.scale;
        for k in 0..out.rows() {
            out.row_mut(k).iter_mut().for_each(|w| *w *= scale);
        }
        out
    }
}
