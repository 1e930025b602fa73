//! Primal coordinate descent
//!
//! Minimizes Ω(w) + C·Σ_i L(f(x_i), y_i) one coordinate at a time. In
//! linear mode the coordinates are features and coordinate `j` touches the
//! samples stored in feature column `j`. In kernel mode the coordinates are
//! sample indices, f(x) = Σ_j w_j K(x, x_j), and the column of coordinate
//! `j` is the kernel row of sample `j` fetched through the row cache.
//!
//! The margin residuals `errors_i = 1 - y_i f(x_i)` (or their multiclass
//! analogue) are updated in place after every step, so a coordinate update
//! costs one pass over its column.

use crate::cache::KernelRowCache;
use crate::core::{
    CoordinateDescentConfig, Dataset, Matrix, Penalty, Result, Selection, SolverError,
    SparseRow, Termination,
};
use crate::loss::{Loss, MulticlassLoss};
use crate::model::Solution;
use crate::solver::shrinking::ActiveSet;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::iter::{Copied, Enumerate, Zip};
use std::slice::Iter;

/// Lower bound on the Newton curvature of sparse-penalty steps
const CURVATURE_FLOOR: f64 = 1e-12;

/// Primal coordinate descent solver for L1, L2 and L1/L2 penalties
#[derive(Debug, Clone)]
pub struct CoordinateDescent {
    config: CoordinateDescentConfig,
    /// Coefficients of the previous fit, reused when `warm_start` is set
    warm_coef: Option<Matrix>,
}

impl CoordinateDescent {
    pub fn new(config: CoordinateDescentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            warm_coef: None,
        })
    }

    pub fn config(&self) -> &CoordinateDescentConfig {
        &self.config
    }

    /// Change C in place, keeping the warm-start state
    pub fn set_c(&mut self, c: f64) -> Result<()> {
        if !(c > 0.0 && c.is_finite()) {
            return Err(SolverError::config(format!(
                "C must be positive and finite, got {}",
                c
            )));
        }
        self.config.c = c;
        Ok(())
    }

    /// Forget the coefficients kept for warm starts
    pub fn reset(&mut self) {
        self.warm_coef = None;
    }

    /// Fit a binary problem with labels in {-1, +1}
    pub fn fit<D: Dataset + ?Sized>(&mut self, ds: &D, y: &[f64]) -> Result<Solution> {
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
        &mut self,
        ds: &D,
        y: &[f64],
        cache: &mut KernelRowCache,
    ) -> Result<Solution> {
        self.check_cache(ds, cache)?;
        self.fit_binary_impl(ds, y, Some(cache))
    }

    /// Fit a multiclass problem with labels in [0, n_classes)
    ///
    /// The L1/L2 penalty fits all classes jointly; the other penalties solve
    /// one-vs-rest binary problems (a single one for two classes).
    pub fn fit_multiclass<D: Dataset + ?Sized>(
        &mut self,
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
        &mut self,
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
        &mut self,
        ds: &D,
        y: &[f64],
        cache: Option<&mut KernelRowCache>,
    ) -> Result<Solution> {
        check_dataset(ds, y.len())?;
        if let Some(&bad) = y.iter().find(|&&v| v != 1.0 && v != -1.0) {
            return Err(SolverError::InvalidLabel(bad));
        }

        let mut data = Columns { ds, cache };
        let dim = data.dim();
        let coordinates = self.coordinates(dim)?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let w0 = match self.warm_start_coef(1, dim) {
            Some(coef) => coef.row(0).to_vec(),
            None => vec![0.0; dim],
        };
        let fit = self.solve_binary(&mut data, y.to_vec(), w0, &coordinates, &mut rng);

        let solution = Solution {
            coef: Matrix::from_rows(vec![fit.problem.w]),
            intercept: vec![0.0],
            errors: Matrix::from_rows(vec![fit.problem.errors]),
            active_set: fit.summary.active_set,
            n_iter: fit.summary.n_iter,
            violation: fit.summary.violation,
            converged: fit.summary.converged,
            stalls: fit.summary.stalls,
            objective: fit.objective,
        };
        self.finish(solution)
    }

    fn fit_multiclass_impl<D: Dataset + ?Sized>(
        &mut self,
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

        let mut data = Columns { ds, cache };
        let dim = data.dim();
        let coordinates = self.coordinates(dim)?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        if self.config.penalty == Penalty::L1L2 {
            let loss = MulticlassLoss::from_binary(&self.config.loss)?;
            let w0 = self
                .warm_start_coef(n_classes, dim)
                .cloned()
                .unwrap_or_else(|| Matrix::zeros(n_classes, dim));
            let solution =
                self.solve_group(&mut data, loss, y, n_classes, w0, &coordinates, &mut rng);
            return self.finish(solution);
        }

        let n_vectors = if n_classes == 2 { 1 } else { n_classes };
        let warm = self.warm_start_coef(n_vectors, dim).cloned();
        let mut coef = Vec::with_capacity(n_vectors);
        let mut errors = Vec::with_capacity(n_vectors);
        let mut active = std::collections::BTreeSet::new();
        let (mut n_iter, mut stalls, mut objective) = (0, 0, 0.0);
        let mut converged = true;
        let mut violation: Option<f64> = None;

        for k in 0..n_vectors {
            let positive = if n_classes == 2 { 1 } else { k };
            let yk: Vec<f64> = y
                .iter()
                .map(|&c| if c == positive { 1.0 } else { -1.0 })
                .collect();
            let w0 = match &warm {
                Some(m) => m.row(k).to_vec(),
                None => vec![0.0; dim],
            };

            log::debug!("one-vs-rest problem {} of {}", k + 1, n_vectors);
            let fit = self.solve_binary(&mut data, yk, w0, &coordinates, &mut rng);

            n_iter = n_iter.max(fit.summary.n_iter);
            stalls += fit.summary.stalls;
            objective += fit.objective;
            converged &= fit.summary.converged;
            violation = match (violation, fit.summary.violation) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
            active.extend(fit.summary.active_set);
            coef.push(fit.problem.w);
            errors.push(fit.problem.errors);
        }

        let solution = Solution {
            coef: Matrix::from_rows(coef),
            intercept: vec![0.0; n_vectors],
            errors: Matrix::from_rows(errors),
            active_set: active.into_iter().collect(),
            n_iter,
            violation,
            converged,
            stalls,
            objective,
        };
        self.finish(solution)
    }

    /// Eligible coordinates: the configured components or all of them
    fn coordinates(&self, dim: usize) -> Result<Vec<usize>> {
        match &self.config.components {
            Some(components) => {
                if let Some(&bad) = components.iter().find(|&&j| j >= dim) {
                    return Err(SolverError::config(format!(
                        "component {} is out of range for {} coordinates",
                        bad, dim
                    )));
                }
                Ok(components.clone())
            }
            None => Ok((0..dim).collect()),
        }
    }

    fn warm_start_coef(&self, rows: usize, cols: usize) -> Option<&Matrix> {
        if !self.config.warm_start {
            return None;
        }
        self.warm_coef
            .as_ref()
            .filter(|coef| coef.shape() == (rows, cols))
    }

    fn finish(&mut self, solution: Solution) -> Result<Solution> {
        if self.config.warm_start {
            self.warm_coef = Some(solution.coef.clone());
        }

        if solution.converged {
            log::info!(
                "coordinate descent converged after {} passes: {} nonzero, objective {:.6}",
                solution.n_iter,
                solution.n_nonzero(),
                solution.objective
            );
        } else if self.config.termination == Termination::Convergence {
            log::warn!(
                "coordinate descent stopped after {} passes short of tol={} (violation {:?})",
                solution.n_iter,
                self.config.tol,
                solution.violation
            );
        } else {
            log::info!(
                "coordinate descent stopped after {} passes: {} nonzero coefficients",
                solution.n_iter,
                solution.n_nonzero()
            );
        }
        Ok(solution)
    }

    fn solve_binary<D: Dataset + ?Sized>(
        &self,
        data: &mut Columns<'_, D>,
        y: Vec<f64>,
        w0: Vec<f64>,
        coordinates: &[usize],
        rng: &mut StdRng,
    ) -> BinaryFit {
        let config = &self.config;
        // A single-row group penalty is the absolute value
        let penalty = match config.penalty {
            Penalty::L2 => Penalty::L2,
            Penalty::L1 | Penalty::L1L2 => Penalty::L1,
        };
        let search = LineSearch::from(config);
        let mut problem = Binary::new(config.loss, penalty, config.c, y, w0, search);
        problem.initialize_errors(data);

        let mut summary = run_passes(&mut problem, data, coordinates.to_vec(), config, rng);

        if let (Some(debias_c), true) = (config.debias_c, penalty.is_sparse()) {
            let support: Vec<usize> = coordinates
                .iter()
                .copied()
                .filter(|&j| problem.w[j] != 0.0)
                .collect();
            if !support.is_empty() {
                log::debug!("debiasing {} coordinates with C={}", support.len(), debias_c);
                problem.penalty = Penalty::L2;
                problem.c = debias_c;
                let refit = run_passes(&mut problem, data, support, &debias_config(config), rng);
                summary.absorb(refit);
            }
        }

        let objective = problem.objective();
        BinaryFit {
            problem,
            summary,
            objective,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn solve_group<D: Dataset + ?Sized>(
        &self,
        data: &mut Columns<'_, D>,
        loss: MulticlassLoss,
        y: &[usize],
        n_classes: usize,
        w0: Matrix,
        coordinates: &[usize],
        rng: &mut StdRng,
    ) -> Solution {
        let config = &self.config;
        let search = LineSearch::from(config);
        let mut problem = Group::new(loss, config.c, y.to_vec(), n_classes, w0, search);
        problem.initialize_errors(data);

        let mut summary = run_passes(&mut problem, data, coordinates.to_vec(), config, rng);

        if let Some(debias_c) = config.debias_c {
            let support: Vec<usize> = coordinates
                .iter()
                .copied()
                .filter(|&j| !problem.is_zero(j))
                .collect();
            if !support.is_empty() {
                log::debug!("debiasing {} coordinates with C={}", support.len(), debias_c);
                problem.squared_penalty = true;
                problem.c = debias_c;
                let refit = run_passes(&mut problem, data, support, &debias_config(config), rng);
                summary.absorb(refit);
            }
        }

        let objective = problem.objective();
        Solution {
            coef: problem.w,
            intercept: vec![0.0; n_classes],
            errors: problem.errors,
            active_set: summary.active_set,
            n_iter: summary.n_iter,
            violation: summary.violation,
            converged: summary.converged,
            stalls: summary.stalls,
            objective,
        }
    }
}

/// The refit after a sparse fit runs to convergence on a fixed support
fn debias_config(config: &CoordinateDescentConfig) -> CoordinateDescentConfig {
    CoordinateDescentConfig {
        termination: Termination::Convergence,
        shrinking: false,
        ..config.clone()
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
    problem: Binary,
    summary: PassSummary,
    objective: f64,
}

/// Column access: feature columns in linear mode, cached kernel rows in
/// kernel mode
struct Columns<'a, D: Dataset + ?Sized> {
    ds: &'a D,
    cache: Option<&'a mut KernelRowCache>,
}

impl<'a, D: Dataset + ?Sized> Columns<'a, D> {
    fn n_samples(&self) -> usize {
        self.ds.n_samples()
    }

    fn dim(&self) -> usize {
        match self.cache {
            Some(_) => self.ds.n_samples(),
            None => self.ds.n_features(),
        }
    }

    fn column(&mut self, j: usize) -> Column<'_> {
        let ds = self.ds;
        match self.cache.as_deref_mut() {
            Some(cache) => Column::Dense(cache.full_row(ds, j)),
            None => Column::Sparse(ds.column(j)),
        }
    }
}

/// Values of one coordinate across samples
#[derive(Clone, Copy)]
enum Column<'a> {
    Sparse(SparseRow<'a>),
    Dense(&'a [f64]),
}

impl<'a> Column<'a> {
    fn iter(&self) -> ColumnIter<'a> {
        match *self {
            Column::Sparse(row) => {
                ColumnIter::Sparse(row.indices.iter().copied().zip(row.values.iter().copied()))
            }
            Column::Dense(values) => ColumnIter::Dense(values.iter().copied().enumerate()),
        }
    }
}

enum ColumnIter<'a> {
    Sparse(Zip<Copied<Iter<'a, usize>>, Copied<Iter<'a, f64>>>),
    Dense(Enumerate<Copied<Iter<'a, f64>>>),
}

impl Iterator for ColumnIter<'_> {
    type Item = (usize, f64);

    fn next(&mut self) -> Option<(usize, f64)> {
        match self {
            ColumnIter::Sparse(it) => it.next(),
            ColumnIter::Dense(it) => it.next(),
        }
    }
}

/// Armijo backtracking parameters
#[derive(Debug, Clone, Copy)]
struct LineSearch {
    sigma: f64,
    beta: f64,
    max_trials: usize,
}

impl From<&CoordinateDescentConfig> for LineSearch {
    fn from(config: &CoordinateDescentConfig) -> Self {
        Self {
            sigma: config.sigma,
            beta: config.beta,
            max_trials: config.max_line_search,
        }
    }
}

impl LineSearch {
    /// First step fraction t in {1, β, β², ...} whose objective change
    /// satisfies `change(t) <= σ·t·delta`
    fn search(&self, delta: f64, mut change: impl FnMut(f64) -> f64) -> Option<f64> {
        let mut t = 1.0;
        for _ in 0..self.max_trials {
            if change(t) <= self.sigma * t * delta {
                return Some(t);
            }
            t *= self.beta;
        }
        None
    }
}

/// Result of one coordinate update
#[derive(Debug, Clone, Copy)]
struct Step {
    /// Optimality violation before the update
    violation: f64,
    /// Whether the coordinate looks settled enough to be shrunk
    candidate: bool,
    stalled: bool,
}

/// One coordinate descent problem: coefficients, residuals and the rule
/// for updating a single coordinate
trait Subproblem {
    /// Update coordinate `j` whose values are `column`
    ///
    /// `shrink_margin` is the previous pass's largest violation divided by
    /// the active-set size; a zero coordinate whose gradient lies inside the
    /// penalty's dead zone by more than this margin is a shrink candidate.
    fn update(&mut self, column: Column<'_>, j: usize, shrink_margin: f64) -> Step;

    fn is_zero(&self, j: usize) -> bool;

    /// Loss contribution of sample `i`
    fn sample_loss(&self, i: usize) -> f64;

    fn objective(&self) -> f64;
}

/// Binary problem with labels in {-1, +1}
struct Binary {
    loss: Loss,
    /// L1 or L2
    penalty: Penalty,
    c: f64,
    y: Vec<f64>,
    w: Vec<f64>,
    /// 1 - y_i f(x_i)
    errors: Vec<f64>,
    search: LineSearch,
}

impl Binary {
    fn new(
        loss: Loss,
        penalty: Penalty,
        c: f64,
        y: Vec<f64>,
        w: Vec<f64>,
        search: LineSearch,
    ) -> Self {
        let errors = vec![1.0; y.len()];
        Self {
            loss,
            penalty,
            c,
            y,
            w,
            errors,
            search,
        }
    }

    /// Residuals of the starting coefficients, computed column by column
    fn initialize_errors<D: Dataset + ?Sized>(&mut self, data: &mut Columns<'_, D>) {
        self.errors.iter_mut().for_each(|e| *e = 1.0);
        for j in 0..self.w.len() {
            let wj = self.w[j];
            if wj == 0.0 {
                continue;
            }
            for (i, x) in data.column(j).iter() {
                self.errors[i] -= self.y[i] * wj * x;
            }
        }
    }

    fn prediction(&self, i: usize) -> f64 {
        self.y[i] * (1.0 - self.errors[i])
    }

    fn penalty_value(&self, w: f64) -> f64 {
        match self.penalty {
            Penalty::L2 => 0.5 * w * w,
            Penalty::L1 | Penalty::L1L2 => w.abs(),
        }
    }
}

impl Subproblem for Binary {
    fn update(&mut self, column: Column<'_>, j: usize, shrink_margin: f64) -> Step {
        let mut g = 0.0;
        let mut h = 0.0;
        for (i, x) in column.iter() {
            if x == 0.0 {
                continue;
            }
            let p = self.prediction(i);
            g += self.loss.gradient(p, self.y[i]) * x;
            h += self.loss.second_derivative(p, self.y[i]) * x * x;
        }
        g *= self.c;
        h *= self.c;

        let wj = self.w[j];
        let (violation, candidate, d, delta) = match self.penalty {
            Penalty::L2 => {
                let grad = wj + g;
                let d = -grad / (1.0 + h);
                (grad.abs(), settled(grad.abs(), shrink_margin), d, grad * d)
            }
            Penalty::L1 | Penalty::L1L2 => {
                let gp = g + 1.0;
                let gn = g - 1.0;
                let curv = h.max(CURVATURE_FLOOR);
                let violation = if wj > 0.0 {
                    gp.abs()
                } else if wj < 0.0 {
                    gn.abs()
                } else {
                    gn.max(-gp).max(0.0)
                };
                let candidate = wj == 0.0 && gp > shrink_margin && gn < -shrink_margin;
                let d = if gp <= curv * wj {
                    -gp / curv
                } else if gn >= curv * wj {
                    -gn / curv
                } else {
                    -wj
                };
                (violation, candidate, d, g * d + (wj + d).abs() - wj.abs())
            }
        };

        let mut step = Step {
            violation,
            candidate,
            stalled: false,
        };
        if d == 0.0 || !d.is_finite() {
            return step;
        }

        let t = if self.loss.has_exact_newton_step() {
            Some(1.0)
        } else {
            let reg_before = self.penalty_value(wj);
            self.search.search(delta, |t| {
                let moved = t * d;
                let mut change = self.penalty_value(wj + moved) - reg_before;
                let mut loss_change = 0.0;
                for (i, x) in column.iter() {
                    if x == 0.0 {
                        continue;
                    }
                    let p = self.prediction(i);
                    loss_change +=
                        self.loss.loss(p + moved * x, self.y[i]) - self.loss.loss(p, self.y[i]);
                }
                change += self.c * loss_change;
                change
            })
        };

        let Some(t) = t else {
            log::debug!("line search stalled on coordinate {} (d={:.3e})", j, d);
            step.stalled = true;
            return step;
        };

        let moved = t * d;
        // Landing exactly on zero keeps sparse solutions sparse
        self.w[j] = if (wj + moved).abs() < 1e-15 { 0.0 } else { wj + moved };
        let moved = self.w[j] - wj;
        for (i, x) in column.iter() {
            self.errors[i] -= moved * self.y[i] * x;
        }
        step
    }

    fn is_zero(&self, j: usize) -> bool {
        self.w[j] == 0.0
    }

    fn sample_loss(&self, i: usize) -> f64 {
        self.loss.loss(self.prediction(i), self.y[i])
    }

    fn objective(&self) -> f64 {
        let reg: f64 = self.w.iter().map(|&w| self.penalty_value(w)).sum();
        let data: f64 = (0..self.y.len()).map(|i| self.sample_loss(i)).sum();
        reg + self.c * data
    }
}

/// Joint multiclass problem with a group penalty over class rows
struct Group {
    loss: MulticlassLoss,
    c: f64,
    y: Vec<usize>,
    n_classes: usize,
    /// n_classes x dim
    w: Matrix,
    /// n_classes x n_samples, errors[k][i] = 1 - (s_{y_i} - s_k)
    errors: Matrix,
    /// ½‖W‖² instead of Σ_j ‖W_j‖ (debiasing refit)
    squared_penalty: bool,
    search: LineSearch,
    grad: Vec<f64>,
    curv: Vec<f64>,
    sample_errors: Vec<f64>,
    sample_grad: Vec<f64>,
    sample_curv: Vec<f64>,
    wj: Vec<f64>,
    d: Vec<f64>,
}

impl Group {
    fn new(
        loss: MulticlassLoss,
        c: f64,
        y: Vec<usize>,
        n_classes: usize,
        w: Matrix,
        search: LineSearch,
    ) -> Self {
        let errors = Matrix::filled(n_classes, y.len(), 1.0);
        Self {
            loss,
            c,
            y,
            n_classes,
            w,
            errors,
            squared_penalty: false,
            search,
            grad: vec![0.0; n_classes],
            curv: vec![0.0; n_classes],
            sample_errors: vec![0.0; n_classes],
            sample_grad: vec![0.0; n_classes],
            sample_curv: vec![0.0; n_classes],
            wj: vec![0.0; n_classes],
            d: vec![0.0; n_classes],
        }
    }

    fn initialize_errors<D: Dataset + ?Sized>(&mut self, data: &mut Columns<'_, D>) {
        self.errors.fill(1.0);
        for j in 0..self.w.cols() {
            if self.is_zero(j) {
                continue;
            }
            for (i, x) in data.column(j).iter() {
                let wy = self.w.get(self.y[i], j);
                for k in 0..self.n_classes {
                    self.errors.add(k, i, x * (self.w.get(k, j) - wy));
                }
            }
        }
    }

    fn gather_errors(&self, i: usize, out: &mut [f64]) {
        for (k, e) in out.iter_mut().enumerate() {
            *e = self.errors.get(k, i);
        }
    }

    fn block_penalty(&self, block: &[f64]) -> f64 {
        let sq: f64 = block.iter().map(|v| v * v).sum();
        if self.squared_penalty {
            0.5 * sq
        } else {
            sq.sqrt()
        }
    }

    /// Data-term change when column `j`'s block moves by `t·d`
    fn loss_change(&self, column: Column<'_>, t: f64, d: &[f64], buf: &mut [f64]) -> f64 {
        let mut change = 0.0;
        for (i, x) in column.iter() {
            if x == 0.0 {
                continue;
            }
            let yi = self.y[i];
            self.gather_errors(i, buf);
            let before = self.loss.loss_from_errors(buf, yi);
            let dy = d[yi];
            for (k, e) in buf.iter_mut().enumerate() {
                *e += t * x * (d[k] - dy);
            }
            change += self.loss.loss_from_errors(buf, yi) - before;
        }
        change
    }
}

/// Shrink rule for the L2 penalties, which have no dead zone: the
/// violation must already be below the margin
fn settled(violation: f64, shrink_margin: f64) -> bool {
    shrink_margin.is_finite() && violation < shrink_margin
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

impl Subproblem for Group {
    fn update(&mut self, column: Column<'_>, j: usize, shrink_margin: f64) -> Step {
        let n_classes = self.n_classes;
        let mut grad = std::mem::take(&mut self.grad);
        let mut curv = std::mem::take(&mut self.curv);
        let mut sample_errors = std::mem::take(&mut self.sample_errors);
        let mut sample_grad = std::mem::take(&mut self.sample_grad);
        let mut sample_curv = std::mem::take(&mut self.sample_curv);
        let mut wj = std::mem::take(&mut self.wj);
        let mut d = std::mem::take(&mut self.d);

        grad.iter_mut().for_each(|g| *g = 0.0);
        curv.iter_mut().for_each(|h| *h = 0.0);
        for (i, x) in column.iter() {
            if x == 0.0 {
                continue;
            }
            self.gather_errors(i, &mut sample_errors);
            self.loss.derivatives_from_errors(
                &sample_errors,
                self.y[i],
                &mut sample_grad,
                &mut sample_curv,
            );
            for k in 0..n_classes {
                grad[k] += sample_grad[k] * x;
                curv[k] += sample_curv[k] * x * x;
            }
        }
        grad.iter_mut().for_each(|g| *g *= self.c);
        let h = self.c * curv.iter().copied().fold(0.0, f64::max);

        for (k, w) in wj.iter_mut().enumerate() {
            *w = self.w.get(k, j);
        }
        let w_norm = norm(&wj);

        let (violation, candidate, delta) = if self.squared_penalty {
            let mut full = 0.0;
            let mut sq = 0.0;
            for k in 0..n_classes {
                let gk = grad[k] + wj[k];
                d[k] = -gk / (1.0 + h);
                full += gk * d[k];
                sq += gk * gk;
            }
            let violation = sq.sqrt();
            (violation, settled(violation, shrink_margin), full)
        } else {
            let curv = h.max(CURVATURE_FLOOR);
            let g_norm = norm(&grad);
            let violation = if w_norm > 0.0 {
                let v: f64 = (0..n_classes)
                    .map(|k| {
                        let r = grad[k] + wj[k] / w_norm;
                        r * r
                    })
                    .sum();
                v.sqrt()
            } else {
                (g_norm - 1.0).max(0.0)
            };
            let candidate = w_norm == 0.0 && g_norm < 1.0 - shrink_margin;

            // Block soft-thresholding of the Newton point
            for k in 0..n_classes {
                d[k] = wj[k] - grad[k] / curv;
            }
            let v_norm = norm(&d);
            let scale = if v_norm > 0.0 {
                (1.0 - 1.0 / (curv * v_norm)).max(0.0)
            } else {
                0.0
            };
            let mut gd = 0.0;
            for k in 0..n_classes {
                d[k] = scale * d[k] - wj[k];
                gd += grad[k] * d[k];
            }
            let moved: Vec<f64> = (0..n_classes).map(|k| wj[k] + d[k]).collect();
            (violation, candidate, gd + norm(&moved) - w_norm)
        };

        let mut step = Step {
            violation,
            candidate,
            stalled: false,
        };

        if d.iter().any(|&v| v != 0.0) && d.iter().all(|v| v.is_finite()) {
            let reg_before = self.block_penalty(&wj);
            let mut buf = vec![0.0; n_classes];
            let mut moved = vec![0.0; n_classes];
            let t = self.search.search(delta, |t| {
                for k in 0..n_classes {
                    moved[k] = wj[k] + t * d[k];
                }
                self.block_penalty(&moved) - reg_before
                    + self.c * self.loss_change(column, t, &d, &mut buf)
            });

            match t {
                Some(t) => {
                    for k in 0..n_classes {
                        let new = wj[k] + t * d[k];
                        self.w.set(k, j, if new.abs() < 1e-15 { 0.0 } else { new });
                        d[k] = self.w.get(k, j) - wj[k];
                    }
                    for (i, x) in column.iter() {
                        let dy = d[self.y[i]];
                        for k in 0..n_classes {
                            self.errors.add(k, i, x * (d[k] - dy));
                        }
                    }
                }
                None => {
                    log::debug!("line search stalled on coordinate {}", j);
                    step.stalled = true;
                }
            }
        }

        self.grad = grad;
        self.curv = curv;
        self.sample_errors = sample_errors;
        self.sample_grad = sample_grad;
        self.sample_curv = sample_curv;
        self.wj = wj;
        self.d = d;
        step
    }

    fn is_zero(&self, j: usize) -> bool {
        (0..self.n_classes).all(|k| self.w.get(k, j) == 0.0)
    }

    fn sample_loss(&self, i: usize) -> f64 {
        let mut buf = vec![0.0; self.n_classes];
        self.gather_errors(i, &mut buf);
        self.loss.loss_from_errors(&buf, self.y[i])
    }

    fn objective(&self) -> f64 {
        let mut block = vec![0.0; self.n_classes];
        let mut reg = 0.0;
        for j in 0..self.w.cols() {
            for (k, b) in block.iter_mut().enumerate() {
                *b = self.w.get(k, j);
            }
            reg += self.block_penalty(&block);
        }
        let data: f64 = (0..self.y.len()).map(|i| self.sample_loss(i)).sum();
        reg + self.c * data
    }
}

/// Outcome of the pass loop
#[derive(Debug, Clone)]
struct PassSummary {
    n_iter: usize,
    violation: Option<f64>,
    converged: bool,
    stalls: usize,
    active_set: Vec<usize>,
}

impl PassSummary {
    /// Fold in a follow-up run over the same coefficients
    fn absorb(&mut self, next: PassSummary) {
        self.n_iter += next.n_iter;
        self.stalls += next.stalls;
        self.violation = next.violation.or(self.violation);
        self.converged = next.converged;
    }
}

/// Outer pass loop shared by the binary and group problems
fn run_passes<P: Subproblem, D: Dataset + ?Sized>(
    problem: &mut P,
    data: &mut Columns<'_, D>,
    coordinates: Vec<usize>,
    config: &CoordinateDescentConfig,
    rng: &mut StdRng,
) -> PassSummary {
    let dim = data.dim();
    let kernel_mode = data.cache.is_some();
    let n_samples = data.n_samples();
    let mut active = ActiveSet::new(
        coordinates,
        dim,
        config.shrinking_window,
        config.unshrink_interval,
    );

    let target = match config.termination {
        Termination::NComponents(n) => Some(n),
        _ => None,
    };
    let mut nnz = active.eligible().iter().filter(|&&j| !problem.is_zero(j)).count();

    let mut summary = PassSummary {
        n_iter: 0,
        violation: None,
        converged: false,
        stalls: 0,
        active_set: Vec::new(),
    };
    if target.is_some_and(|n| nnz >= n) {
        summary.active_set = active.active().to_vec();
        return summary;
    }

    let mut last_violation = vec![0.0; dim];
    let mut first_violation: Option<f64> = None;
    let mut previous_violation = f64::INFINITY;
    let mut restricted = false;

    'passes: for pass in 0..config.max_iter {
        summary.n_iter = pass + 1;
        if config.shrinking && active.unshrink_due(pass) {
            active.unshrink();
        }

        let mut order: Vec<usize> = if restricted {
            active
                .active()
                .iter()
                .copied()
                .filter(|&j| !problem.is_zero(j))
                .collect()
        } else {
            active.active().to_vec()
        };
        match config.selection {
            Selection::Cyclic | Selection::Active => {}
            Selection::Permute => order.shuffle(rng),
            Selection::Loss => {
                let key: Vec<f64> = order
                    .iter()
                    .map(|&j| {
                        if kernel_mode && j < n_samples {
                            problem.sample_loss(j)
                        } else {
                            last_violation[j]
                        }
                    })
                    .collect();
                let mut ranked: Vec<(usize, f64)> = order.iter().copied().zip(key).collect();
                // Stable: equal keys keep ascending index order
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
                order = ranked.into_iter().map(|(j, _)| j).collect();
            }
        }

        let shrink_margin = if previous_violation.is_finite() && active.n_active() > 0 {
            previous_violation / active.n_active() as f64
        } else {
            f64::INFINITY
        };

        let mut violation = 0.0f64;
        for &j in &order {
            let was_zero = problem.is_zero(j);
            let step = problem.update(data.column(j), j, shrink_margin);
            violation = violation.max(step.violation);
            last_violation[j] = step.violation;
            if step.stalled {
                summary.stalls += 1;
            }
            if config.shrinking && !restricted {
                active.record(j, step.candidate);
            }

            match (was_zero, problem.is_zero(j)) {
                (true, false) => nnz += 1,
                (false, true) => nnz -= 1,
                _ => {}
            }
            if let Some(n) = target {
                if nnz >= n {
                    log::debug!("reached {} nonzero coordinates during pass {}", nnz, pass + 1);
                    break 'passes;
                }
            }
        }

        log::debug!(
            "pass {}: max violation {:.6e}, {} active, {} nonzero{}",
            pass + 1,
            violation,
            active.n_active(),
            nnz,
            if restricted { " (nonzero only)" } else { "" }
        );

        let reference = *first_violation.get_or_insert(violation);
        if restricted {
            if order.is_empty() || violation <= config.tol * reference {
                restricted = false;
            }
            continue;
        }

        summary.violation = Some(violation);
        previous_violation = violation;

        if config.termination != Termination::MaxIterations && violation <= config.tol * reference {
            if active.has_shrunk() {
                active.unshrink();
                continue;
            }
            summary.converged = true;
            break;
        }

        if config.shrinking {
            active.shrink();
        }
        if config.selection == Selection::Active {
            restricted = true;
        }
    }

    summary.active_set = active.active().to_vec();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DenseDataset;
    use crate::kernel::KernelSpec;
    use approx::assert_relative_eq;

    fn toy() -> (DenseDataset, Vec<f64>) {
        let rows = vec![
            vec![2.0, 1.0, 0.1],
            vec![1.5, 2.0, -0.2],
            vec![1.0, 0.5, 0.3],
            vec![-1.0, -1.5, 0.0],
            vec![-2.0, -0.5, 0.2],
            vec![-1.5, -2.0, -0.1],
        ];
        let y = vec![1.0, 1.0, 1.0, -1.0, -1.0, -1.0];
        (DenseDataset::from_rows(rows).expect("Should build dataset"), y)
    }

    fn assert_errors_consistent(ds: &DenseDataset, y: &[f64], sol: &Solution) {
        let scores = sol.decision_function(ds).expect("Should score");
        for i in 0..ds.n_samples() {
            assert_relative_eq!(
                sol.errors.get(0, i),
                1.0 - y[i] * scores.get(i, 0),
                epsilon = 1e-8
            );
        }
    }

    #[test]
    fn test_l2_squared_hinge_separates_toy_data() {
        let (ds, y) = toy();
        let config = CoordinateDescentConfig::default().with_tol(1e-4).with_max_iter(500);
        let mut solver = CoordinateDescent::new(config).expect("Valid config");
        let sol = solver.fit(&ds, &y).expect("Should solve");

        assert!(sol.converged);
        assert_errors_consistent(&ds, &y, &sol);
        let scores = sol.decision_function(&ds).expect("Should score");
        for i in 0..6 {
            assert!(scores.get(i, 0) * y[i] > 0.0, "sample {} misclassified", i);
        }
    }

    #[test]
    fn test_squared_loss_matches_ridge_solution() {
        // Single feature: w = C Σ x y / (1 + C Σ x²)
        let ds = DenseDataset::from_rows(vec![vec![1.0], vec![2.0], vec![-1.0]])
            .expect("Should build dataset");
        let y = vec![1.0, 1.0, -1.0];
        let config = CoordinateDescentConfig::default()
            .with_loss(Loss::Squared)
            .with_c(0.5)
            .with_tol(1e-10);
        let sol = CoordinateDescent::new(config)
            .expect("Valid config")
            .fit(&ds, &y)
            .expect("Should solve");

        assert_relative_eq!(sol.coef.get(0, 0), 0.5 * 4.0 / (1.0 + 0.5 * 6.0), epsilon = 1e-10);
        assert_errors_consistent(&ds, &y, &sol);
    }

    #[test]
    fn test_l1_small_c_gives_empty_model() {
        let (ds, y) = toy();
        let config = CoordinateDescentConfig::default()
            .with_penalty(Penalty::L1)
            .with_c(1e-3);
        let sol = CoordinateDescent::new(config)
            .expect("Valid config")
            .fit(&ds, &y)
            .expect("Should solve");

        assert_eq!(sol.n_nonzero(), 0);
        assert!(sol.converged);
        assert_eq!(sol.n_iter, 1);
        assert!(sol.errors.as_slice().iter().all(|&e| e == 1.0));
    }

    #[test]
    fn test_max_iterations_runs_every_pass() {
        let (ds, y) = toy();
        let config = CoordinateDescentConfig::default()
            .with_termination(Termination::MaxIterations)
            .with_max_iter(7);
        let sol = CoordinateDescent::new(config)
            .expect("Valid config")
            .fit(&ds, &y)
            .expect("Should solve");
        assert_eq!(sol.n_iter, 7);
        assert!(!sol.converged);
    }

    #[test]
    fn test_kernel_mode_errors_consistent() {
        let (ds, y) = toy();
        let kernel = KernelSpec::Rbf { gamma: 0.5 };
        let config = CoordinateDescentConfig::default().with_kernel(kernel);
        let sol = CoordinateDescent::new(config)
            .expect("Valid config")
            .fit(&ds, &y)
            .expect("Should solve");

        assert_eq!(sol.coef.cols(), 6);
        let scores = sol
            .kernel_decision_function(&kernel, &ds, &ds)
            .expect("Should score");
        for i in 0..6 {
            assert_relative_eq!(
                sol.errors.get(0, i),
                1.0 - y[i] * scores.get(i, 0),
                epsilon = 1e-8
            );
        }
    }

    #[test]
    fn test_components_restrict_coordinates() {
        let (ds, y) = toy();
        let config = CoordinateDescentConfig::default().with_components(vec![1]);
        let sol = CoordinateDescent::new(config)
            .expect("Valid config")
            .fit(&ds, &y)
            .expect("Should solve");
        assert_eq!(sol.coef.get(0, 0), 0.0);
        assert_eq!(sol.coef.get(0, 2), 0.0);
        assert!(sol.coef.get(0, 1) > 0.0);

        let bad = CoordinateDescentConfig::default().with_components(vec![9]);
        assert!(CoordinateDescent::new(bad)
            .expect("Valid config")
            .fit(&ds, &y)
            .is_err());
    }

    #[test]
    fn test_rejects_bad_labels_and_shapes() {
        let (ds, _) = toy();
        let mut solver =
            CoordinateDescent::new(CoordinateDescentConfig::default()).expect("Valid config");
        assert!(matches!(
            solver.fit(&ds, &[1.0, 0.0, 1.0, -1.0, -1.0, -1.0]),
            Err(SolverError::InvalidLabel(_))
        ));
        assert!(matches!(
            solver.fit(&ds, &[1.0, -1.0]),
            Err(SolverError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            solver.fit_multiclass(&ds, &[0, 1, 2, 3, 0, 1], 3),
            Err(SolverError::InvalidClass { class: 3, .. })
        ));
    }

    #[test]
    fn test_cache_kernel_must_match() {
        let (ds, y) = toy();
        let mut cache = KernelRowCache::for_dataset(KernelSpec::Linear, &ds, 1 << 20)
            .expect("Should build cache");
        let mut solver = CoordinateDescent::new(
            CoordinateDescentConfig::default().with_kernel(KernelSpec::Rbf { gamma: 1.0 }),
        )
        .expect("Valid config");
        assert!(solver.fit_with_cache(&ds, &y, &mut cache).is_err());

        let mut linear =
            CoordinateDescent::new(CoordinateDescentConfig::default()).expect("Valid config");
        assert!(linear.fit_with_cache(&ds, &y, &mut cache).is_err());
    }

    #[test]
    fn test_line_search_backtracks() {
        let search = LineSearch {
            sigma: 0.01,
            beta: 0.5,
            max_trials: 5,
        };
        // Accepts once the step is at most a quarter
        let t = search.search(-1.0, |t| if t > 0.25 { 1.0 } else { -t });
        assert_eq!(t, Some(0.25));
        assert_eq!(search.search(-1.0, |_| 1.0), None);
    }
}
