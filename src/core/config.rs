//! Solver configuration records
//!
//! Each solver takes one immutable configuration record. Every enumerated
//! option has a `from_name` parser, and `validate()` checks ranges and
//! option combinations before any iteration starts.

use crate::core::{Result, SolverError};
use crate::kernel::KernelSpec;
use crate::loss::{Loss, MulticlassLoss};
use serde::{Deserialize, Serialize};

/// Default kernel cache budget: 500 MB
pub const DEFAULT_CACHE_BYTES: usize = 500 * 1024 * 1024;

/// Regularization penalty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Penalty {
    /// ‖w‖₁, sparse coefficients
    L1,
    /// ½‖w‖²
    L2,
    /// Σ_j ‖W_{·j}‖₂ across classes, whole coordinates switch off together
    L1L2,
}

impl Penalty {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "l1" => Ok(Penalty::L1),
            "l2" => Ok(Penalty::L2),
            "l1/l2" | "l1l2" | "l1-l2" => Ok(Penalty::L1L2),
            other => Err(SolverError::config(format!("unknown penalty '{}'", other))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Penalty::L1 => "l1",
            Penalty::L2 => "l2",
            Penalty::L1L2 => "l1/l2",
        }
    }

    /// Whether the penalty drives coefficients to exactly zero
    pub fn is_sparse(&self) -> bool {
        !matches!(self, Penalty::L2)
    }
}

/// Order in which coordinate descent visits coordinates within a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    /// Ascending index
    Cyclic,
    /// Fresh seeded shuffle every pass
    Permute,
    /// Descending loss contribution, ties in index order
    Loss,
    /// Full pass, then passes over the nonzero coordinates only
    Active,
}

impl Selection {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "cyclic" => Ok(Selection::Cyclic),
            "permute" | "uniform" => Ok(Selection::Permute),
            "loss" => Ok(Selection::Loss),
            "active" => Ok(Selection::Active),
            other => Err(SolverError::config(format!("unknown selection '{}'", other))),
        }
    }
}

/// When coordinate descent stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Run exactly `max_iter` passes
    MaxIterations,
    /// Stop once the largest optimality violation falls under the tolerance
    Convergence,
    /// Stop as soon as this many coordinates are nonzero
    NComponents(usize),
}

impl Termination {
    /// Parse a termination name; `n_components` is used by `n_components`
    pub fn from_name(name: &str, n_components: usize) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "max_iter" | "max_iterations" => Ok(Termination::MaxIterations),
            "convergence" | "violation" | "violation_max" => Ok(Termination::Convergence),
            "n_components" | "n-components" => Ok(Termination::NComponents(n_components)),
            other => Err(SolverError::config(format!("unknown termination '{}'", other))),
        }
    }
}

/// SGD step size schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LearningRate {
    /// η = η0
    Constant,
    /// η_t = 1 / (λ t)
    Pegasos,
    /// η_t = η0 / t^power_t
    InvScaling,
}

impl LearningRate {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "constant" => Ok(LearningRate::Constant),
            "pegasos" => Ok(LearningRate::Pegasos),
            "invscaling" | "inv_scaling" => Ok(LearningRate::InvScaling),
            other => Err(SolverError::config(format!(
                "unknown learning rate '{}'",
                other
            ))),
        }
    }
}

/// Initial SGD step size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Eta0 {
    Value(f64),
    /// Derived from the loss diameter and gradient bounds before the loop
    Auto,
}

impl Eta0 {
    pub fn from_name(name: &str) -> Result<Self> {
        if name.eq_ignore_ascii_case("auto") {
            return Ok(Eta0::Auto);
        }
        name.parse::<f64>()
            .map(Eta0::Value)
            .map_err(|_| SolverError::config(format!("invalid eta0 '{}'", name)))
    }
}

/// How SGD handles more than two classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Multiclass {
    OneVsRest,
    /// Joint update of all class rows with a multiclass loss
    Natural,
}

impl Multiclass {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "one-vs-rest" | "ovr" | "one_vs_rest" => Ok(Multiclass::OneVsRest),
            "natural" => Ok(Multiclass::Natural),
            other => Err(SolverError::config(format!(
                "unknown multiclass strategy '{}'",
                other
            ))),
        }
    }
}

/// Configuration for the primal coordinate descent solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateDescentConfig {
    /// Weight of the data term against the penalty
    pub c: f64,
    pub loss: Loss,
    pub penalty: Penalty,
    /// `Some` switches to kernel mode: coordinates are sample indices
    pub kernel: Option<KernelSpec>,
    pub selection: Selection,
    pub termination: Termination,
    /// Relative tolerance on the largest optimality violation
    pub tol: f64,
    /// Maximum number of outer passes
    pub max_iter: usize,
    pub shrinking: bool,
    /// Consecutive passes a coordinate must look inactive before it is shrunk
    pub shrinking_window: usize,
    /// Passes between re-scans of shrunk coordinates
    pub unshrink_interval: usize,
    /// Line search trials before a step is abandoned
    pub max_line_search: usize,
    /// Armijo sufficient decrease constant
    pub sigma: f64,
    /// Line search backtracking factor
    pub beta: f64,
    /// Kernel cache budget in bytes
    pub cache_bytes: usize,
    /// Keep coefficients between fits with the same shape
    pub warm_start: bool,
    /// Refit the selected support with an L2 penalty and this C
    pub debias_c: Option<f64>,
    /// Restrict the coordinates to these indices
    pub components: Option<Vec<usize>>,
    pub seed: u64,
}

impl Default for CoordinateDescentConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            loss: Loss::SquaredHinge { threshold: 1.0 },
            penalty: Penalty::L2,
            kernel: None,
            selection: Selection::Cyclic,
            termination: Termination::Convergence,
            tol: 1e-3,
            max_iter: 50,
            shrinking: true,
            shrinking_window: 2,
            unshrink_interval: 10,
            max_line_search: 30,
            sigma: 0.01,
            beta: 0.5,
            cache_bytes: DEFAULT_CACHE_BYTES,
            warm_start: false,
            debias_c: None,
            components: None,
            seed: 0,
        }
    }
}

impl CoordinateDescentConfig {
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_loss(mut self, loss: Loss) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_penalty(mut self, penalty: Penalty) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn with_kernel(mut self, kernel: KernelSpec) -> Self {
        self.kernel = Some(kernel);
        self
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_shrinking(mut self, shrinking: bool) -> Self {
        self.shrinking = shrinking;
        self
    }

    pub fn with_cache_bytes(mut self, cache_bytes: usize) -> Self {
        self.cache_bytes = cache_bytes;
        self
    }

    pub fn with_warm_start(mut self, warm_start: bool) -> Self {
        self.warm_start = warm_start;
        self
    }

    pub fn with_debias(mut self, debias_c: f64) -> Self {
        self.debias_c = Some(debias_c);
        self
    }

    pub fn with_components(mut self, components: Vec<usize>) -> Self {
        self.components = Some(components);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        positive("C", self.c)?;
        positive("tol", self.tol)?;
        if self.max_iter == 0 {
            return Err(SolverError::config("max_iter must be at least 1"));
        }
        if self.max_line_search == 0 {
            return Err(SolverError::config("max_line_search must be at least 1"));
        }
        if !(self.sigma > 0.0 && self.sigma < 1.0) {
            return Err(SolverError::config("sigma must lie in (0, 1)"));
        }
        if !(self.beta > 0.0 && self.beta < 1.0) {
            return Err(SolverError::config("beta must lie in (0, 1)"));
        }
        if self.shrinking_window == 0 || self.unshrink_interval == 0 {
            return Err(SolverError::config(
                "shrinking_window and unshrink_interval must be at least 1",
            ));
        }

        self.loss.validate()?;
        if !self.loss.supports_coordinate_descent() {
            return Err(SolverError::config(format!(
                "loss '{}' is not differentiable and cannot be used with coordinate descent",
                self.loss.name()
            )));
        }
        if self.penalty == Penalty::L1L2 {
            let multiclass = MulticlassLoss::from_binary(&self.loss)?;
            if !multiclass.supports_coordinate_descent() {
                return Err(SolverError::config(format!(
                    "penalty 'l1/l2' needs a smooth multiclass loss, got '{}'",
                    self.loss.name()
                )));
            }
        }

        if let Some(kernel) = &self.kernel {
            kernel.validate()?;
        }
        if let Termination::NComponents(0) = self.termination {
            return Err(SolverError::config("n_components must be at least 1"));
        }
        if let Some(debias_c) = self.debias_c {
            positive("debias C", debias_c)?;
            if self.penalty == Penalty::L2 {
                return Err(SolverError::config(
                    "debiasing refits a sparse solution and needs an l1 or l1/l2 penalty",
                ));
            }
        }
        if let Some(components) = &self.components {
            if components.is_empty() {
                return Err(SolverError::config("components must not be empty"));
            }
        }
        Ok(())
    }
}

/// Configuration for the stochastic gradient solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgdConfig {
    pub loss: Loss,
    pub penalty: Penalty,
    pub multiclass: Multiclass,
    /// Regularization strength
    pub lambda: f64,
    /// `Some` switches to kernel mode: coefficients live in sample space
    pub kernel: Option<KernelSpec>,
    pub learning_rate: LearningRate,
    pub eta0: Eta0,
    pub power_t: f64,
    pub fit_intercept: bool,
    /// Scale applied to intercept steps
    pub intercept_decay: f64,
    /// Number of randomly chosen kernel components, 0 disables
    pub n_components: usize,
    /// Number of epochs
    pub max_iter: usize,
    pub seed: u64,
    pub cache_bytes: usize,
}

impl Default for SgdConfig {
    fn default() -> Self {
        Self {
            loss: Loss::Hinge { threshold: 1.0 },
            penalty: Penalty::L2,
            multiclass: Multiclass::OneVsRest,
            lambda: 0.01,
            kernel: None,
            learning_rate: LearningRate::Pegasos,
            eta0: Eta0::Value(0.03),
            power_t: 0.5,
            fit_intercept: true,
            intercept_decay: 1.0,
            n_components: 0,
            max_iter: 10,
            seed: 0,
            cache_bytes: DEFAULT_CACHE_BYTES,
        }
    }
}

impl SgdConfig {
    pub fn with_loss(mut self, loss: Loss) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_penalty(mut self, penalty: Penalty) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn with_multiclass(mut self, multiclass: Multiclass) -> Self {
        self.multiclass = multiclass;
        self
    }

    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn with_kernel(mut self, kernel: KernelSpec) -> Self {
        self.kernel = Some(kernel);
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: LearningRate) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_eta0(mut self, eta0: Eta0) -> Self {
        self.eta0 = eta0;
        self
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    pub fn with_n_components(mut self, n_components: usize) -> Self {
        self.n_components = n_components;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_cache_bytes(mut self, cache_bytes: usize) -> Self {
        self.cache_bytes = cache_bytes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.loss.validate()?;
        if !(self.lambda >= 0.0 && self.lambda.is_finite()) {
            return Err(SolverError::config(format!(
                "lambda must be non-negative, got {}",
                self.lambda
            )));
        }
        if self.max_iter == 0 {
            return Err(SolverError::config("max_iter must be at least 1"));
        }
        if !(self.power_t >= 0.0 && self.power_t.is_finite()) {
            return Err(SolverError::config("power_t must be non-negative"));
        }
        if !(self.intercept_decay >= 0.0 && self.intercept_decay.is_finite()) {
            return Err(SolverError::config("intercept_decay must be non-negative"));
        }
        if self.learning_rate == LearningRate::Pegasos && self.lambda <= 0.0 {
            return Err(SolverError::config(
                "the pegasos learning rate needs a positive lambda",
            ));
        }

        match self.eta0 {
            Eta0::Value(eta0) => positive("eta0", eta0)?,
            Eta0::Auto => {
                if self.lambda <= 0.0 {
                    return Err(SolverError::config("automatic eta0 needs a positive lambda"));
                }
                let bounded = match self.multiclass {
                    Multiclass::Natural => MulticlassLoss::from_binary(&self.loss)?
                        .max_gradient(&[1.0])
                        .is_some(),
                    Multiclass::OneVsRest => self.loss.lipschitz().is_some(),
                };
                if !bounded {
                    return Err(SolverError::config(format!(
                        "automatic eta0 needs a loss with bounded gradient, got '{}'",
                        self.loss.name()
                    )));
                }
            }
        }

        if self.multiclass == Multiclass::Natural {
            MulticlassLoss::from_binary(&self.loss)?;
        }
        if let Some(kernel) = &self.kernel {
            kernel.validate()?;
        }
        if self.n_components > 0 && self.kernel.is_none() {
            return Err(SolverError::config(
                "n_components selects kernel components and needs a kernel",
            ));
        }
        Ok(())
    }
}

/// Configuration for the primal Newton kernel solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewtonConfig {
    /// Ridge added to the kernel block
    pub lambda: f64,
    pub kernel: KernelSpec,
    /// Maximum number of Newton iterations
    pub max_iter: usize,
    /// Relative residual tolerance of the conjugate gradient solves
    pub tol: f64,
    /// Jacobi-precondition the conjugate gradient solves
    pub preconditioning: bool,
    /// Iteration cap of each conjugate gradient solve
    pub cg_max_iter: usize,
    pub cache_bytes: usize,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            lambda: 1.0,
            kernel: KernelSpec::Linear,
            max_iter: 50,
            tol: 1e-3,
            preconditioning: false,
            cg_max_iter: 1000,
            cache_bytes: DEFAULT_CACHE_BYTES,
        }
    }
}

impl NewtonConfig {
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn with_kernel(mut self, kernel: KernelSpec) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_preconditioning(mut self, preconditioning: bool) -> Self {
        self.preconditioning = preconditioning;
        self
    }

    pub fn validate(&self) -> Result<()> {
        positive("lambda", self.lambda)?;
        positive("tol", self.tol)?;
        if self.max_iter == 0 || self.cg_max_iter == 0 {
            return Err(SolverError::config(
                "max_iter and cg_max_iter must be at least 1",
            ));
        }
        self.kernel.validate()
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(SolverError::config(format!(
            "{} must be positive and finite, got {}",
            name, value
        )))
    }
}
