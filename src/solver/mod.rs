//! Solver implementations
//!
//! - [`CoordinateDescent`]: primal coordinate descent with L1, L2 and L1/L2
//!   penalties, for linear models and kernel expansions
//! - [`StochasticGradient`]: SGD with learning-rate schedules, one-vs-rest
//!   or joint multiclass updates and random kernel components
//! - [`PrimalNewton`]: Newton iterations for kernel squared-hinge SVMs

pub mod cd;
pub mod newton;
pub mod sgd;
pub mod shrinking;

pub use self::cd::*;
pub use self::newton::*;
pub use self::sgd::*;
pub use self::shrinking::*;
