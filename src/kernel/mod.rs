//! Kernel functions and the kernel specification used by the solvers

pub mod linear;
pub mod polynomial;
pub mod rbf;
pub mod sigmoid;
pub mod spec;
pub mod traits;

pub use self::linear::*;
pub use self::polynomial::*;
pub use self::rbf::*;
pub use self::sigmoid::*;
pub use self::spec::*;
pub use self::traits::*;
