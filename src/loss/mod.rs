//! Loss functions for the binary and joint multiclass problems

pub mod binary;
pub mod multiclass;

pub use self::binary::Loss;
pub use self::multiclass::MulticlassLoss;
