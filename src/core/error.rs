//! Error types for the solvers and their collaborators

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cache capacity of {capacity_bytes} bytes is below one kernel row ({row_bytes} bytes)")]
    Capacity {
        capacity_bytes: usize,
        row_bytes: usize,
    },

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Invalid label: expected -1 or +1, got {0}")]
    InvalidLabel(f64),

    #[error("Invalid class index {class}: expected a value below {n_classes}")]
    InvalidClass { class: usize, n_classes: usize },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl SolverError {
    /// Shorthand for configuration errors built from formatted text
    pub fn config(message: impl Into<String>) -> Self {
        SolverError::Configuration(message.into())
    }
}

pub type Result<T> = std::result::Result<T, SolverError>;
