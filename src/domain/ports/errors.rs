use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by concrete optimization algorithms and their registry.
#[derive(Error, Debug)]
pub enum AlgorithmError {
    #[error("unknown algorithm {0:?}; known: random, doe, smbo, ga, reproduce, fromcsv")]
    InvalidAlgorithm(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("constraint count {got} does not match parameter column count {expected}")]
    ConstraintMismatch { expected: usize, got: usize },

    #[error(
        "experiment design exhausted after {served} of {total} rows; \
         supply a new design or switch algorithms"
    )]
    ExhaustedDesign { served: usize, total: usize },

    #[error("replay table {path:?} exhausted after {rows} rows; supply a new table")]
    ExhaustedReplay { path: PathBuf, rows: usize },

    #[error("no history available: {0}")]
    MissingHistory(String),

    #[error("algorithm i/o failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Result type alias for algorithm operations.
pub type Result<T> = std::result::Result<T, AlgorithmError>;
