//! Closed-loop optimization engine for automated chemistry platforms.
//!
//! Couples black-box optimization algorithms to automated reaction
//! execution: the orchestrator translates between named per-batch
//! parameter templates and the positional numeric arrays the algorithms
//! operate on, while the analysis layer turns raw spectra into the
//! scalar objectives that close the loop.
//!
//! # Architecture
//!
//! The crate follows a hexagonal layout:
//! - `domain`: core data types and the [`Algorithm`] strategy contract
//! - `algorithms`: local strategies (random search, experimental
//!   designs, model-based optimization, genetic search, replay)
//! - `analysis`: spectral region detection, novelty scoring, and loss
//!   function dispatch
//! - `services`: the [`AlgorithmOrchestrator`] coordination layer
//! - `infrastructure`: configuration, logging, and the TCP client for
//!   the remote optimization service

pub mod algorithms;
pub mod analysis;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use algorithms::{AlgorithmKind, AlgorithmSettings};
pub use domain::models::{
    Constraint, ExperimentMatrix, ParameterSpec, ParameterTemplate, ResultUpdate, SetupUpdate,
    Spectrum,
};
pub use domain::ports::{Algorithm, AlgorithmError};
pub use infrastructure::{ConfigLoader, OptimizerConfig, RemoteAlgorithmClient, RemoteSettings};
pub use services::AlgorithmOrchestrator;
