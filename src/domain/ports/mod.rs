//! Port trait definitions (Hexagonal Architecture).
//!
//! The only seam in this crate is the [`Algorithm`] strategy trait: the
//! orchestrator coordinates named parameters and experiment matrices
//! without knowing which concrete optimizer is behind the contract.

pub mod algorithm;
pub mod errors;

pub use algorithm::{Algorithm, FULL_HISTORY};
pub use errors::AlgorithmError;
