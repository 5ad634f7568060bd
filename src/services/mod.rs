//! Service layer: coordination between the domain and the algorithms.

pub mod orchestrator;

pub use orchestrator::{AlgorithmOrchestrator, OrchestratorError};
