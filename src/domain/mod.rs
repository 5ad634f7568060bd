//! Domain layer for the closed-loop optimization engine.
//!
//! This module contains core business data types and the algorithm
//! strategy contract.

pub mod models;
pub mod ports;

pub use models::{
    Constraint, ExperimentMatrix, ParameterKind, ParameterSpec, ParameterTemplate, PeakRegion,
    RegionSet, ResultUpdate, SetupUpdate, Spectrum,
};
pub use ports::Algorithm;
