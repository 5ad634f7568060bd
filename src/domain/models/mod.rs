pub mod matrix;
pub mod parameter;
pub mod spectrum;

pub use matrix::{ExperimentMatrix, MatrixError};
pub use parameter::{
    Constraint, ParameterKind, ParameterSpec, ParameterTemplate, ResultUpdate, SetupUpdate,
};
pub use spectrum::{PeakRegion, RegionSet, Spectrum};
