//! Concrete black-box optimization strategies and their registry.
//!
//! Algorithm selection is a closed enum resolved once at setup: an
//! unknown name is a fatal configuration error, never a silent default.

pub mod doe;
pub mod genetic;
pub mod random_search;
pub mod replay;
pub mod smbo;
pub mod surrogate;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::models::{Constraint, ParameterKind};
use crate::domain::ports::errors::{AlgorithmError, Result};
use crate::domain::ports::Algorithm;

pub use doe::{DesignOfExperiments, DesignType, DoeSettings};
pub use genetic::{GeneticAlgorithm, GeneticSettings};
pub use random_search::RandomSearch;
pub use replay::{ReplayFromFile, Reproduce};
pub use smbo::{Smbo, SmboSettings};

/// Closed set of selectable strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    Random,
    Doe,
    Smbo,
    Ga,
    Reproduce,
    FromCsv,
}

impl AlgorithmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Doe => "doe",
            Self::Smbo => "smbo",
            Self::Ga => "ga",
            Self::Reproduce => "reproduce",
            Self::FromCsv => "fromcsv",
        }
    }
}

impl std::str::FromStr for AlgorithmKind {
    type Err = AlgorithmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "random" | "random_search" => Ok(Self::Random),
            "doe" | "design_of_experiments" => Ok(Self::Doe),
            "smbo" | "sequential_model_based" => Ok(Self::Smbo),
            "ga" | "genetic" => Ok(Self::Ga),
            "reproduce" => Ok(Self::Reproduce),
            "fromcsv" | "replay" => Ok(Self::FromCsv),
            other => Err(AlgorithmError::InvalidAlgorithm(other.to_string())),
        }
    }
}

/// Per-run algorithm configuration, loadable through the config layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgorithmSettings {
    /// Strategy name, parsed into [`AlgorithmKind`] at setup.
    pub name: String,
    /// Seed for every stochastic draw; `None` seeds from entropy.
    pub seed: Option<u64>,
    pub doe: DoeSettings,
    pub smbo: SmboSettings,
    pub ga: GeneticSettings,
    /// Replay table for `fromcsv`.
    pub replay_path: Option<PathBuf>,
}

impl Default for AlgorithmSettings {
    fn default() -> Self {
        Self {
            name: "random".to_string(),
            seed: None,
            doe: DoeSettings::default(),
            smbo: SmboSettings::default(),
            ga: GeneticSettings::default(),
            replay_path: None,
        }
    }
}

/// Build the configured strategy. This is the single dispatch point:
/// every variant is constructed here or not at all.
pub fn build(settings: &AlgorithmSettings, constraints: &[Constraint]) -> Result<Box<dyn Algorithm>> {
    validate_constraints(constraints)?;
    let kind: AlgorithmKind = settings.name.parse()?;
    tracing::info!(algorithm = kind.as_str(), "Building local algorithm");
    match kind {
        AlgorithmKind::Random => Ok(Box::new(RandomSearch::new(settings.seed))),
        AlgorithmKind::Doe => Ok(Box::new(DesignOfExperiments::new(
            settings.doe.clone(),
            constraints,
            settings.seed,
        )?)),
        AlgorithmKind::Smbo => Ok(Box::new(Smbo::new(settings.smbo.clone(), settings.seed))),
        AlgorithmKind::Ga => Ok(Box::new(GeneticAlgorithm::new(
            settings.ga.clone(),
            settings.seed,
        ))),
        AlgorithmKind::Reproduce => Ok(Box::new(Reproduce::new())),
        AlgorithmKind::FromCsv => {
            let path = settings.replay_path.as_ref().ok_or_else(|| {
                AlgorithmError::InvalidArgument("fromcsv requires replay_path".to_string())
            })?;
            Ok(Box::new(ReplayFromFile::open(path)?))
        }
    }
}

/// Reject constraint sets no algorithm can draw from: inverted bounds,
/// or an integer range containing no whole value.
pub(crate) fn validate_constraints(constraints: &[Constraint]) -> Result<()> {
    for (i, c) in constraints.iter().enumerate() {
        if c.max < c.min {
            return Err(AlgorithmError::InvalidArgument(format!(
                "constraint {i} has inverted bounds [{}, {}]",
                c.min, c.max
            )));
        }
        if c.kind == ParameterKind::Integer && c.min.ceil() > c.max.floor() {
            return Err(AlgorithmError::InvalidArgument(format!(
                "integer constraint {i} admits no whole value in [{}, {}]",
                c.min, c.max
            )));
        }
    }
    Ok(())
}

/// Shared precondition check: constraints align positionally with the
/// parameter columns, and parameter/result row counts agree.
pub(crate) fn validate_history(
    parameters: Option<&ndarray::Array2<f64>>,
    results: Option<&ndarray::Array2<f64>>,
    constraints: &[Constraint],
) -> Result<()> {
    if constraints.is_empty() {
        return Err(AlgorithmError::InvalidArgument(
            "empty constraint set".to_string(),
        ));
    }
    validate_constraints(constraints)?;
    if let Some(p) = parameters {
        if p.ncols() != constraints.len() {
            return Err(AlgorithmError::ConstraintMismatch {
                expected: p.ncols(),
                got: constraints.len(),
            });
        }
        if let Some(r) = results {
            if r.nrows() != p.nrows() {
                return Err(AlgorithmError::InvalidArgument(format!(
                    "parameter rows ({}) and result rows ({}) differ",
                    p.nrows(),
                    r.nrows()
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_name_is_fatal() {
        let err = "gradient_descent".parse::<AlgorithmKind>().unwrap_err();
        assert!(matches!(err, AlgorithmError::InvalidAlgorithm(_)));
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!(
            "design_of_experiments".parse::<AlgorithmKind>().unwrap(),
            AlgorithmKind::Doe
        );
        assert_eq!("replay".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::FromCsv);
    }

    #[test]
    fn integer_constraint_without_whole_values_is_rejected() {
        let settings = AlgorithmSettings::default();
        // ceil(1.2) > floor(1.8): no integer fits
        let constraints = [Constraint::integer(1.2, 1.8)];
        let err = build(&settings, &constraints).unwrap_err();
        assert!(matches!(err, AlgorithmError::InvalidArgument(_)));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let settings = AlgorithmSettings::default();
        let constraints = [Constraint::new(2.0, 1.0)];
        assert!(build(&settings, &constraints).is_err());
    }

    #[test]
    fn build_rejects_fromcsv_without_path() {
        let settings = AlgorithmSettings {
            name: "fromcsv".to_string(),
            ..Default::default()
        };
        let constraints = [Constraint::new(0.0, 1.0)];
        assert!(build(&settings, &constraints).is_err());
    }
}
