//! Tunable-parameter domain model.
//!
//! A procedure exposes a set of named parameters (volumes, times,
//! temperatures) grouped into batches. One batch is one parallel
//! experimental lane; all batches share the constraint set of the first.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How an algorithm should draw values for a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// Continuous value anywhere inside the bounds
    #[default]
    Float,
    /// Whole values only, both bounds inclusive
    Integer,
}

impl ParameterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Integer => "integer",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "float" | "f64" => Some(Self::Float),
            "integer" | "int" | "i64" => Some(Self::Integer),
            _ => None,
        }
    }
}

/// One tunable experimental quantity, e.g. the volume of an `Add` step.
///
/// Created once per optimizable step at setup; `current_value` is
/// rewritten by the orchestrator every iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub min_value: f64,
    pub max_value: f64,
    pub current_value: f64,
    #[serde(default)]
    pub kind: ParameterKind,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, min_value: f64, max_value: f64) -> Self {
        Self {
            name: name.into(),
            min_value,
            max_value,
            current_value: min_value,
            kind: ParameterKind::Float,
        }
    }

    pub fn constraint(&self) -> Constraint {
        Constraint {
            min: self.min_value,
            max: self.max_value,
            kind: self.kind,
        }
    }
}

/// (min, max) bound on one parameter, positional with respect to the
/// experiment matrix columns. Read-only once the first batch is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub kind: ParameterKind,
}

impl Constraint {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            kind: ParameterKind::Float,
        }
    }

    pub fn integer(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            kind: ParameterKind::Integer,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Clamp a value into the bounds, honoring the integer kind.
    pub fn clamp(&self, value: f64) -> f64 {
        let v = value.clamp(self.min, self.max);
        match self.kind {
            ParameterKind::Float => v,
            ParameterKind::Integer => v.round().clamp(self.min, self.max),
        }
    }
}

/// Full per-batch parameter description consumed from the procedure
/// engine: `{batch_id: {param_name: ParameterSpec}}`.
///
/// `BTreeMap` keeps batch and parameter iteration order deterministic,
/// which fixes matrix column order at first population.
pub type ParameterTemplate = BTreeMap<String, BTreeMap<String, ParameterSpec>>;

/// Next-iteration values handed back to the procedure engine:
/// `{batch_id: {param_name: value}}`.
pub type SetupUpdate = BTreeMap<String, BTreeMap<String, f64>>;

/// Measured objective values per batch: `{batch_id: {objective: value}}`.
pub type ResultUpdate = BTreeMap<String, BTreeMap<String, f64>>;
