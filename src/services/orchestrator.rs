//! Algorithm orchestrator.
//!
//! Owns the mapping between the named per-batch parameter template the
//! procedure engine speaks and the positional numeric arrays the
//! algorithms require, owns the experiment matrices, selects local or
//! remote execution, and persists per-iteration artifacts.
//!
//! Single writer: the orchestrator alone mutates its matrices and
//! current setup; algorithms only ever see immutable array views.

use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::algorithms::{self, AlgorithmSettings};
use crate::domain::models::{
    Constraint, ExperimentMatrix, MatrixError, ParameterTemplate, ResultUpdate, SetupUpdate,
};
use crate::domain::ports::algorithm::FULL_HISTORY;
use crate::domain::ports::{Algorithm, AlgorithmError};
use crate::infrastructure::remote::{
    AlgorithmSpec, RemoteAlgorithmClient, RemoteError, RemoteRequest,
};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("orchestrator used before initialize()")]
    NotInitialized,

    #[error("parameter template has no batches")]
    EmptyTemplate,

    #[error("batch {0:?} missing from update")]
    MissingBatch(String),

    #[error("parameter {name:?} missing from batch {batch:?}")]
    MissingParameter { batch: String, name: String },

    #[error(transparent)]
    Algorithm(#[from] AlgorithmError),

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("artifact i/o failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("artifact serialization failed: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

type Result<T> = std::result::Result<T, OrchestratorError>;

enum Backend {
    /// Local algorithm not yet built (constraints arrive at initialize).
    Pending(AlgorithmSettings),
    Local(Box<dyn Algorithm>),
    Remote {
        client: RemoteAlgorithmClient,
        spec: AlgorithmSpec,
    },
}

pub struct AlgorithmOrchestrator {
    backend: Backend,
    procedure_hash: String,
    initialized: bool,
    /// Forces one full-history recalibration on the next suggestion.
    preload: bool,

    batch_ids: Vec<String>,
    parameter_names: Vec<String>,
    objective_names: Vec<String>,
    constraints: Vec<Constraint>,

    matrix: Option<ExperimentMatrix>,
    current_setup: SetupUpdate,
    current_result: ResultUpdate,
    template_snapshot: ParameterTemplate,
    strategy: Option<serde_json::Value>,
}

impl AlgorithmOrchestrator {
    /// Orchestrate a locally built algorithm.
    pub fn local(settings: AlgorithmSettings) -> Self {
        Self::with_backend(Backend::Pending(settings))
    }

    /// Orchestrate through the remote optimization service.
    pub fn remote(client: RemoteAlgorithmClient, spec: AlgorithmSpec) -> Self {
        Self::with_backend(Backend::Remote { client, spec })
    }

    fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            procedure_hash: String::new(),
            initialized: false,
            preload: false,
            batch_ids: Vec::new(),
            parameter_names: Vec::new(),
            objective_names: Vec::new(),
            constraints: Vec::new(),
            matrix: None,
            current_setup: SetupUpdate::new(),
            current_result: ResultUpdate::new(),
            template_snapshot: ParameterTemplate::new(),
            strategy: None,
        }
    }

    /// Establish constraints and column order from the first batch and
    /// build (or handshake) the selected algorithm. Idempotent per run.
    pub async fn initialize(
        &mut self,
        template: &ParameterTemplate,
        procedure_hash: &str,
    ) -> Result<()> {
        if self.initialized {
            tracing::debug!("Orchestrator already initialized, skipping");
            return Ok(());
        }
        let (first_batch, first_params) =
            template.iter().next().ok_or(OrchestratorError::EmptyTemplate)?;

        self.batch_ids = template.keys().cloned().collect();
        self.parameter_names = first_params.keys().cloned().collect();
        // Constraints are sourced from the first batch only; lanes are
        // assumed to share them.
        self.constraints = first_params.values().map(|p| p.constraint()).collect();
        self.procedure_hash = procedure_hash.to_string();
        self.load_setup(template)?;
        self.template_snapshot = template.clone();

        match &mut self.backend {
            Backend::Pending(settings) => {
                let algorithm = algorithms::build(settings, &self.constraints)?;
                self.backend = Backend::Local(algorithm);
            }
            Backend::Local(_) => {}
            Backend::Remote { client, spec } => {
                let strategy = client.initialize(procedure_hash, spec.clone()).await?;
                tracing::info!(strategy = %strategy, "Remote strategy negotiated");
                self.strategy = Some(strategy);
            }
        }

        self.initialized = true;
        tracing::info!(
            batches = self.batch_ids.len(),
            parameters = self.parameter_names.len(),
            constraints_from = %first_batch,
            "Orchestrator initialized"
        );
        Ok(())
    }

    /// Refresh the latest setup and, when a result is supplied, append
    /// one experiment row per batch to the matrices.
    pub fn load_data(
        &mut self,
        template: &ParameterTemplate,
        result: Option<&ResultUpdate>,
    ) -> Result<()> {
        if !self.initialized {
            return Err(OrchestratorError::NotInitialized);
        }
        self.load_setup(template)?;
        self.template_snapshot = template.clone();

        let Some(result) = result else {
            return Ok(());
        };

        if self.objective_names.is_empty() {
            let first = result
                .values()
                .next()
                .ok_or_else(|| OrchestratorError::MissingBatch("<empty result>".to_string()))?;
            self.objective_names = first.keys().cloned().collect();
            self.matrix = Some(ExperimentMatrix::new(
                self.parameter_names.clone(),
                self.objective_names.clone(),
            ));
        }

        // Batch-key order keeps setup and result rows corresponding.
        for batch in &self.batch_ids.clone() {
            let setup_row = self.setup_row(batch)?;
            let result_row = self.result_row(batch, result)?;
            let matrix = self.matrix.as_mut().ok_or(OrchestratorError::NotInitialized)?;
            matrix.push_row(&setup_row, &result_row)?;
        }
        self.current_result = result.clone();
        let rows = self.matrix.as_ref().map(ExperimentMatrix::n_rows).unwrap_or(0);
        tracing::debug!(rows, "Experiment matrices updated");
        Ok(())
    }

    /// Force the next suggestion to recalibrate on the full history.
    /// Used after bulk-loading prior runs or switching algorithms.
    pub fn mark_preload(&mut self) {
        self.preload = true;
    }

    /// Swap the local algorithm mid-experiment; the next suggestion
    /// recalibrates on the full history.
    pub fn switch_algorithm(&mut self, settings: AlgorithmSettings) -> Result<()> {
        if !self.initialized {
            return Err(OrchestratorError::NotInitialized);
        }
        let algorithm = algorithms::build(&settings, &self.constraints)?;
        tracing::info!(algorithm = algorithm.name(), "Switched algorithm");
        self.backend = Backend::Local(algorithm);
        self.preload = true;
        Ok(())
    }

    /// Remote strategy descriptor, when one has been negotiated.
    pub fn strategy(&self) -> Option<&serde_json::Value> {
        self.strategy.as_ref()
    }

    pub fn matrix(&self) -> Option<&ExperimentMatrix> {
        self.matrix.as_ref()
    }

    /// Produce the next named setup, one row per batch.
    ///
    /// A remote exception payload leaves all state untouched and
    /// returns the previous setup with a warning; remote timeouts and
    /// disconnects are fatal for the iteration and propagate.
    pub async fn get_next_setup(&mut self) -> Result<SetupUpdate> {
        if !self.initialized {
            return Err(OrchestratorError::NotInitialized);
        }
        let n_returns = self.batch_ids.len();
        let n_batches = if self.preload {
            self.preload = false;
            FULL_HISTORY
        } else {
            n_returns as i64
        };

        let rows = match &mut self.backend {
            Backend::Pending(_) => return Err(OrchestratorError::NotInitialized),
            Backend::Local(algorithm) => {
                let (parameters, results) = match &self.matrix {
                    Some(m) if !m.is_empty() => (Some(m.parameters()), Some(m.results())),
                    _ => (None, None),
                };
                algorithm.suggest(parameters, results, &self.constraints, n_batches, n_returns)?
            }
            Backend::Remote { client, .. } => {
                let request = RemoteRequest {
                    hash: self.procedure_hash.clone(),
                    parameters: Some(named_columns(
                        &self.current_setup,
                        &self.batch_ids,
                        &self.parameter_names,
                    )),
                    result: if self.current_result.is_empty() {
                        None
                    } else {
                        Some(named_columns(
                            &self.current_result,
                            &self.batch_ids,
                            &self.objective_names,
                        ))
                    },
                    target: None,
                    batch_size: n_returns,
                    n_batches,
                    algorithm: None,
                };
                match client.request(&request).await {
                    Ok(reply) => {
                        if let Some(strategy) = reply.strategy.clone() {
                            self.strategy = Some(strategy);
                        }
                        let mut rows =
                            ndarray::Array2::zeros((n_returns, self.parameter_names.len()));
                        for (j, name) in self.parameter_names.iter().enumerate() {
                            let values = reply.setup.get(name).ok_or_else(|| {
                                RemoteError::BadFrame(format!("reply missing parameter {name:?}"))
                            })?;
                            for i in 0..n_returns {
                                rows[[i, j]] =
                                    *values.get(i).or_else(|| values.last()).unwrap_or(&0.0);
                            }
                        }
                        rows
                    }
                    Err(RemoteError::ServerException(message)) => {
                        // Recoverable: keep the previous setup intact. A
                        // consumed preload must survive the failed
                        // round-trip so the next attempt still
                        // recalibrates on the full history.
                        tracing::warn!(
                            error = %message,
                            "Remote optimization failed, retaining previous setup"
                        );
                        if n_batches == FULL_HISTORY {
                            self.preload = true;
                        }
                        return Ok(self.current_setup.clone());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        // An algorithm may legitimately run out of novel candidates
        // (e.g. a genetic search over a fully evaluated discrete space)
        // and return zero rows; treat that like a recoverable failure
        // rather than indexing into an empty array.
        if rows.nrows() == 0 {
            tracing::warn!("Algorithm produced no candidates, retaining previous setup");
            return Ok(self.current_setup.clone());
        }

        let mut setup = SetupUpdate::new();
        for (i, batch) in self.batch_ids.iter().enumerate() {
            let row_idx = i.min(rows.nrows() - 1);
            let mut values = BTreeMap::new();
            for (j, name) in self.parameter_names.iter().enumerate() {
                values.insert(name.clone(), rows[[row_idx, j]]);
            }
            setup.insert(batch.clone(), values);
        }
        self.current_setup = setup.clone();
        Ok(setup)
    }

    /// Persist the iteration artifacts: the experiment table (header =
    /// parameter names then objective names, 4-decimal values), the
    /// parameter-template snapshot, and the remote strategy when one
    /// exists.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        if let Some(matrix) = &self.matrix {
            matrix.save(&dir.join("experiments.csv"))?;
        }
        let template = serde_json::to_string_pretty(&self.template_snapshot)?;
        std::fs::write(dir.join("parameters.json"), template)?;
        if let Some(strategy) = &self.strategy {
            let doc = serde_json::to_string_pretty(&json!({ "strategy": strategy }))?;
            std::fs::write(dir.join("strategy.json"), doc)?;
        }
        tracing::info!(dir = %dir.display(), "Iteration artifacts saved");
        Ok(())
    }

    fn load_setup(&mut self, template: &ParameterTemplate) -> Result<()> {
        let mut setup = SetupUpdate::new();
        for batch in &self.batch_ids {
            let params = template
                .get(batch)
                .ok_or_else(|| OrchestratorError::MissingBatch(batch.clone()))?;
            let mut values = BTreeMap::new();
            for name in &self.parameter_names {
                let spec = params.get(name).ok_or_else(|| {
                    OrchestratorError::MissingParameter {
                        batch: batch.clone(),
                        name: name.clone(),
                    }
                })?;
                values.insert(name.clone(), spec.current_value);
            }
            setup.insert(batch.clone(), values);
        }
        self.current_setup = setup;
        Ok(())
    }

    fn setup_row(&self, batch: &str) -> Result<Vec<f64>> {
        let values = self
            .current_setup
            .get(batch)
            .ok_or_else(|| OrchestratorError::MissingBatch(batch.to_string()))?;
        self.parameter_names
            .iter()
            .map(|name| {
                values
                    .get(name)
                    .copied()
                    .ok_or_else(|| OrchestratorError::MissingParameter {
                        batch: batch.to_string(),
                        name: name.clone(),
                    })
            })
            .collect()
    }

    fn result_row(&self, batch: &str, result: &ResultUpdate) -> Result<Vec<f64>> {
        let values = result
            .get(batch)
            .ok_or_else(|| OrchestratorError::MissingBatch(batch.to_string()))?;
        self.objective_names
            .iter()
            .map(|name| {
                values
                    .get(name)
                    .copied()
                    .ok_or_else(|| OrchestratorError::MissingParameter {
                        batch: batch.to_string(),
                        name: name.clone(),
                    })
            })
            .collect()
    }
}

/// Rearrange `{batch: {name: value}}` into `{name: [value per batch]}`
/// for the wire protocol, preserving batch order.
fn named_columns(
    data: &BTreeMap<String, BTreeMap<String, f64>>,
    batch_ids: &[String],
    names: &[String],
) -> BTreeMap<String, Vec<f64>> {
    let mut columns = BTreeMap::new();
    for name in names {
        let values: Vec<f64> = batch_ids
            .iter()
            .filter_map(|batch| data.get(batch).and_then(|v| v.get(name)).copied())
            .collect();
        columns.insert(name.clone(), values);
    }
    columns
}
