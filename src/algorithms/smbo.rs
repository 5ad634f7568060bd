//! Sequential model-based optimization.
//!
//! Wraps the Gaussian-process surrogate behind the ask/tell shape the
//! orchestrator expects: per call, only the rows that arrived since the
//! previous call are told to the model (the rest already live inside
//! it), then a new point is proposed by maximizing expected improvement
//! over a seeded random candidate pool.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::domain::models::Constraint;
use crate::domain::ports::algorithm::FULL_HISTORY;
use crate::domain::ports::errors::{AlgorithmError, Result};
use crate::domain::ports::Algorithm;

use super::random_search::draw;
use super::surrogate::{normalize, GaussianProcess};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmboSettings {
    /// Kernel length scale in unit-cube coordinates.
    pub length_scale: f64,
    /// Observation noise added to the kernel diagonal.
    pub noise: f64,
    /// Exploration margin in the expected-improvement acquisition.
    pub xi: f64,
    /// Size of the random candidate pool scanned per suggestion.
    pub candidate_pool: usize,
    /// Most result rows accepted as new evidence per call. Kept
    /// configurable rather than a literal; the engine is
    /// single-objective, so the default is one.
    pub max_result_rows: usize,
    /// Observations required before the surrogate takes over from
    /// random sampling.
    pub warmup: usize,
}

impl Default for SmboSettings {
    fn default() -> Self {
        Self {
            length_scale: 0.2,
            noise: 1e-6,
            xi: 0.01,
            candidate_pool: 512,
            max_result_rows: 1,
            warmup: 2,
        }
    }
}

pub struct Smbo {
    settings: SmboSettings,
    gp: GaussianProcess,
    rng: StdRng,
    /// History rows already inside the model.
    told_rows: usize,
}

impl Smbo {
    pub fn new(settings: SmboSettings, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let gp = GaussianProcess::new(settings.length_scale, settings.noise);
        Self {
            settings,
            gp,
            rng,
            told_rows: 0,
        }
    }

    fn tell_new_rows(
        &mut self,
        parameters: &Array2<f64>,
        results: &Array2<f64>,
        constraints: &[Constraint],
        n_batches: i64,
    ) -> Result<()> {
        if results.ncols() != 1 {
            return Err(AlgorithmError::InvalidArgument(format!(
                "smbo is single-objective; got {} result columns",
                results.ncols()
            )));
        }
        let total = parameters.nrows();
        let new_rows = total.saturating_sub(self.told_rows);
        if new_rows == 0 {
            return Ok(());
        }
        // Full-history recalibration swallows everything untold; the
        // incremental path accepts at most max_result_rows per call.
        if n_batches != FULL_HISTORY && new_rows > self.settings.max_result_rows {
            return Err(AlgorithmError::InvalidArgument(format!(
                "smbo accepts at most {} new result row(s) per call, got {new_rows}",
                self.settings.max_result_rows
            )));
        }
        for row in self.told_rows..total {
            let point = parameters.row(row).to_vec();
            let x = normalize(&point, constraints);
            self.gp.tell(x, results[[row, 0]])?;
        }
        self.told_rows = total;
        tracing::debug!(told = total, "Surrogate updated");
        Ok(())
    }

    fn propose(&mut self, constraints: &[Constraint], n_returns: usize) -> Array2<f64> {
        let k = constraints.len();
        let mut out = Array2::zeros((n_returns, k));
        for r in 0..n_returns {
            let mut best_point: Option<Vec<f64>> = None;
            let mut best_ei = f64::NEG_INFINITY;
            for _ in 0..self.settings.candidate_pool.max(1) {
                let candidate: Vec<f64> =
                    constraints.iter().map(|c| draw(&mut self.rng, c)).collect();
                let ei = self
                    .gp
                    .expected_improvement(&normalize(&candidate, constraints), self.settings.xi);
                if ei > best_ei {
                    best_ei = ei;
                    best_point = Some(candidate);
                }
            }
            if let Some(point) = best_point {
                for (j, v) in point.into_iter().enumerate() {
                    out[[r, j]] = v;
                }
            }
        }
        out
    }
}

impl Algorithm for Smbo {
    fn name(&self) -> &'static str {
        "smbo"
    }

    fn suggest(
        &mut self,
        parameters: Option<&Array2<f64>>,
        results: Option<&Array2<f64>>,
        constraints: &[Constraint],
        n_batches: i64,
        n_returns: usize,
    ) -> Result<Array2<f64>> {
        super::validate_history(parameters, results, constraints)?;
        if let (Some(p), Some(r)) = (parameters, results) {
            self.tell_new_rows(p, r, constraints, n_batches)?;
        }
        if self.gp.len() < self.settings.warmup {
            // Not enough evidence for a useful posterior yet
            let mut out = Array2::zeros((n_returns, constraints.len()));
            for mut row in out.rows_mut() {
                for (cell, c) in row.iter_mut().zip(constraints) {
                    *cell = draw(&mut self.rng, c);
                }
            }
            return Ok(out);
        }
        Ok(self.propose(constraints, n_returns))
    }
}
