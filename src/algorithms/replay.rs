//! Deterministic strategies: repeat the latest setup, or replay a
//! pre-recorded table row by row.

use ndarray::Array2;
use std::path::{Path, PathBuf};

use crate::domain::models::Constraint;
use crate::domain::ports::errors::{AlgorithmError, Result};
use crate::domain::ports::Algorithm;

/// Returns the last `n_returns` previously supplied parameter rows,
/// unchanged. Used for repeat/validation runs.
#[derive(Debug, Default)]
pub struct Reproduce;

impl Reproduce {
    pub fn new() -> Self {
        Self
    }
}

impl Algorithm for Reproduce {
    fn name(&self) -> &'static str {
        "reproduce"
    }

    fn suggest(
        &mut self,
        parameters: Option<&Array2<f64>>,
        results: Option<&Array2<f64>>,
        constraints: &[Constraint],
        _n_batches: i64,
        n_returns: usize,
    ) -> Result<Array2<f64>> {
        super::validate_history(parameters, results, constraints)?;
        let history = parameters.ok_or_else(|| {
            AlgorithmError::MissingHistory("reproduce needs at least one prior setup".to_string())
        })?;
        if history.nrows() == 0 {
            return Err(AlgorithmError::MissingHistory(
                "reproduce needs at least one prior setup".to_string(),
            ));
        }
        let take = n_returns.min(history.nrows());
        let start = history.nrows() - take;
        let mut out = Array2::zeros((take, history.ncols()));
        for i in 0..take {
            for j in 0..history.ncols() {
                out[[i, j]] = history[[start + i, j]];
            }
        }
        Ok(out)
    }
}

/// Serves rows of a pre-recorded delimited table (header skipped)
/// through a forward-only cursor.
pub struct ReplayFromFile {
    path: PathBuf,
    rows: Vec<Vec<f64>>,
    cursor: usize,
}

impl ReplayFromFile {
    pub fn open(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut rows = Vec::new();
        // First line is the header
        for line in text.lines().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            let row: Vec<f64> = line
                .split(',')
                .map(|cell| {
                    cell.trim().parse::<f64>().map_err(|_| {
                        AlgorithmError::InvalidArgument(format!(
                            "unparseable value {cell:?} in replay table {path:?}"
                        ))
                    })
                })
                .collect::<Result<_>>()?;
            rows.push(row);
        }
        tracing::info!(path = %path.display(), rows = rows.len(), "Loaded replay table");
        Ok(Self {
            path: path.to_path_buf(),
            rows,
            cursor: 0,
        })
    }
}

impl Algorithm for ReplayFromFile {
    fn name(&self) -> &'static str {
        "fromcsv"
    }

    fn suggest(
        &mut self,
        parameters: Option<&Array2<f64>>,
        results: Option<&Array2<f64>>,
        constraints: &[Constraint],
        _n_batches: i64,
        n_returns: usize,
    ) -> Result<Array2<f64>> {
        super::validate_history(parameters, results, constraints)?;
        if self.cursor >= self.rows.len() {
            return Err(AlgorithmError::ExhaustedReplay {
                path: self.path.clone(),
                rows: self.rows.len(),
            });
        }
        let take = n_returns.min(self.rows.len() - self.cursor);
        let mut out = Array2::zeros((take, constraints.len()));
        for i in 0..take {
            let row = &self.rows[self.cursor + i];
            if row.len() < constraints.len() {
                return Err(AlgorithmError::InvalidArgument(format!(
                    "replay row {} has {} values, expected {}",
                    self.cursor + i,
                    row.len(),
                    constraints.len()
                )));
            }
            // Replay tables may carry result columns; only the leading
            // parameter columns are served.
            for j in 0..constraints.len() {
                out[[i, j]] = row[j];
            }
        }
        self.cursor += take;
        Ok(out)
    }
}
