//! Experiment bookkeeping matrices.
//!
//! Two parallel 2-D tables: parameter rows and result rows, one row per
//! completed experiment across all batches. Row counts stay equal after
//! every update and column order is fixed at first population — the
//! algorithms rely on column identity, not name, once handed a raw array.

use ndarray::{Array2, ArrayView1, Axis};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("row has {got} values but matrix has {expected} columns")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("experiment table i/o failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("unparseable value {value:?} at row {row}, column {column}")]
    Parse {
        value: String,
        row: usize,
        column: usize,
    },

    #[error("experiment table is missing a header row")]
    MissingHeader,
}

/// Paired parameter/result history for one optimization run.
#[derive(Debug, Clone, Default)]
pub struct ExperimentMatrix {
    pub parameter_names: Vec<String>,
    pub result_names: Vec<String>,
    parameters: Array2<f64>,
    results: Array2<f64>,
}

impl ExperimentMatrix {
    /// Create an empty matrix with fixed column orders.
    pub fn new(parameter_names: Vec<String>, result_names: Vec<String>) -> Self {
        let n_params = parameter_names.len();
        let n_results = result_names.len();
        Self {
            parameter_names,
            result_names,
            parameters: Array2::zeros((0, n_params)),
            results: Array2::zeros((0, n_results)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.nrows() == 0
    }

    pub fn n_rows(&self) -> usize {
        self.parameters.nrows()
    }

    pub fn parameters(&self) -> &Array2<f64> {
        &self.parameters
    }

    pub fn results(&self) -> &Array2<f64> {
        &self.results
    }

    /// Append one completed experiment. Both rows land together so the
    /// row-count invariant holds even on error.
    pub fn push_row(&mut self, parameters: &[f64], results: &[f64]) -> Result<(), MatrixError> {
        if parameters.len() != self.parameter_names.len() {
            return Err(MatrixError::ShapeMismatch {
                expected: self.parameter_names.len(),
                got: parameters.len(),
            });
        }
        if results.len() != self.result_names.len() {
            return Err(MatrixError::ShapeMismatch {
                expected: self.result_names.len(),
                got: results.len(),
            });
        }
        self.parameters
            .push_row(ArrayView1::from(parameters))
            .map_err(|_| MatrixError::ShapeMismatch {
                expected: self.parameter_names.len(),
                got: parameters.len(),
            })?;
        self.results
            .push_row(ArrayView1::from(results))
            .map_err(|_| MatrixError::ShapeMismatch {
                expected: self.result_names.len(),
                got: results.len(),
            })?;
        debug_assert_eq!(self.parameters.nrows(), self.results.nrows());
        Ok(())
    }

    /// Last `n` parameter rows, oldest first.
    pub fn last_parameter_rows(&self, n: usize) -> Array2<f64> {
        let rows = self.parameters.nrows();
        let start = rows.saturating_sub(n);
        self.parameters
            .slice_axis(Axis(0), ndarray::Slice::from(start..rows))
            .to_owned()
    }

    /// Write the full history as a comma-delimited table with a header
    /// row of parameter names followed by result names. Values are
    /// written at 4-decimal precision.
    pub fn save(&self, path: &Path) -> Result<(), MatrixError> {
        let mut out = String::new();
        let header: Vec<&str> = self
            .parameter_names
            .iter()
            .chain(self.result_names.iter())
            .map(String::as_str)
            .collect();
        out.push_str(&header.join(","));
        out.push('\n');
        for row in 0..self.parameters.nrows() {
            let mut cells = Vec::with_capacity(header.len());
            for v in self.parameters.row(row) {
                cells.push(format!("{v:.4}"));
            }
            for v in self.results.row(row) {
                cells.push(format!("{v:.4}"));
            }
            out.push_str(&cells.join(","));
            out.push('\n');
        }
        std::fs::write(path, out)?;
        Ok(())
    }

    /// Read a table previously written by [`save`](Self::save). The
    /// column split is taken from `n_parameters`; the header supplies
    /// the names.
    pub fn load(path: &Path, n_parameters: usize) -> Result<Self, MatrixError> {
        let text = std::fs::read_to_string(path)?;
        let mut lines = text.lines();
        let header = lines.next().ok_or(MatrixError::MissingHeader)?;
        let names: Vec<String> = header.split(',').map(str::to_string).collect();
        let (param_names, result_names) = names.split_at(n_parameters.min(names.len()));

        let mut matrix = Self::new(param_names.to_vec(), result_names.to_vec());
        for (row_idx, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut values = Vec::with_capacity(names.len());
            for (col_idx, cell) in line.split(',').enumerate() {
                let v: f64 = cell.trim().parse().map_err(|_| MatrixError::Parse {
                    value: cell.to_string(),
                    row: row_idx,
                    column: col_idx,
                })?;
                values.push(v);
            }
            if values.len() != names.len() {
                return Err(MatrixError::ShapeMismatch {
                    expected: names.len(),
                    got: values.len(),
                });
            }
            let (p, r) = values.split_at(n_parameters);
            matrix.push_row(p, r)?;
        }
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExperimentMatrix {
        let mut m = ExperimentMatrix::new(
            vec!["volume".into(), "time".into()],
            vec!["yield".into()],
        );
        m.push_row(&[1.25, 30.0], &[0.8123]).unwrap();
        m.push_row(&[0.75, 45.0], &[0.9011]).unwrap();
        m
    }

    #[test]
    fn push_row_keeps_rows_aligned() {
        let m = sample();
        assert_eq!(m.parameters().nrows(), m.results().nrows());
        assert_eq!(m.n_rows(), 2);
    }

    #[test]
    fn push_row_rejects_wrong_width() {
        let mut m = sample();
        let err = m.push_row(&[1.0], &[0.5]).unwrap_err();
        assert!(matches!(err, MatrixError::ShapeMismatch { expected: 2, got: 1 }));
        // No partial append on error
        assert_eq!(m.n_rows(), 2);
    }

    #[test]
    fn save_load_round_trip_at_four_decimals() {
        let m = sample();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiments.csv");
        m.save(&path).unwrap();

        let loaded = ExperimentMatrix::load(&path, 2).unwrap();
        assert_eq!(loaded.parameter_names, m.parameter_names);
        assert_eq!(loaded.result_names, m.result_names);
        assert_eq!(loaded.n_rows(), 2);
        for row in 0..2 {
            for col in 0..2 {
                let a = m.parameters()[[row, col]];
                let b = loaded.parameters()[[row, col]];
                assert!((a - b).abs() < 1e-4);
            }
            let a = m.results()[[row, 0]];
            let b = loaded.results()[[row, 0]];
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn last_parameter_rows_returns_tail() {
        let m = sample();
        let tail = m.last_parameter_rows(1);
        assert_eq!(tail.nrows(), 1);
        assert_eq!(tail[[0, 0]], 0.75);
    }
}
