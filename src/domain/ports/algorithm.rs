//! Strategy contract shared by every black-box optimization algorithm.

use ndarray::Array2;

use crate::domain::models::Constraint;
use crate::domain::ports::errors::Result;

/// Number of history rows that count as "new" evidence when the caller
/// wants a full-history recalibration (after preloading prior runs or
/// switching algorithms mid-experiment).
pub const FULL_HISTORY: i64 = -1;

/// One black-box optimization strategy.
///
/// `parameters` and `results` are the full experiment history in fixed
/// column order; `constraints` align positionally 1:1 with the parameter
/// columns. Algorithms never see parameter names.
///
/// `n_batches` tells incremental algorithms how many trailing rows are
/// new since the previous call ([`FULL_HISTORY`] means "treat everything
/// as new"). `n_returns` is the number of parameter vectors to produce,
/// normally the batch count.
pub trait Algorithm: Send {
    fn name(&self) -> &'static str;

    fn suggest(
        &mut self,
        parameters: Option<&Array2<f64>>,
        results: Option<&Array2<f64>>,
        constraints: &[Constraint],
        n_batches: i64,
        n_returns: usize,
    ) -> Result<Array2<f64>>;
}

impl std::fmt::Debug for dyn Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Algorithm").field("name", &self.name()).finish()
    }
}
