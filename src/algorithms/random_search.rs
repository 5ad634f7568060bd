//! Uniform random search.
//!
//! Draws each parameter independently inside its constraint. Stateless:
//! history is ignored entirely, which also makes this the bootstrap
//! strategy of choice for surrogate-based optimizers.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::models::{Constraint, ParameterKind};
use crate::domain::ports::errors::Result;
use crate::domain::ports::Algorithm;

pub struct RandomSearch {
    rng: StdRng,
}

impl RandomSearch {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }
}

/// Draw one value inside a constraint, honoring the integer kind.
pub(crate) fn draw(rng: &mut StdRng, c: &Constraint) -> f64 {
    match c.kind {
        ParameterKind::Float => {
            if c.span() <= 0.0 {
                c.min
            } else {
                rng.gen_range(c.min..=c.max)
            }
        }
        // Both bounds inclusive
        ParameterKind::Integer => {
            let lo = c.min.ceil() as i64;
            let hi = c.max.floor() as i64;
            if lo >= hi {
                lo as f64
            } else {
                rng.gen_range(lo..=hi) as f64
            }
        }
    }
}

impl Algorithm for RandomSearch {
    fn name(&self) -> &'static str {
        "random"
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
        let mut out = Array2::zeros((n_returns, constraints.len()));
        for mut row in out.rows_mut() {
            for (cell, c) in row.iter_mut().zip(constraints) {
                *cell = draw(&mut self.rng, c);
            }
        }
        Ok(out)
    }
}
