//! Population-based genetic search.
//!
//! Truncation selection keeps the best half of the scored population,
//! single-point crossover pairs parents without replacement, and each
//! gene mutates by random reset at a configured rate. Every candidate
//! generation is deduplicated against all previously evaluated points;
//! if generations keep collapsing to zero novel candidates past the
//! convergence counter, the population restarts around the best-known
//! individual.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::domain::models::{Constraint, ParameterKind};
use crate::domain::ports::algorithm::FULL_HISTORY;
use crate::domain::ports::errors::Result;
use crate::domain::ports::Algorithm;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticSettings {
    pub population_size: usize,
    /// Per-gene random-reset probability.
    pub mutation_rate: f64,
    /// Consecutive all-duplicate generations tolerated before the
    /// population restarts. Configurable rather than a literal.
    pub convergence_limit: usize,
}

impl Default for GeneticSettings {
    fn default() -> Self {
        Self {
            population_size: 20,
            mutation_rate: 0.2,
            convergence_limit: 5,
        }
    }
}

type Individual = Vec<f64>;

pub struct GeneticAlgorithm {
    settings: GeneticSettings,
    rng: StdRng,
    /// Individuals with known fitness, insertion order.
    scored: Vec<(Individual, f64)>,
    /// Every point ever handed out or absorbed, for deduplication.
    evaluated: Vec<Individual>,
    /// History rows already absorbed into `scored`.
    absorbed_rows: usize,
    stall_counter: usize,
}

impl GeneticAlgorithm {
    pub fn new(settings: GeneticSettings, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            settings,
            rng,
            scored: Vec::new(),
            evaluated: Vec::new(),
            absorbed_rows: 0,
            stall_counter: 0,
        }
    }

    fn draw_gene(&mut self, c: &Constraint) -> f64 {
        match c.kind {
            // Float genes are kept on a 2-decimal lattice so exact
            // dedup comparisons are meaningful.
            ParameterKind::Float => {
                let v = if c.span() <= 0.0 {
                    c.min
                } else {
                    self.rng.gen_range(c.min..=c.max)
                };
                (v * 100.0).round() / 100.0
            }
            ParameterKind::Integer => {
                let lo = c.min.ceil() as i64;
                let hi = c.max.floor() as i64;
                if lo >= hi {
                    lo as f64
                } else {
                    self.rng.gen_range(lo..=hi) as f64
                }
            }
        }
    }

    fn random_individual(&mut self, constraints: &[Constraint]) -> Individual {
        constraints.iter().map(|c| self.draw_gene(c)).collect()
    }

    fn is_novel(&self, candidate: &Individual, generation: &[Individual]) -> bool {
        !self.evaluated.iter().any(|e| e == candidate)
            && !generation.iter().any(|g| g == candidate)
    }

    fn absorb_history(
        &mut self,
        parameters: &Array2<f64>,
        results: &Array2<f64>,
        n_batches: i64,
    ) {
        let total = parameters.nrows();
        let start = if n_batches == FULL_HISTORY {
            self.absorbed_rows.min(total)
        } else {
            // Only the trailing n_batches rows are new evidence, but
            // never re-absorb rows we have already seen.
            total
                .saturating_sub(n_batches.max(0) as usize)
                .max(self.absorbed_rows)
        };
        for row in start..total {
            let individual: Individual = parameters.row(row).to_vec();
            let fitness = results[[row, 0]];
            if !self.evaluated.iter().any(|e| e == &individual) {
                self.evaluated.push(individual.clone());
            }
            self.scored.push((individual, fitness));
        }
        self.absorbed_rows = total;
    }

    /// Breed one generation from the scored population. Returns the
    /// candidates that survived deduplication.
    fn breed(&mut self, constraints: &[Constraint], n_returns: usize) -> Vec<Individual> {
        // Truncation selection: best half, at least two parents
        let mut ranked: Vec<(Individual, f64)> = self.scored.clone();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let keep = (ranked.len() / 2).max(2).min(ranked.len());
        let parents: Vec<Individual> = ranked[..keep].iter().map(|(p, _)| p.clone()).collect();

        let genes = constraints.len();
        let mut generation: Vec<Individual> = Vec::new();
        // A handful of full breeding rounds is plenty; collapse past
        // this point means the population has converged.
        for _ in 0..8 {
            let mut pool = parents.clone();
            pool.shuffle(&mut self.rng);
            // Pair parents without replacement
            for pair in pool.chunks(2) {
                if generation.len() >= n_returns {
                    break;
                }
                let (a, b) = match pair {
                    [a, b] => (a.clone(), b.clone()),
                    [a] => (a.clone(), parents[0].clone()),
                    _ => continue,
                };
                let cut = if genes > 1 {
                    self.rng.gen_range(1..genes)
                } else {
                    0
                };
                let mut child: Individual =
                    a[..cut].iter().chain(b[cut..].iter()).copied().collect();
                for (j, c) in constraints.iter().enumerate() {
                    if self.rng.gen::<f64>() < self.settings.mutation_rate {
                        child[j] = self.draw_gene(c);
                    }
                }
                if self.is_novel(&child, &generation) {
                    generation.push(child);
                }
            }
            if generation.len() >= n_returns {
                break;
            }
        }
        generation
    }

    fn restart(&mut self) {
        let elite = self
            .scored
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .cloned();
        tracing::warn!(
            stalled_generations = self.stall_counter,
            "Population converged, restarting around the elite individual"
        );
        self.scored.clear();
        self.stall_counter = 0;
        if let Some((individual, fitness)) = elite {
            self.scored.push((individual, fitness));
        }
    }
}

impl Algorithm for GeneticAlgorithm {
    fn name(&self) -> &'static str {
        "ga"
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
            self.absorb_history(p, r, n_batches);
        }

        let mut generation: Vec<Individual> = if self.scored.len() < 2 {
            Vec::new()
        } else {
            self.breed(constraints, n_returns)
        };

        if generation.is_empty() && !self.scored.is_empty() {
            self.stall_counter += 1;
            if self.stall_counter > self.settings.convergence_limit {
                self.restart();
            }
        } else {
            self.stall_counter = 0;
        }

        // Top up with novel random individuals (also the bootstrap path)
        let mut attempts = 0;
        while generation.len() < n_returns && attempts < 1000 {
            attempts += 1;
            let candidate = self.random_individual(constraints);
            if self.is_novel(&candidate, &generation) {
                generation.push(candidate);
            }
        }

        let mut out = Array2::zeros((generation.len(), constraints.len()));
        for (i, individual) in generation.iter().enumerate() {
            for (j, v) in individual.iter().enumerate() {
                out[[i, j]] = *v;
            }
            self.evaluated.push(individual.clone());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn constraints() -> Vec<Constraint> {
        vec![Constraint::new(0.0, 10.0), Constraint::integer(1.0, 8.0)]
    }

    #[test]
    fn unsatisfiable_integer_range_errors_instead_of_escaping_bounds() {
        use crate::domain::ports::errors::AlgorithmError;

        let cs = [Constraint::integer(2.3, 2.7)];
        let mut alg = GeneticAlgorithm::new(GeneticSettings::default(), Some(3));
        let err = alg.suggest(None, None, &cs, 1, 1).unwrap_err();
        assert!(matches!(err, AlgorithmError::InvalidArgument(_)));
    }

    fn rows_of(out: &Array2<f64>) -> Vec<Vec<f64>> {
        out.rows().into_iter().map(|r| r.to_vec()).collect()
    }

    #[test]
    fn generation_contains_no_duplicates() {
        let cs = constraints();
        let mut alg = GeneticAlgorithm::new(GeneticSettings::default(), Some(5));
        let out = alg.suggest(None, None, &cs, 1, 10).unwrap();
        let rows = rows_of(&out);
        for (i, a) in rows.iter().enumerate() {
            for b in &rows[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn candidates_never_repeat_evaluated_points() {
        let cs = constraints();
        let mut alg = GeneticAlgorithm::new(GeneticSettings::default(), Some(5));
        let first = rows_of(&alg.suggest(None, None, &cs, 1, 6).unwrap());

        let p = arr2(&[
            [1.0, 2.0],
            [2.0, 3.0],
            [3.0, 4.0],
            [4.0, 5.0],
        ]);
        let r = arr2(&[[0.1], [0.5], [0.9], [0.3]]);
        let second = rows_of(&alg.suggest(Some(&p), Some(&r), &cs, FULL_HISTORY, 6).unwrap());

        for candidate in &second {
            assert!(!first.contains(candidate), "repeated {candidate:?}");
            for row in p.rows() {
                assert_ne!(candidate, &row.to_vec());
            }
        }
    }

    #[test]
    fn genes_respect_declared_bounds_and_kinds() {
        let cs = constraints();
        let mut alg = GeneticAlgorithm::new(GeneticSettings::default(), Some(9));
        let p = arr2(&[[1.0, 2.0], [2.0, 3.0], [9.5, 7.0]]);
        let r = arr2(&[[0.1], [0.5], [0.8]]);
        let out = alg.suggest(Some(&p), Some(&r), &cs, FULL_HISTORY, 12).unwrap();
        for row in out.rows() {
            assert!(cs[0].contains(row[0]));
            // Float lattice: two decimals
            assert!((row[0] * 100.0 - (row[0] * 100.0).round()).abs() < 1e-9);
            assert!(cs[1].contains(row[1]));
            assert_eq!(row[1], row[1].round());
        }
    }

    #[test]
    fn restart_preserves_elite() {
        let cs = vec![Constraint::integer(1.0, 2.0)];
        let mut alg = GeneticAlgorithm::new(
            GeneticSettings {
                convergence_limit: 1,
                ..Default::default()
            },
            Some(2),
        );
        // Tiny search space: both points evaluated immediately
        let p = arr2(&[[1.0], [2.0]]);
        let r = arr2(&[[0.2], [0.9]]);
        for _ in 0..5 {
            let _ = alg.suggest(Some(&p), Some(&r), &cs, FULL_HISTORY, 2);
        }
        let best = alg
            .scored
            .iter()
            .map(|(_, f)| *f)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(best, 0.9);
    }
}
