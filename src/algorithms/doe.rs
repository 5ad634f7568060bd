//! Design-of-experiments table generator.
//!
//! The whole design is generated once at construction in unit
//! coordinates, scaled into the real parameter bounds, optionally
//! augmented with center/star points, optionally shuffled (seeded), and
//! then served through a forward-only cursor. Once the cursor runs out
//! every further call fails with `ExhaustedDesign` — the caller must
//! supply a new design or switch algorithms.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::models::Constraint;
use crate::domain::ports::errors::{AlgorithmError, Result};
use crate::domain::ports::Algorithm;

/// Supported design families. Coordinates are generated on the unit
/// interval per factor and scaled into the constraint bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DesignType {
    /// Every combination of `levels` evenly spaced levels per factor.
    FullFactorial { levels: usize },
    /// Two-level fractional factorial. Each generator lists the base
    /// factor indices whose coded product defines one extra column.
    FractionalFactorial { generators: Vec<Vec<usize>> },
    /// Two-level screening design from the standard cyclic seeds.
    PlackettBurman,
    /// Three-level design: all factor pairs at the corners, the rest at
    /// mid-level.
    BoxBehnken,
    /// Two-level corners plus axial (star) points at `alpha` in coded
    /// units; values are clipped into bounds when scaling.
    CentralComposite { alpha: f64 },
    /// Stratified random space filling with `samples` rows.
    LatinHypercube { samples: usize },
    /// Multi-level factorial reduced by the classic modular slice:
    /// keep rows where the level-index sum is `slice` modulo `reduction`.
    GeneralizedSubset {
        levels: usize,
        reduction: usize,
        slice: usize,
    },
}

impl Default for DesignType {
    fn default() -> Self {
        Self::LatinHypercube { samples: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoeSettings {
    pub design: DesignType,
    /// Extra all-midpoint rows appended after the design body.
    pub center_points: usize,
    /// Append 2k axial rows (one factor at a bound, the rest at
    /// mid-level) after the design body.
    pub star_points: bool,
    /// Shuffle the finished table with the run seed.
    pub shuffle: bool,
    /// When set, the scaled design is persisted here as a CSV table at
    /// construction time.
    pub design_table: Option<PathBuf>,
}

impl Default for DoeSettings {
    fn default() -> Self {
        Self {
            design: DesignType::default(),
            center_points: 0,
            star_points: false,
            shuffle: false,
            design_table: None,
        }
    }
}

pub struct DesignOfExperiments {
    rows: Vec<Vec<f64>>,
    cursor: usize,
}

impl DesignOfExperiments {
    pub fn new(settings: DoeSettings, constraints: &[Constraint], seed: Option<u64>) -> Result<Self> {
        if constraints.is_empty() {
            return Err(AlgorithmError::InvalidArgument(
                "empty constraint set".to_string(),
            ));
        }
        let k = constraints.len();
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let mut unit = generate_unit_design(&settings.design, k, &mut rng)?;
        if settings.star_points {
            for i in 0..k {
                for bound in [0.0, 1.0] {
                    let mut row = vec![0.5; k];
                    row[i] = bound;
                    unit.push(row);
                }
            }
        }
        for _ in 0..settings.center_points {
            unit.push(vec![0.5; k]);
        }
        if settings.shuffle {
            unit.shuffle(&mut rng);
        }

        let rows: Vec<Vec<f64>> = unit
            .into_iter()
            .map(|row| {
                row.iter()
                    .zip(constraints)
                    .map(|(u, c)| c.clamp(c.min + u * c.span()))
                    .collect()
            })
            .collect();

        tracing::info!(rows = rows.len(), factors = k, "Generated experiment design");
        let doe = Self { rows, cursor: 0 };
        if let Some(path) = &settings.design_table {
            doe.write_design_table(path)?;
        }
        Ok(doe)
    }

    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn remaining(&self) -> usize {
        self.rows.len() - self.cursor
    }

    /// Persist the scaled design as a comma-delimited table, one row
    /// per design point. Written once at initialization time.
    pub fn write_design_table(&self, path: &Path) -> Result<()> {
        let k = self.rows.first().map(Vec::len).unwrap_or(0);
        let header: Vec<String> = (1..=k).map(|i| format!("param_{i}")).collect();
        let mut out = header.join(",");
        out.push('\n');
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|v| format!("{v:.4}")).collect();
            out.push_str(&cells.join(","));
            out.push('\n');
        }
        std::fs::write(path, out)?;
        Ok(())
    }
}

impl Algorithm for DesignOfExperiments {
    fn name(&self) -> &'static str {
        "doe"
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
            return Err(AlgorithmError::ExhaustedDesign {
                served: self.cursor,
                total: self.rows.len(),
            });
        }
        let take = n_returns.min(self.rows.len() - self.cursor);
        let mut out = Array2::zeros((take, constraints.len()));
        for i in 0..take {
            for (j, v) in self.rows[self.cursor + i].iter().enumerate() {
                out[[i, j]] = *v;
            }
        }
        self.cursor += take;
        Ok(out)
    }
}

fn generate_unit_design(
    design: &DesignType,
    k: usize,
    rng: &mut StdRng,
) -> Result<Vec<Vec<f64>>> {
    match design {
        DesignType::FullFactorial { levels } => {
            if *levels == 0 {
                return Err(AlgorithmError::InvalidArgument(
                    "full factorial needs at least one level".to_string(),
                ));
            }
            Ok(full_factorial(k, *levels))
        }
        DesignType::FractionalFactorial { generators } => fractional_factorial(k, generators),
        DesignType::PlackettBurman => plackett_burman(k),
        DesignType::BoxBehnken => box_behnken(k),
        DesignType::CentralComposite { alpha } => Ok(central_composite(k, *alpha)),
        DesignType::LatinHypercube { samples } => {
            if *samples == 0 {
                return Err(AlgorithmError::InvalidArgument(
                    "latin hypercube needs at least one sample".to_string(),
                ));
            }
            Ok(latin_hypercube(k, *samples, rng))
        }
        DesignType::GeneralizedSubset {
            levels,
            reduction,
            slice,
        } => generalized_subset(k, *levels, *reduction, *slice),
    }
}

fn level_value(index: usize, levels: usize) -> f64 {
    if levels == 1 {
        0.5
    } else {
        index as f64 / (levels - 1) as f64
    }
}

fn full_factorial(k: usize, levels: usize) -> Vec<Vec<f64>> {
    let mut rows = Vec::with_capacity(levels.pow(k as u32));
    let mut indices = vec![0usize; k];
    loop {
        rows.push(indices.iter().map(|&i| level_value(i, levels)).collect());
        // Odometer increment
        let mut pos = k;
        loop {
            if pos == 0 {
                return rows;
            }
            pos -= 1;
            indices[pos] += 1;
            if indices[pos] < levels {
                break;
            }
            indices[pos] = 0;
        }
    }
}

fn fractional_factorial(k: usize, generators: &[Vec<usize>]) -> Result<Vec<Vec<f64>>> {
    if generators.len() >= k {
        return Err(AlgorithmError::InvalidArgument(
            "fractional factorial needs fewer generators than factors".to_string(),
        ));
    }
    let base = k - generators.len();
    for g in generators {
        if g.is_empty() || g.iter().any(|&i| i >= base) {
            return Err(AlgorithmError::InvalidArgument(format!(
                "generator {g:?} references factors outside the base set 0..{base}"
            )));
        }
    }
    let base_design = full_factorial(base, 2);
    let rows = base_design
        .into_iter()
        .map(|row| {
            // Derived columns are coded products of base columns
            let coded: Vec<f64> = row.iter().map(|u| u * 2.0 - 1.0).collect();
            let mut full = row;
            for g in generators {
                let product: f64 = g.iter().map(|&i| coded[i]).product();
                full.push((product + 1.0) / 2.0);
            }
            full
        })
        .collect();
    Ok(rows)
}

/// First rows of the standard Plackett-Burman cyclic constructions.
const PB_SEEDS: [(usize, &str); 4] = [
    (8, "+++-+--"),
    (12, "++-+++---+-"),
    (16, "++++-+-++--+---"),
    (20, "++--++++-+-+----++-"),
];

fn plackett_burman(k: usize) -> Result<Vec<Vec<f64>>> {
    let (n, seed) = PB_SEEDS
        .iter()
        .find(|(n, _)| n - 1 >= k)
        .ok_or_else(|| {
            AlgorithmError::InvalidArgument(format!(
                "plackett-burman supports at most 19 factors, got {k}"
            ))
        })?;
    let signs: Vec<f64> = seed
        .chars()
        .map(|c| if c == '+' { 1.0 } else { 0.0 })
        .collect();
    let width = n - 1;
    let mut rows = Vec::with_capacity(*n);
    for shift in 0..width {
        let row: Vec<f64> = (0..k).map(|j| signs[(j + width - shift) % width]).collect();
        rows.push(row);
    }
    rows.push(vec![0.0; k]);
    Ok(rows)
}

fn box_behnken(k: usize) -> Result<Vec<Vec<f64>>> {
    if k < 3 {
        return Err(AlgorithmError::InvalidArgument(
            "box-behnken needs at least 3 factors".to_string(),
        ));
    }
    let mut rows = Vec::new();
    for i in 0..k {
        for j in (i + 1)..k {
            for a in [0.0, 1.0] {
                for b in [0.0, 1.0] {
                    let mut row = vec![0.5; k];
                    row[i] = a;
                    row[j] = b;
                    rows.push(row);
                }
            }
        }
    }
    Ok(rows)
}

fn central_composite(k: usize, alpha: f64) -> Vec<Vec<f64>> {
    let mut rows = full_factorial(k, 2);
    // Axial points at +-alpha in coded units, clipped into the unit cube
    for i in 0..k {
        for sign in [-1.0, 1.0] {
            let mut row = vec![0.5; k];
            row[i] = (0.5 + sign * alpha / 2.0).clamp(0.0, 1.0);
            rows.push(row);
        }
    }
    rows
}

fn latin_hypercube(k: usize, samples: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(k);
    for _ in 0..k {
        let mut strata: Vec<usize> = (0..samples).collect();
        strata.shuffle(rng);
        columns.push(
            strata
                .into_iter()
                .map(|s| (s as f64 + rng.gen::<f64>()) / samples as f64)
                .collect(),
        );
    }
    (0..samples)
        .map(|row| columns.iter().map(|col| col[row]).collect())
        .collect()
}

fn generalized_subset(
    k: usize,
    levels: usize,
    reduction: usize,
    slice: usize,
) -> Result<Vec<Vec<f64>>> {
    if levels == 0 || reduction == 0 {
        return Err(AlgorithmError::InvalidArgument(
            "generalized subset needs levels >= 1 and reduction >= 1".to_string(),
        ));
    }
    if slice >= reduction {
        return Err(AlgorithmError::InvalidArgument(format!(
            "slice {slice} must be below reduction {reduction}"
        )));
    }
    let mut rows = Vec::new();
    let mut indices = vec![0usize; k];
    loop {
        if indices.iter().sum::<usize>() % reduction == slice {
            rows.push(indices.iter().map(|&i| level_value(i, levels)).collect());
        }
        let mut pos = k;
        loop {
            if pos == 0 {
                return Ok(rows);
            }
            pos -= 1;
            indices[pos] += 1;
            if indices[pos] < levels {
                break;
            }
            indices[pos] = 0;
        }
    }
}
