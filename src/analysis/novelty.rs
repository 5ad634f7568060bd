//! Unsupervised novelty scoring.
//!
//! Detects "something new happened" without a predefined target: a
//! spectrum's information score measures how much well-formed peak
//! structure it contains, and its novelty coefficient measures how much
//! of that structure was never seen in any earlier spectrum. The final
//! score is the product of the two.
//!
//! History handling is an explicit two-pass contract: pass one scores
//! every supplied spectrum against a frozen snapshot of the history,
//! pass two appends the new expanded regions. Scores therefore do not
//! depend on the processing order within one call.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::domain::models::{RegionSet, Spectrum};

const EPSILON: f64 = 1e-9;

/// Accumulating history of expanded region point sets. Grows
/// monotonically; never pruned within a process lifetime.
#[derive(Debug, Clone, Default)]
pub struct TrainRegions {
    sets: Vec<Vec<usize>>,
}

impl TrainRegions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn push(&mut self, points: Vec<usize>) {
        self.sets.push(points);
    }

    fn all_points(&self) -> HashSet<usize> {
        self.sets.iter().flatten().copied().collect()
    }

    /// Seed the history from a known-regions JSON file: a map of
    /// arbitrary keys to lists of flattened region-point arrays.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        #[derive(Deserialize)]
        struct KnownRegions(std::collections::BTreeMap<String, Vec<Vec<usize>>>);

        let text = std::fs::read_to_string(path)?;
        let known: KnownRegions = serde_json::from_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut train = Self::new();
        for (key, sets) in known.0 {
            tracing::debug!(key = %key, sets = sets.len(), "Seeding known regions");
            for set in sets {
                train.push(set);
            }
        }
        tracing::info!(sets = train.len(), path = %path.display(), "Known regions loaded");
        Ok(train)
    }
}

/// Every x-axis index covered by a region set.
pub fn expand_regions(regions: &RegionSet) -> Vec<usize> {
    let mut points = Vec::new();
    for &[l, r] in regions {
        let (lo, hi) = if l <= r { (l, r) } else { (r, l) };
        points.extend(lo..=hi);
    }
    points
}

/// Peak-structure information in one spectrum: each region's point
/// count weighted by the inverse log-distance of its area from the
/// harmonic mean of all region areas, summed and scaled by the region
/// count. Uniformly sized, comparable peaks score highest.
pub fn information_score(spectrum: &Spectrum, regions: &RegionSet) -> f64 {
    if regions.is_empty() {
        return 0.0;
    }
    let areas: Vec<f64> = regions
        .iter()
        .map(|&r| spectrum.integrate(r).abs().max(EPSILON))
        .collect();
    let harmonic = areas.len() as f64 / areas.iter().map(|a| 1.0 / a).sum::<f64>();
    let weighted: f64 = regions
        .iter()
        .zip(&areas)
        .map(|(&[l, r], &area)| {
            let size = (r.max(l) - r.min(l) + 1) as f64;
            let log_distance = (area.ln() - harmonic.ln()).abs();
            size / (1.0 + log_distance)
        })
        .sum();
    weighted * regions.len() as f64
}

/// Fraction of the spectrum's expanded region points absent from all
/// historical points, plus a reciprocal term so a fully repeated
/// spectrum still scores above zero.
pub fn novelty_coefficient(points: &[usize], train: &TrainRegions) -> f64 {
    let reciprocal = 1.0 / (1.0 + train.len() as f64);
    if points.is_empty() {
        return reciprocal;
    }
    let known = train.all_points();
    let novel = points.iter().filter(|p| !known.contains(p)).count();
    novel as f64 / points.len() as f64 + reciprocal
}

/// Score spectra (ordered oldest-to-newest) against the training
/// history, then absorb them into it. Pass one scores everything
/// against a frozen snapshot; pass two appends, so every spectrum in
/// one call is judged against the same history.
pub fn score_spectra(
    spectra: &[(&Spectrum, RegionSet)],
    train: &mut TrainRegions,
) -> Vec<f64> {
    let scores: Vec<f64> = spectra
        .iter()
        .map(|(spectrum, regions)| {
            let information = information_score(spectrum, regions);
            let points = expand_regions(regions);
            let coefficient = novelty_coefficient(&points, train);
            let score = information * coefficient;
            tracing::debug!(information, coefficient, score, "Novelty scored");
            score
        })
        .collect();
    for (_, regions) in spectra {
        train.push(expand_regions(regions));
    }
    scores
}
