//! Spectrum artifact model.
//!
//! A spectrum (or chromatogram) is produced by an analytical instrument
//! after a procedure iteration finishes. The analysis layer only reads
//! it; ownership stays with the procedure engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Contiguous index interval on the x-axis judged to contain one peak.
pub type PeakRegion = [usize; 2];

/// A set of peak regions for one spectrum.
pub type RegionSet = Vec<PeakRegion>;

/// Raw instrument output: paired x/y arrays plus acquisition metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spectrum {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Instrument class string as reported by the driver,
    /// e.g. "SpinsolveNMRSpectrum" or "AgilentHPLCChromatogram".
    pub instrument: String,
    /// Observed nucleus for NMR spectra ("1H", "19F", ...).
    pub nucleus: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Spectrum {
    pub fn new(x: Vec<f64>, y: Vec<f64>, instrument: impl Into<String>) -> Self {
        Self {
            x,
            y,
            instrument: instrument.into(),
            nucleus: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_nucleus(mut self, nucleus: impl Into<String>) -> Self {
        self.nucleus = Some(nucleus.into());
        self
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Index of the x value closest to `target`. The x-axis may run in
    /// either direction (NMR ppm axes are typically descending).
    pub fn nearest_index(&self, target: f64) -> Option<usize> {
        if self.x.is_empty() {
            return None;
        }
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (i, &x) in self.x.iter().enumerate() {
            let d = (x - target).abs();
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        Some(best)
    }

    /// Trapezoidal area under the curve over an inclusive index window.
    /// The window is normalized so either index order is accepted.
    pub fn integrate(&self, region: PeakRegion) -> f64 {
        let (lo, hi) = if region[0] <= region[1] {
            (region[0], region[1])
        } else {
            (region[1], region[0])
        };
        let hi = hi.min(self.len().saturating_sub(1));
        if lo >= hi {
            return 0.0;
        }
        let mut area = 0.0;
        for i in lo..hi {
            let dx = (self.x[i + 1] - self.x[i]).abs();
            area += 0.5 * (self.y[i] + self.y[i + 1]) * dx;
        }
        area
    }

    /// Integrate a window given in x-axis values rather than indices.
    pub fn integrate_window(&self, left: f64, right: f64) -> f64 {
        match (self.nearest_index(left), self.nearest_index(right)) {
            (Some(a), Some(b)) => self.integrate([a, b]),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Spectrum {
        let x: Vec<f64> = (0..11).map(|i| i as f64).collect();
        let y = vec![1.0; 11];
        Spectrum::new(x, y, "TestSpectrum")
    }

    #[test]
    fn nearest_index_finds_closest_sample() {
        let s = ramp();
        assert_eq!(s.nearest_index(3.4), Some(3));
        assert_eq!(s.nearest_index(3.6), Some(4));
        assert_eq!(s.nearest_index(-5.0), Some(0));
    }

    #[test]
    fn nearest_index_handles_descending_axis() {
        let x: Vec<f64> = (0..11).map(|i| 10.0 - i as f64).collect();
        let s = Spectrum::new(x, vec![0.0; 11], "TestSpectrum");
        assert_eq!(s.nearest_index(9.8), Some(0));
        assert_eq!(s.nearest_index(0.2), Some(10));
    }

    #[test]
    fn integrate_unit_curve_equals_window_width() {
        let s = ramp();
        let area = s.integrate([2, 7]);
        assert!((area - 5.0).abs() < 1e-12);
        // Reversed bounds give the same area
        assert!((s.integrate([7, 2]) - area).abs() < 1e-12);
    }

    #[test]
    fn integrate_degenerate_region_is_zero() {
        let s = ramp();
        assert_eq!(s.integrate([4, 4]), 0.0);
    }
}
