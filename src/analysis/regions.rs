//! Peak-region detection and region-matching utilities.
//!
//! A region is a contiguous x-axis interval judged to contain one peak.
//! Detection is heuristic and channel-specific; the matching utilities
//! resolve an arbitrary peak position against a region set with the
//! documented fallback ladder (unique hit, nearest region within a
//! distance threshold, nearest-mean tie-break). Ambiguity is never
//! fatal: it degrades to a zero/neutral value with a warning.

use serde::{Deserialize, Serialize};

use crate::domain::models::{RegionSet, Spectrum};

/// Signal transform driving the threshold mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PickingMode {
    /// Threshold the smoothed magnitude.
    #[default]
    Magnitude,
    /// Threshold the absolute first difference of the smoothed signal.
    Derivative,
}

/// Channel-specific peak-picking heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickingParams {
    pub mode: PickingMode,
    /// Moving-average window, in samples.
    pub smoothing_window: usize,
    /// Threshold = median + multiplier * MAD-estimated noise.
    pub noise_multiplier: f64,
    /// Regions closer than this many samples merge into one.
    pub merge_gap: usize,
    /// Samples added to each side of a detected region.
    pub expand_margin: usize,
    /// Maximum x-distance for nearest-region target fallback.
    pub distance_threshold: f64,
}

impl Default for PickingParams {
    fn default() -> Self {
        Self {
            mode: PickingMode::Magnitude,
            smoothing_window: 5,
            noise_multiplier: 8.0,
            merge_gap: 4,
            expand_margin: 3,
            distance_threshold: 1.0,
        }
    }
}

impl PickingParams {
    /// Heuristics tuned per nucleus/channel. Unknown channels fall back
    /// to the defaults.
    pub fn for_channel(instrument: &str, nucleus: Option<&str>) -> Self {
        let instrument = instrument.to_lowercase();
        if let Some(nucleus) = nucleus {
            return match nucleus {
                "1H" => Self {
                    smoothing_window: 3,
                    noise_multiplier: 10.0,
                    merge_gap: 6,
                    expand_margin: 4,
                    distance_threshold: 0.5,
                    ..Self::default()
                },
                "19F" => Self {
                    smoothing_window: 5,
                    noise_multiplier: 6.0,
                    merge_gap: 4,
                    expand_margin: 3,
                    distance_threshold: 2.0,
                    ..Self::default()
                },
                "31P" => Self {
                    smoothing_window: 7,
                    noise_multiplier: 6.0,
                    merge_gap: 4,
                    expand_margin: 3,
                    distance_threshold: 3.0,
                    ..Self::default()
                },
                _ => Self::default(),
            };
        }
        if instrument.contains("hplc") {
            Self {
                mode: PickingMode::Derivative,
                smoothing_window: 9,
                noise_multiplier: 5.0,
                merge_gap: 8,
                expand_margin: 5,
                distance_threshold: 0.2,
                ..Self::default()
            }
        } else if instrument.contains("raman") {
            Self {
                smoothing_window: 11,
                noise_multiplier: 4.0,
                merge_gap: 10,
                expand_margin: 6,
                distance_threshold: 10.0,
                ..Self::default()
            }
        } else {
            Self::default()
        }
    }
}

/// Locate peak regions in a spectrum. Returns index intervals into the
/// x-axis, left index <= right index.
pub fn find_regions(spectrum: &Spectrum, params: &PickingParams) -> RegionSet {
    if spectrum.len() < 3 {
        return Vec::new();
    }
    let magnitude: Vec<f64> = spectrum.y.iter().map(|v| v.abs()).collect();
    let smoothed = moving_average(&magnitude, params.smoothing_window.max(1));
    let signal: Vec<f64> = match params.mode {
        PickingMode::Magnitude => smoothed,
        PickingMode::Derivative => {
            let mut d: Vec<f64> = smoothed.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
            d.push(0.0);
            d
        }
    };

    let median = median_of(&signal);
    let noise = mad(&signal, median);
    let threshold = median + params.noise_multiplier * noise;

    let mut regions: RegionSet = Vec::new();
    let mut start: Option<usize> = None;
    for (i, &v) in signal.iter().enumerate() {
        if v > threshold {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            regions.push([s, i - 1]);
        }
    }
    if let Some(s) = start {
        regions.push([s, signal.len() - 1]);
    }

    let merged = merge_regions(regions, params.merge_gap);
    let last = spectrum.len() - 1;
    merged
        .into_iter()
        .map(|[l, r]| {
            [
                l.saturating_sub(params.expand_margin),
                (r + params.expand_margin).min(last),
            ]
        })
        .collect()
}

fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(values.len());
            values[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
        })
        .collect()
}

fn median_of(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}

/// Median absolute deviation scaled to estimate the standard deviation.
fn mad(values: &[f64], median: f64) -> f64 {
    let deviations: Vec<f64> = values.iter().map(|v| (v - median).abs()).collect();
    1.4826 * median_of(&deviations)
}

fn merge_regions(mut regions: RegionSet, gap: usize) -> RegionSet {
    regions.sort_by_key(|r| r[0]);
    let mut merged: RegionSet = Vec::new();
    for region in regions {
        match merged.last_mut() {
            Some(last) if region[0] <= last[1] + gap => {
                last[1] = last[1].max(region[1]);
            }
            _ => merged.push(region),
        }
    }
    merged
}

/// Tie-break rule when a point relates to several regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResolveMethod {
    /// Distance to the mean of the region bounds.
    #[default]
    Mean,
    /// Distance to the nearest region edge.
    Edge,
}

/// Value-space region `[left, right]`; bound order is not significant
/// (NMR ppm axes run descending).
pub type ValueRegion = [f64; 2];

fn bounds(region: &ValueRegion) -> (f64, f64) {
    (region[0].min(region[1]), region[0].max(region[1]))
}

fn region_distance(region: &ValueRegion, point: f64, method: ResolveMethod) -> f64 {
    match method {
        ResolveMethod::Mean => {
            let mean = (region[0] + region[1]) / 2.0;
            (mean - point).abs()
        }
        ResolveMethod::Edge => {
            let (lo, hi) = bounds(region);
            if point < lo {
                lo - point
            } else if point > hi {
                point - hi
            } else {
                0.0
            }
        }
    }
}

/// Zero-based indices of every region containing `point`.
pub fn find_point_in_regions(regions: &[ValueRegion], point: f64) -> Vec<usize> {
    regions
        .iter()
        .enumerate()
        .filter(|(_, r)| {
            let (lo, hi) = bounds(r);
            point >= lo && point <= hi
        })
        .map(|(i, _)| i)
        .collect()
}

/// Pick the single region closest to a point that matched several
/// regions at once.
pub fn resolve_point_between_regions(
    regions: &[ValueRegion],
    point: f64,
    method: ResolveMethod,
) -> Option<ValueRegion> {
    regions
        .iter()
        .min_by(|a, b| {
            region_distance(a, point, method)
                .partial_cmp(&region_distance(b, point, method))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .copied()
}

/// Nearest region within `threshold` of the point, or nothing if every
/// region is too far away.
pub fn find_closest_region(
    regions: &[ValueRegion],
    point: f64,
    method: ResolveMethod,
    threshold: f64,
) -> Option<ValueRegion> {
    resolve_point_between_regions(regions, point, method)
        .filter(|r| region_distance(r, point, method) <= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn peaky_spectrum() -> Spectrum {
        // Flat baseline with two clear peaks
        let n = 200;
        let x: Vec<f64> = (0..n).map(|i| i as f64 / 10.0).collect();
        let y: Vec<f64> = (0..n)
            .map(|i| {
                let a = (-((i as f64 - 50.0) / 3.0).powi(2)).exp() * 100.0;
                let b = (-((i as f64 - 140.0) / 4.0).powi(2)).exp() * 60.0;
                a + b + 0.01 * ((i * 7919) % 13) as f64
            })
            .collect();
        Spectrum {
            x,
            y,
            instrument: "SpinsolveNMRSpectrum".to_string(),
            nucleus: Some("19F".to_string()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn finds_both_peaks() {
        let s = peaky_spectrum();
        let params = PickingParams::for_channel(&s.instrument, s.nucleus.as_deref());
        let regions = find_regions(&s, &params);
        assert_eq!(regions.len(), 2, "regions: {regions:?}");
        assert!(regions[0][0] <= 50 && 50 <= regions[0][1]);
        assert!(regions[1][0] <= 140 && 140 <= regions[1][1]);
    }

    #[test]
    fn regions_merge_across_small_gaps() {
        let merged = merge_regions(vec![[10, 20], [23, 30], [50, 60]], 4);
        assert_eq!(merged, vec![[10, 30], [50, 60]]);
    }

    #[test]
    fn point_in_second_region() {
        let regions = [[1.0, 5.0], [7.0, 12.0]];
        assert_eq!(find_point_in_regions(&regions, 11.0), vec![1]);
    }

    #[test]
    fn point_in_overlapping_regions_resolves_by_mean() {
        let regions = [[-113.9, -114.22], [-114.18, -114.48]];
        let hit = resolve_point_between_regions(&regions, -114.2, ResolveMethod::Mean).unwrap();
        assert_eq!(hit, [-114.18, -114.48]);
    }

    #[test]
    fn closest_region_honors_threshold() {
        let regions = [[-113.9, -114.22], [-114.18, -114.48]];
        let hit = find_closest_region(&regions, -114.5, ResolveMethod::Mean, 1.0).unwrap();
        assert_eq!(hit, [-114.18, -114.48]);
        assert!(find_closest_region(&regions, -114.5, ResolveMethod::Mean, 0.01).is_none());
    }

    #[test]
    fn flat_spectrum_yields_no_regions() {
        let s = Spectrum::new(
            (0..100).map(|i| i as f64).collect(),
            vec![1.0; 100],
            "TestSpectrum",
        );
        let regions = find_regions(&s, &PickingParams::default());
        assert!(regions.is_empty());
    }
}
