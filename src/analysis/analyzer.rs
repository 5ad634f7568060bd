//! Spectral region analyzer: reference integration and target
//! resolution for one recorded spectrum.
//!
//! Per-iteration normalization states:
//! no reference & no target -> raw region parameters;
//! target only             -> normalized by 1;
//! reference & target      -> normalized by the reference AUC.
//! Terminal outcomes are a product value or an explicit zero when
//! nothing lies within the distance threshold (no product formed).

use crate::domain::models::{RegionSet, Spectrum};

use super::regions::{
    find_closest_region, find_point_in_regions, find_regions, resolve_point_between_regions,
    PickingParams, ResolveMethod, ValueRegion,
};

const EPSILON: f64 = 1e-9;

/// What the objective is aiming at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    /// A peak position on the x-axis.
    Peak(f64),
    /// An explicit `[left, right]` integration window on the x-axis.
    Window { left: f64, right: f64 },
}

pub struct SpectralRegionAnalyzer {
    params: PickingParams,
}

impl SpectralRegionAnalyzer {
    pub fn new(params: PickingParams) -> Self {
        Self { params }
    }

    /// Pick parameters from the spectrum's own channel metadata.
    pub fn for_spectrum(spectrum: &Spectrum) -> Self {
        Self::new(PickingParams::for_channel(
            &spectrum.instrument,
            spectrum.nucleus.as_deref(),
        ))
    }

    pub fn params(&self) -> &PickingParams {
        &self.params
    }

    pub fn regions(&self, spectrum: &Spectrum) -> RegionSet {
        find_regions(spectrum, &self.params)
    }

    /// Region intervals converted to x-axis values.
    fn value_regions(&self, spectrum: &Spectrum, regions: &RegionSet) -> Vec<ValueRegion> {
        regions
            .iter()
            .map(|&[l, r]| [spectrum.x[l], spectrum.x[r]])
            .collect()
    }

    /// AUC of the reference peak. A reference that matches exactly one
    /// region integrates that region; zero matches fall back to direct
    /// integration around the peak position; several matches resolve by
    /// nearest region mean with a warning.
    pub fn reference_area(&self, spectrum: &Spectrum, regions: &RegionSet, reference: f64) -> f64 {
        let value_regions = self.value_regions(spectrum, regions);
        let hits = find_point_in_regions(&value_regions, reference);
        match hits.len() {
            1 => spectrum.integrate(regions[hits[0]]),
            0 => {
                tracing::warn!(
                    reference,
                    "Reference peak matched no region, integrating directly around it"
                );
                self.integrate_around(spectrum, reference)
            }
            n => {
                tracing::warn!(
                    reference,
                    matches = n,
                    "Reference peak matched several regions, resolving by nearest mean"
                );
                let matched: Vec<ValueRegion> =
                    hits.iter().map(|&i| value_regions[i]).collect();
                resolve_point_between_regions(&matched, reference, ResolveMethod::Mean)
                    .map(|r| spectrum.integrate_window(r[0], r[1]))
                    .unwrap_or(0.0)
            }
        }
    }

    /// AUC at the target. The same tri-way logic as the reference, but
    /// the zero-match fallback is distance-thresholded: when nothing is
    /// within reach, the product simply did not form and the value is
    /// an explicit zero.
    pub fn target_area(&self, spectrum: &Spectrum, regions: &RegionSet, target: Target) -> f64 {
        let position = match target {
            Target::Window { left, right } => return spectrum.integrate_window(left, right),
            Target::Peak(position) => position,
        };
        let value_regions = self.value_regions(spectrum, regions);
        let hits = find_point_in_regions(&value_regions, position);
        match hits.len() {
            1 => spectrum.integrate(regions[hits[0]]),
            0 => match find_closest_region(
                &value_regions,
                position,
                ResolveMethod::Mean,
                self.params.distance_threshold,
            ) {
                Some(region) => {
                    tracing::warn!(
                        target = position,
                        ?region,
                        "Target peak matched no region, using nearest within threshold"
                    );
                    spectrum.integrate_window(region[0], region[1])
                }
                None => {
                    tracing::warn!(
                        target = position,
                        threshold = self.params.distance_threshold,
                        "No region within threshold of target, scoring zero"
                    );
                    0.0
                }
            },
            n => {
                tracing::warn!(
                    target = position,
                    matches = n,
                    "Target peak matched several regions, resolving by nearest mean"
                );
                let matched: Vec<ValueRegion> =
                    hits.iter().map(|&i| value_regions[i]).collect();
                resolve_point_between_regions(&matched, position, ResolveMethod::Mean)
                    .map(|r| spectrum.integrate_window(r[0], r[1]))
                    .unwrap_or(0.0)
            }
        }
    }

    /// Scalar product value under the normalization state machine.
    pub fn product_value(
        &self,
        spectrum: &Spectrum,
        regions: &RegionSet,
        reference: Option<f64>,
        target: Option<Target>,
    ) -> f64 {
        match (reference, target) {
            // Unsupervised: raw region parameters, i.e. total detected area
            (_, None) => regions.iter().map(|&r| spectrum.integrate(r)).sum(),
            (None, Some(target)) => self.target_area(spectrum, regions, target),
            (Some(reference), Some(target)) => {
                let reference_auc = self.reference_area(spectrum, regions, reference);
                self.target_area(spectrum, regions, target) / (reference_auc + EPSILON)
            }
        }
    }

    fn integrate_around(&self, spectrum: &Spectrum, position: f64) -> f64 {
        let Some(center) = spectrum.nearest_index(position) else {
            return 0.0;
        };
        let margin = self.params.expand_margin.max(1);
        let left = center.saturating_sub(margin);
        let right = (center + margin).min(spectrum.len().saturating_sub(1));
        spectrum.integrate([left, right])
    }
}
