//! End-to-end spectral analysis: raw trace in, scalar objective out.

use chemopt::analysis::{
    score_spectra, LossContext, LossRegistry, SpectralRegionAnalyzer, TrainRegions,
};
use chemopt::domain::models::Spectrum;

/// Two gaussian peaks on a flat baseline, product at 42 and a side
/// product at 10, on a 0..60 axis.
fn reaction_spectrum(product_height: f64) -> Spectrum {
    let x: Vec<f64> = (0..600).map(|i| i as f64 / 10.0).collect();
    let y: Vec<f64> = x
        .iter()
        .map(|&xv| {
            (-((xv - 42.0) / 0.5).powi(2)).exp() * product_height
                + (-((xv - 10.0) / 0.5).powi(2)).exp() * 40.0
        })
        .collect();
    Spectrum::new(x, y, "SpinsolveNMRSpectrum").with_nucleus("19F")
}

#[test]
fn objective_tracks_the_product_peak() {
    let registry = LossRegistry::new();

    let mut values = Vec::new();
    for height in [20.0, 50.0, 90.0] {
        let spectrum = reaction_spectrum(height);
        let analyzer = SpectralRegionAnalyzer::for_spectrum(&spectrum);
        let regions = analyzer.regions(&spectrum);
        assert!(regions.len() >= 2, "expected both peaks, got {regions:?}");

        let mut ctx = LossContext {
            spectrum: &spectrum,
            regions: &regions,
            target: None,
            window: None,
            reference: None,
            constraints: &[],
            train: None,
        };
        values.push(registry.evaluate("SpinsolveNMRSpectrum", "spectrum_peak_area_42", &mut ctx));
    }

    // A taller product peak must never score lower
    assert!(values[0] < values[1] && values[1] < values[2], "{values:?}");
}

#[test]
fn reference_normalization_cancels_instrument_scaling() {
    let registry = LossRegistry::new();
    let spectrum = reaction_spectrum(80.0);
    let scaled = Spectrum::new(
        spectrum.x.clone(),
        spectrum.y.iter().map(|v| v * 3.0).collect(),
        "SpinsolveNMRSpectrum",
    )
    .with_nucleus("19F");

    let mut normalized = Vec::new();
    for s in [&spectrum, &scaled] {
        let analyzer = SpectralRegionAnalyzer::for_spectrum(s);
        let regions = analyzer.regions(s);
        let mut ctx = LossContext {
            spectrum: s,
            regions: &regions,
            target: None,
            window: None,
            reference: Some(10.0),
            constraints: &[],
            train: None,
        };
        normalized.push(registry.evaluate("SpinsolveNMRSpectrum", "spectrum_peak_area_42", &mut ctx));
    }
    assert!((normalized[0] - normalized[1]).abs() < 1e-6, "{normalized:?}");
}

#[test]
fn novelty_rewards_unseen_regions_then_decays() {
    let mut train = TrainRegions::new();
    let spectrum = reaction_spectrum(80.0);
    let analyzer = SpectralRegionAnalyzer::for_spectrum(&spectrum);
    let regions = analyzer.regions(&spectrum);

    let first = score_spectra(&[(&spectrum, regions.clone())], &mut train)[0];
    let repeat = score_spectra(&[(&spectrum, regions.clone())], &mut train)[0];
    assert!(first > 0.0);
    assert!(repeat < first, "repeat {repeat} should score below first {first}");

    // History keeps growing, so repeats keep decaying
    let third = score_spectra(&[(&spectrum, regions)], &mut train)[0];
    assert!(third < repeat);
}

#[test]
fn known_regions_file_seeds_the_history() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("known_regions.json");
    std::fs::write(&path, r#"{"previous_campaign": [[100, 101, 102], [419, 420, 421]]}"#).unwrap();

    let train = TrainRegions::load(&path).unwrap();
    assert_eq!(train.len(), 2);

    // A spectrum whose product peak overlaps the seeded points scores
    // below the same spectrum against an empty history
    let spectrum = reaction_spectrum(80.0);
    let analyzer = SpectralRegionAnalyzer::for_spectrum(&spectrum);
    let regions = analyzer.regions(&spectrum);

    let mut seeded = train;
    let seeded_score = score_spectra(&[(&spectrum, regions.clone())], &mut seeded)[0];
    let mut empty = TrainRegions::new();
    let fresh_score = score_spectra(&[(&spectrum, regions)], &mut empty)[0];
    assert!(seeded_score < fresh_score);
}

#[test]
fn novelty_objective_dispatches_through_the_registry() {
    let registry = LossRegistry::new();
    let spectrum = reaction_spectrum(80.0);
    let analyzer = SpectralRegionAnalyzer::for_spectrum(&spectrum);
    let regions = analyzer.regions(&spectrum);
    let mut train = TrainRegions::new();

    let mut ctx = LossContext {
        spectrum: &spectrum,
        regions: &regions,
        target: None,
        window: None,
        reference: None,
        constraints: &[],
        train: Some(&mut train),
    };
    let score = registry.evaluate("raman_sim", "novelty", &mut ctx);
    assert!(score > 0.0);
    // Evaluation absorbed the spectrum into the history
    assert_eq!(train.len(), 1);
}
