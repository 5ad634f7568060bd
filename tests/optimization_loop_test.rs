//! End-to-end tests for the local optimization loop: template in,
//! suggestions out, artifacts on disk.

use std::collections::BTreeMap;

use chemopt::algorithms::{AlgorithmSettings, DesignType, DoeSettings};
use chemopt::domain::models::{ExperimentMatrix, ParameterSpec, ParameterTemplate, ResultUpdate};
use chemopt::domain::ports::AlgorithmError;
use chemopt::services::{AlgorithmOrchestrator, OrchestratorError};

const BATCHES: [&str; 2] = ["batch 1", "batch 2"];

fn template() -> ParameterTemplate {
    let mut batches = ParameterTemplate::new();
    for batch in BATCHES {
        let mut params = BTreeMap::new();
        for (name, min, max, current) in [
            ("add_volume", 0.5, 2.5, 1.0),
            ("reflux_time", 30.0, 120.0, 60.0),
        ] {
            let mut spec = ParameterSpec::new(name, min, max);
            spec.current_value = current;
            params.insert(name.to_string(), spec);
        }
        batches.insert(batch.to_string(), params);
    }
    batches
}

fn apply_setup(template: &mut ParameterTemplate, setup: &BTreeMap<String, BTreeMap<String, f64>>) {
    for (batch, values) in setup {
        if let Some(params) = template.get_mut(batch) {
            for (name, value) in values {
                if let Some(spec) = params.get_mut(name) {
                    spec.current_value = *value;
                }
            }
        }
    }
}

/// Synthetic objective: yield peaks at volume 1.5, time 75.
fn measure(template: &ParameterTemplate) -> ResultUpdate {
    let mut update = ResultUpdate::new();
    for (batch, params) in template {
        let volume = params["add_volume"].current_value;
        let time = params["reflux_time"].current_value;
        let objective = 1.0 / (1.0 + (volume - 1.5).powi(2) + ((time - 75.0) / 45.0).powi(2));
        let mut values = BTreeMap::new();
        values.insert("spectrum_peak_area_42".to_string(), objective);
        update.insert(batch.clone(), values);
    }
    update
}

#[tokio::test]
async fn random_search_loop_accumulates_history_and_saves() {
    let settings = AlgorithmSettings {
        name: "random".to_string(),
        seed: Some(7),
        ..Default::default()
    };
    let mut orch = AlgorithmOrchestrator::local(settings);
    let mut template = template();
    orch.initialize(&template, "procedure-hash").await.unwrap();

    for _ in 0..5 {
        let result = measure(&template);
        orch.load_data(&template, Some(&result)).unwrap();
        let setup = orch.get_next_setup().await.unwrap();
        assert_eq!(setup.len(), BATCHES.len());
        for values in setup.values() {
            assert!((0.5..=2.5).contains(&values["add_volume"]));
            assert!((30.0..=120.0).contains(&values["reflux_time"]));
        }
        apply_setup(&mut template, &setup);
    }

    // One row per batch per completed iteration
    assert_eq!(orch.matrix().unwrap().n_rows(), 5 * BATCHES.len());

    let dir = tempfile::tempdir().unwrap();
    orch.save(dir.path()).unwrap();
    let loaded = ExperimentMatrix::load(&dir.path().join("experiments.csv"), 2).unwrap();
    assert_eq!(loaded.n_rows(), 10);
    assert_eq!(loaded.parameter_names, vec!["add_volume", "reflux_time"]);

    let snapshot = std::fs::read_to_string(dir.path().join("parameters.json")).unwrap();
    let parsed: ParameterTemplate = serde_json::from_str(&snapshot).unwrap();
    assert_eq!(parsed.len(), BATCHES.len());
}

#[tokio::test]
async fn factorial_design_serves_exactly_its_rows_then_exhausts() {
    let settings = AlgorithmSettings {
        name: "doe".to_string(),
        seed: Some(1),
        doe: DoeSettings {
            design: DesignType::FullFactorial { levels: 2 },
            ..Default::default()
        },
        ..Default::default()
    };
    let mut orch = AlgorithmOrchestrator::local(settings);
    let template = template();
    orch.initialize(&template, "h").await.unwrap();

    // 2 factors at 2 levels -> 4 design rows, 2 batches per call
    let mut served = 0;
    for _ in 0..2 {
        let setup = orch.get_next_setup().await.unwrap();
        served += setup.len();
    }
    assert_eq!(served, 4);

    let err = orch.get_next_setup().await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Algorithm(AlgorithmError::ExhaustedDesign { served: 4, total: 4 })
    ));
}

#[tokio::test]
async fn reproduce_replays_the_latest_setups() {
    let settings = AlgorithmSettings {
        name: "random".to_string(),
        seed: Some(3),
        ..Default::default()
    };
    let mut orch = AlgorithmOrchestrator::local(settings);
    let template = template();
    orch.initialize(&template, "h").await.unwrap();
    orch.load_data(&template, Some(&measure(&template))).unwrap();

    orch.switch_algorithm(AlgorithmSettings {
        name: "reproduce".to_string(),
        ..Default::default()
    })
    .unwrap();

    let setup = orch.get_next_setup().await.unwrap();
    // The latest history rows hold the template's current values
    for values in setup.values() {
        assert_eq!(values["add_volume"], 1.0);
        assert_eq!(values["reflux_time"], 60.0);
    }
}

#[tokio::test]
async fn get_next_setup_before_initialize_is_an_error() {
    let mut orch = AlgorithmOrchestrator::local(AlgorithmSettings::default());
    let err = orch.get_next_setup().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NotInitialized));
}
