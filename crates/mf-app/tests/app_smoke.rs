//! Smoke tests for the mf-app service layer against the bundled demo model.

use std::path::PathBuf;

use mf_app::{
    BatchRequest, Dose, LiveRequest, describe_species, export_csv, load_model, run_batch, run_live,
    save_model, validate_model,
};
use mf_sim::{IntegratorType, RealTimeConfig, SimOptions};

fn demo_path() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.pop(); // crates
    path.pop(); // repo root
    path.push("demos");
    path.push("glucose_insulin.yaml");
    path
}

fn fast_live_config() -> RealTimeConfig {
    RealTimeConfig {
        refresh_rate_ms: 10,
        t_scale: 1.0,
        buffer_size: 10.0,
        sim: SimOptions::fixed(0.002, IntegratorType::Rk4),
    }
}

#[test]
fn demo_model_loads_and_lists_species() {
    let model = load_model(&demo_path()).expect("demo should load");
    validate_model(&model).expect("demo should validate");

    let species = describe_species(&model).expect("demo should compile");
    assert_eq!(species.len(), 2);
    assert_eq!(species[0].id, "Glucose");
    assert_eq!(species[0].terms, 3);
    assert_eq!(species[1].id, "Insulin");
    assert_eq!(species[1].terms, 2);
}

#[test]
fn batch_run_uses_simulation_section() {
    let path = demo_path();
    let response = run_batch(&BatchRequest {
        model_path: &path,
        t0: None,
        tf: Some(2.0),
        options: None,
    })
    .expect("batch run should succeed");

    let trajectory = &response.trajectory;
    assert_eq!(trajectory.time().first().copied(), Some(0.0));
    assert!((trajectory.last_time().unwrap() - 2.0).abs() < 1e-9);
    assert_eq!(response.final_values.len(), 2);
    let (id, glucose) = &response.final_values[0];
    assert_eq!(id, "Glucose");
    assert_eq!(Some(*glucose), trajectory.last_sample("Glucose"));
    assert!(response.timing.total_time_s >= response.timing.solve_time_s);
}

#[test]
fn batch_run_rejects_reversed_span() {
    let path = demo_path();
    let err = run_batch(&BatchRequest {
        model_path: &path,
        t0: Some(5.0),
        tf: Some(1.0),
        options: None,
    })
    .unwrap_err();
    assert!(matches!(err, mf_app::AppError::Simulation(_)), "{err}");
}

#[test]
fn live_run_applies_doses() {
    let path = demo_path();
    let request = |doses: Vec<Dose>| LiveRequest {
        model_path: &path,
        duration_ms: 50,
        doses,
        config: Some(fast_live_config()),
    };

    let plain = run_live(&request(Vec::new())).expect("live run should succeed");
    assert_eq!(plain.ticks, 5);
    assert_eq!(plain.failed_ticks, 0);
    assert!(!plain.buffer.is_empty());

    let dosed = run_live(&request(vec!["Glucose=3@2".parse().unwrap()]))
        .expect("dosed live run should succeed");
    assert_eq!(dosed.ticks, 5);
    assert_eq!(dosed.rejected_doses, 0);
    assert!(dosed.final_values[0].1 > plain.final_values[0].1 + 1.0);
}

#[test]
fn live_run_counts_unknown_species_dose() {
    let path = demo_path();
    let response = run_live(&LiveRequest {
        model_path: &path,
        duration_ms: 20,
        doses: vec!["Cortisol=1@1".parse().unwrap()],
        config: Some(fast_live_config()),
    })
    .expect("live run should succeed");
    assert_eq!(response.rejected_doses, 1);
}

#[test]
fn save_and_export_roundtrip() {
    let dir = std::env::temp_dir().join(format!("mf_app_smoke_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let model = load_model(&demo_path()).unwrap();
    let json_path = dir.join("demo.json");
    save_model(&json_path, &model).unwrap();
    let reloaded = load_model(&json_path).unwrap();
    assert_eq!(reloaded.species, model.species);
    assert_eq!(reloaded.interactions, model.interactions);

    let response = run_batch(&BatchRequest {
        model_path: &json_path,
        t0: Some(0.0),
        tf: Some(0.5),
        options: Some(SimOptions::fixed(0.1, IntegratorType::Rk4)),
    })
    .unwrap();
    let csv_path = dir.join("out.csv");
    export_csv(&csv_path, &response.trajectory).unwrap();
    let csv = std::fs::read_to_string(&csv_path).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("time,Glucose,Insulin"));
    assert_eq!(lines.count(), 6);

    let _ = std::fs::remove_dir_all(&dir);
}
