use std::path::PathBuf;

use mf_model::System;
use mf_project::*;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("mf_project_{}_{}", std::process::id(), name))
}

fn sample_system() -> System {
    let mut system = System::new();
    system.add_species("S", 5.0, "substrate").unwrap();
    system.add_species("P", 0.0, "product").unwrap();
    system.add_parameter("vmax", 1.2, "").unwrap();
    system.add_parameter("km", 0.8, "").unwrap();
    system.define_interaction("mm", ["s", "p"]).unwrap();
    system.set_rule("mm", "s", "-v * s / (k + s)", "consumption").unwrap();
    system.set_rule("mm", "p", "v * s / (k + s)", "production").unwrap();
    system.add_interaction("mm", &["S", "P"], &["vmax", "km"]).unwrap();
    system
}

#[test]
fn roundtrip_yaml_empty_model() {
    let model = ModelFile::new("Empty Model");
    validate_model(&model).unwrap();

    let path = temp_path("empty.yaml");
    save_yaml(&path, &model).unwrap();
    let loaded = load_yaml(&path).unwrap();
    assert_eq!(model, loaded);
}

#[test]
fn roundtrip_json_exported_system() {
    let model = export_system(&sample_system(), "michaelis-menten");
    let path = temp_path("mm.json");
    save(&path, &model).unwrap();
    let loaded = load(&path).unwrap();
    assert_eq!(model, loaded);
}

#[test]
fn exported_system_rebuilds_to_same_model() {
    let mut original = sample_system();
    let model = export_system(&original, "mm");
    let mut rebuilt = build_system(&model).unwrap();

    let a = original.compile().unwrap();
    let b = rebuilt.compile().unwrap();
    assert_eq!(a.len(), b.len());
    for (x, y) in a.rate_laws().iter().zip(b.rate_laws()) {
        assert_eq!(x.species_id(), y.species_id());
        assert_eq!(x.expr(), y.expr());
    }
}

#[test]
fn unknown_extension_is_rejected() {
    let err = load(&temp_path("model.toml")).unwrap_err();
    assert!(matches!(err, ProjectError::UnsupportedFormat(ext) if ext == "toml"));
}

#[test]
fn yaml_with_version_one_is_migrated() {
    let yaml = r#"
version: 1
name: legacy
species:
  - id: A
    initial_value: 1.0
parameters:
  - id: k
    value: 0.1
templates:
  - id: decay
    variables: [x]
    rules:
      - variable: x
        expression: -r * x
interactions:
  - template: decay
    species: [A]
    parameters: [k]
"#;
    let model = parse_yaml(yaml).unwrap();
    assert_eq!(model.version, LATEST_VERSION);
    assert_eq!(model.species[0].name, "A");
    assert_eq!(model.templates[0].rules[0].name, "decay:x");
}

#[test]
fn invalid_yaml_reference_fails_load() {
    let yaml = r#"
version: 2
name: broken
species:
  - id: A
    initial_value: 1.0
templates:
  - id: decay
    variables: [x]
    rules:
      - variable: x
        expression: -x
interactions:
  - template: decay
    species: [B]
"#;
    let err = parse_yaml(yaml).unwrap_err();
    assert!(matches!(
        err,
        ProjectError::Validation(ValidationError::MissingReference { ref id, .. }) if id == "B"
    ));
}
