//! Integration tests: binding, aggregation and compilation through `System`.

use std::collections::HashMap;

use mf_expr::Expr;
use mf_model::{ModelError, System};
use proptest::prelude::*;

fn glucose_system() -> System {
    let mut system = System::new();
    system.add_species("Glucose", 5.0, "glucose").unwrap();
    system.add_parameter("eta", 0.3, "uptake rate").unwrap();
    system.define_interaction("uptake", ["a"]).unwrap();
    system.set_rule("uptake", "a", "-alpha*a", "uptake").unwrap();
    system.add_interaction("uptake", &["Glucose"], &["eta"]).unwrap();
    system
}

#[test]
fn parameter_order_for_fixed_template() {
    let mut system = System::new();
    let template = system.define_interaction("michaelis", ["s", "p"]).unwrap();
    template.set_rule("s", "-vmax * s / (km + s)", "consumption").unwrap();
    template.set_rule("p", "vmax * s / (km + s) - kout * p + vmax", "production").unwrap();
    assert_eq!(
        system.template("michaelis").unwrap().parameters(),
        vec!["vmax", "km", "kout"]
    );
}

#[test]
fn wrong_arity_mutates_nothing() {
    let mut system = glucose_system();
    system.add_species("Insulin", 1.0, "insulin").unwrap();
    system.compile().unwrap();

    let instances_before = system.instances().len();
    let species_before: Vec<String> = system.species().ids().map(String::from).collect();
    let parameters_before: Vec<String> = system.parameters().ids().map(String::from).collect();
    let revision_before = system.revision();

    let err = system
        .add_interaction("uptake", &["Glucose", "Insulin"], &["eta"])
        .unwrap_err();
    assert_eq!(
        err,
        ModelError::ArityMismatch {
            template: "uptake".into(),
            what: "species",
            expected: 1,
            actual: 2
        }
    );

    assert_eq!(system.instances().len(), instances_before);
    assert_eq!(
        system.species().ids().map(String::from).collect::<Vec<_>>(),
        species_before
    );
    assert_eq!(
        system.parameters().ids().map(String::from).collect::<Vec<_>>(),
        parameters_before
    );
    assert_eq!(system.revision(), revision_before);
    assert!(system.model_is_current());
}

#[test]
fn unknown_ids_are_rejected_before_mutation() {
    let mut system = glucose_system();
    assert_eq!(
        system.add_interaction("uptake", &["Fructose"], &["eta"]),
        Err(ModelError::UnknownSpecies { id: "Fructose".into() })
    );
    assert_eq!(
        system.add_interaction("uptake", &["Glucose"], &["theta"]),
        Err(ModelError::UnknownParameter { id: "theta".into() })
    );
    assert_eq!(
        system.add_interaction("nope", &["Glucose"], &["eta"]),
        Err(ModelError::UnknownTemplate { id: "nope".into() })
    );
    assert_eq!(system.instances().len(), 1);
}

#[test]
fn substituted_copy_is_independent_of_template() {
    let mut system = glucose_system();
    let mut mutated = system.instances()[0].substituted()[0].1.clone();
    mutated.walk_mut(&mut |node| {
        if let Expr::Sym(name) = node {
            *name = "CHANGED".to_string();
        }
    });
    assert_eq!(mutated.to_string(), "-CHANGED * CHANGED");

    let template = system.template("uptake").unwrap();
    assert_eq!(
        template.rule("a").unwrap().expression().unwrap().to_string(),
        "-alpha * a"
    );
    assert_eq!(
        system.instances()[0].substituted()[0].1.to_string(),
        "-eta * Glucose"
    );

    // Compiling twice never feeds a previous rate law back into the next one.
    system.compile().unwrap();
    system.compile().unwrap();
    let species = system.species().get("Glucose").unwrap();
    assert_eq!(species.rate_law.as_ref().unwrap().to_string(), "-eta * Glucose");
}

#[test]
fn aggregation_is_left_associated_in_registration_order() {
    let mut system = System::new();
    system.add_species("X", 1.0, "x").unwrap();
    system.add_parameter("k1", 1.0, "").unwrap();
    system.add_parameter("k2", 2.0, "").unwrap();
    system.add_parameter("k3", 3.0, "").unwrap();
    system.define_interaction("source", ["x"]).unwrap();
    system.set_rule("source", "x", "k", "").unwrap();
    for k in ["k1", "k2", "k3"] {
        system.add_interaction("source", &["X"], &[k]).unwrap();
    }

    let model = system.compile().unwrap();
    let law = model.rate_law(0).unwrap();
    assert_eq!(law.terms(), 3);
    assert_eq!(law.expr(), &mf_expr::parse("(k1 + k2) + k3").unwrap());
    assert_eq!(law.expr().to_string(), "k1 + k2 + k3");
}

#[test]
fn species_without_terms_get_zero() {
    let mut system = glucose_system();
    system.add_species("Bystander", 2.0, "").unwrap();
    let model = system.compile().unwrap();
    let law = model.rate_law(1).unwrap();
    assert_eq!(law.species_id(), "Bystander");
    assert_eq!(law.terms(), 0);
    assert_eq!(law.expr(), &Expr::zero());
}

#[test]
fn cascading_species_removal_shrinks_model() {
    let mut system = glucose_system();
    system.add_species("X", 1.0, "").unwrap();
    system.add_parameter("k", 0.1, "").unwrap();
    system.define_interaction("convert", ["from", "to"]).unwrap();
    system.set_rule("convert", "from", "-k * from", "").unwrap();
    system.set_rule("convert", "to", "k * from", "").unwrap();
    system.add_interaction("convert", &["X", "Glucose"], &["k"]).unwrap();

    let before = system.compile().unwrap().len();
    assert_eq!(system.instances().len(), 2);

    system.remove_species("X").unwrap();
    assert_eq!(system.instances().len(), 1);
    assert!(system.instances().iter().all(|i| !i.binds_species("X")));

    let after = system.compile().unwrap();
    assert_eq!(after.len(), before - 1);
    assert_eq!(after.rate_law(0).unwrap().expr().to_string(), "-eta * Glucose");
}

#[test]
fn remove_interactions_by_species_and_name() {
    let mut system = glucose_system();
    system.add_species("Y", 1.0, "").unwrap();
    system.define_interaction("grow", ["y"]).unwrap();
    system.set_rule("grow", "y", "r * y", "").unwrap();
    system.add_parameter("r", 0.2, "").unwrap();
    system.add_interaction("grow", &["Y"], &["r"]).unwrap();
    system.add_interaction("grow", &["Glucose"], &["r"]).unwrap();

    assert_eq!(system.remove_interactions_by_species(&["Y"]), 1);
    assert_eq!(system.remove_interactions_by_name("grow"), 1);
    assert_eq!(system.instances().len(), 1);
    assert_eq!(system.remove_interactions_by_name("grow"), 0);
}

#[test]
fn named_binding_and_parameter_cascade() {
    let mut system = System::new();
    system.add_species("A", 1.0, "").unwrap();
    system.add_parameter("p", 1.0, "").unwrap();
    system.define_interaction("t", ["a"]).unwrap();
    system.set_rule("t", "a", "-q * a", "").unwrap();
    let bindings = HashMap::from([
        ("a".to_string(), "A".to_string()),
        ("q".to_string(), "p".to_string()),
    ]);
    system.add_interaction_named("t", &bindings).unwrap();
    assert_eq!(
        system.compile().unwrap().rate_law(0).unwrap().expr().to_string(),
        "-p * A"
    );

    system.remove_parameter("p").unwrap();
    assert!(system.instances().is_empty());
    assert!(!system.model_is_current());
    assert_eq!(system.compile().unwrap().rate_law(0).unwrap().terms(), 0);
}

fn eval_single(system: &mut System, glucose: f64, eta: f64) -> f64 {
    let model = system.compile().unwrap();
    let vars = HashMap::from([("Glucose".to_string(), glucose), ("eta".to_string(), eta)]);
    model.evaluate_named(&vars).unwrap()[0]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    #[test]
    fn substitution_matches_hand_written_term(glucose in 0.001_f64..1000.0, eta in 0.001_f64..10.0) {
        let mut system = glucose_system();
        let value = eval_single(&mut system, glucose, eta);
        prop_assert!((value - (-eta * glucose)).abs() <= 1e-9);
    }

    #[test]
    fn aggregation_value_is_order_independent(
        x in 0.01_f64..50.0,
        k1 in 0.01_f64..5.0,
        k2 in 0.01_f64..5.0,
    ) {
        let build = |first: &str, second: &str| {
            let mut system = System::new();
            system.add_species("X", x, "").unwrap();
            system.add_parameter("k1", k1, "").unwrap();
            system.add_parameter("k2", k2, "").unwrap();
            system.define_interaction("loss", ["s"]).unwrap();
            system.set_rule("loss", "s", "-k * s", "").unwrap();
            system.define_interaction("gain", ["s"]).unwrap();
            system.set_rule("gain", "s", "k * s^2", "").unwrap();
            system.add_interaction(first, &["X"], &[if first == "loss" { "k1" } else { "k2" }]).unwrap();
            system.add_interaction(second, &["X"], &[if second == "loss" { "k1" } else { "k2" }]).unwrap();
            let model = system.compile().unwrap();
            let mut out = [0.0];
            model.evaluate_into(&[x, k1, k2], &mut out).unwrap();
            out[0]
        };

        let a = build("loss", "gain");
        let b = build("gain", "loss");
        let expected = -k1 * x + k2 * x * x;
        prop_assert!((a - b).abs() <= 1e-9 * expected.abs().max(1.0));
        prop_assert!((a - expected).abs() <= 1e-9 * expected.abs().max(1.0));
    }
}
