//! A complete optimise-then-evaluate pipeline

use serial_test::serial;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use o2tuner::runner::FailurePolicy;
use o2tuner::{ObjectiveValue, Registry};

use super::helpers::*;

const RECIPE: &str = r#"
config:
  target: 3.0
  events: 100

stages_user:
  reference:
    cmd: "echo reference > reference.txt"
  evaluate:
    entrypoint: evaluate
    deps: [reference]
    optimisations: [optimise]
    config:
      events: 500

stages_optimisation:
  optimise:
    objective: distance
    deps: [reference]
    trials: 12
    sampler:
      name: random
      args: {seed: 11}
    trial_cwd: true
"#;

fn registry(seen: Arc<Mutex<Vec<String>>>) -> Registry {
    Registry::new()
        .objective("distance", |trial, config| {
            let target = config.get_f64("target").unwrap_or(0.0);
            let x = trial.suggest_float("x", 0.0, 6.0)?;
            let n = trial.suggest_int("n", 1, 4)?;
            let dir = trial.work_dir().expect("trial directory").to_path_buf();
            std::fs::write(dir.join("params.txt"), format!("{x} {n}"))?;
            if trial.number() % 3 == 0 {
                trial.annotate("checked", 3.14)?;
            }
            Ok(ObjectiveValue::Single((x - target).abs() + n as f64))
        })
        .stage("evaluate", move |ctx| {
            let inspector = ctx.inspector("optimise").expect("inspector for optimise");
            let mut seen = seen.lock().unwrap();
            seen.push(format!("losses={}", inspector.losses().len()));
            seen.push(format!(
                "checked={}",
                inspector.get_annotation_per_trial("checked").len()
            ));
            seen.push(format!("events={:?}", ctx.config.get_i64("events")));
            seen.push(format!(
                "reference={}",
                std::path::Path::new("../reference/reference.txt").exists()
            ));
            inspector.visualise(Some(ctx.stage_dir))?;
            Ok(true)
        })
}

#[test]
#[serial]
fn test_optimise_then_evaluate() {
    let temp = TempDir::new().unwrap();
    let recipe = write_recipe(temp.path(), "recipe.yaml", RECIPE);
    let work_dir = temp.path().join("run");
    let seen = Arc::new(Mutex::new(Vec::new()));

    let result = run_recipe(
        &recipe,
        &work_dir,
        &registry(Arc::clone(&seen)),
        &[],
        FailurePolicy::HaltAll,
    );

    assert!(result.is_success());
    assert_eq!(result.completed, vec!["reference", "optimise", "evaluate"]);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "losses=12".to_string(),
            "checked=4".to_string(),
            "events=Some(500)".to_string(),
            "reference=true".to_string(),
        ]
    );
    assert_eq!(done_markers(&work_dir), vec!["evaluate", "optimise", "reference"]);

    // one directory per trial, each written by its own trial
    for n in 0..12 {
        let params = work_dir.join(format!("optimise/trial_{n}/params.txt"));
        assert!(params.exists(), "missing {}", params.display());
    }
    assert!(work_dir.join("optimise/optimise.json").exists());
    assert!(work_dir.join("evaluate/importance.json").exists());
    assert!(work_dir.join("reference/reference.log").exists());
}

#[test]
#[serial]
fn test_evaluation_rerun_reuses_study() {
    let temp = TempDir::new().unwrap();
    let recipe = write_recipe(temp.path(), "recipe.yaml", RECIPE);
    let work_dir = temp.path().join("run");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let registry = registry(Arc::clone(&seen));

    run_recipe(&recipe, &work_dir, &registry, &[], FailurePolicy::HaltAll);
    seen.lock().unwrap().clear();

    let again = run_recipe(&recipe, &work_dir, &registry, &["evaluate"], FailurePolicy::HaltAll);
    assert_eq!(again.completed, vec!["evaluate"]);
    assert_eq!(seen.lock().unwrap()[0], "losses=12");
}
