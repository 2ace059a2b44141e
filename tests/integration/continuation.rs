//! Resuming studies: topping up the trial budget and parallel workers

use serial_test::serial;
use std::collections::BTreeSet;
use tempfile::TempDir;

use o2tuner::runner::FailurePolicy;
use o2tuner::study::{open_storage, FrozenTrial, TrialState};
use o2tuner::{Inspector, ObjectiveValue, Registry};

use super::helpers::*;

fn recipe(trials: u64, jobs: u64, storage: Option<&str>) -> String {
    let study = match storage {
        Some(url) => format!("    study: {{name: opt1, storage: \"{url}\"}}\n"),
        None => "    study: {name: opt1}\n".to_string(),
    };
    format!(
        r#"
stages_optimisation:
  optimise:
    entrypoint: parabola
    trials: {trials}
    jobs: {jobs}
    trial_cwd: true
{study}"#
    )
}

fn registry() -> Registry {
    Registry::new().objective("parabola", |trial, _| {
        let x = trial.suggest_float("x", -5.0, 5.0)?;
        Ok(ObjectiveValue::Single(x * x))
    })
}

fn stored_trials(work_dir: &std::path::Path) -> Vec<FrozenTrial> {
    let storage = open_storage("sqlite:///opt.db", &work_dir.join("optimise")).unwrap();
    Inspector::load("opt1", storage).unwrap().trials().to_vec()
}

#[test]
#[serial]
fn test_sqlite_study_tops_up_to_new_total() {
    let temp = TempDir::new().unwrap();
    let work_dir = temp.path().join("run");

    let first = write_recipe(temp.path(), "first.yaml", &recipe(100, 1, Some("sqlite:///opt.db")));
    let result = run_recipe(&first, &work_dir, &registry(), &[], FailurePolicy::HaltAll);
    assert!(result.is_success());
    let before = stored_trials(&work_dir);
    assert_eq!(before.len(), 100);

    let second = write_recipe(temp.path(), "second.yaml", &recipe(150, 1, Some("sqlite:///opt.db")));
    let result = run_recipe(&second, &work_dir, &registry(), &["optimise"], FailurePolicy::HaltAll);
    assert_eq!(result.completed, vec!["optimise"]);

    let after = stored_trials(&work_dir);
    assert_eq!(after.len(), 150);
    assert_eq!(&after[..100], &before[..]);
    let numbers: BTreeSet<u64> = after.iter().map(|t| t.number).collect();
    assert_eq!(numbers, (0..150).collect());
}

#[test]
#[serial]
fn test_budget_already_used_adds_nothing() {
    let temp = TempDir::new().unwrap();
    let work_dir = temp.path().join("run");
    let path = write_recipe(temp.path(), "recipe.yaml", &recipe(10, 1, Some("sqlite:///opt.db")));

    run_recipe(&path, &work_dir, &registry(), &[], FailurePolicy::HaltAll);
    let lower = write_recipe(temp.path(), "lower.yaml", &recipe(5, 1, Some("sqlite:///opt.db")));
    run_recipe(&lower, &work_dir, &registry(), &["optimise"], FailurePolicy::HaltAll);

    assert_eq!(stored_trials(&work_dir).len(), 10);
}

#[test]
#[serial]
fn test_parallel_workers_share_sqlite_study() {
    let temp = TempDir::new().unwrap();
    let work_dir = temp.path().join("run");
    let path = write_recipe(temp.path(), "recipe.yaml", &recipe(23, 4, Some("sqlite:///opt.db")));

    let result = run_recipe(&path, &work_dir, &registry(), &[], FailurePolicy::HaltAll);
    assert!(result.is_success());

    let trials = stored_trials(&work_dir);
    assert_eq!(trials.len(), 23);
    assert!(trials.iter().all(|t| t.state == TrialState::Complete));
    let numbers: BTreeSet<u64> = trials.iter().map(|t| t.number).collect();
    assert_eq!(numbers.len(), 23);
    for n in numbers {
        assert!(work_dir.join(format!("optimise/trial_{n}")).is_dir());
    }
}

#[test]
#[serial]
fn test_memory_study_resumes_from_snapshot() {
    let temp = TempDir::new().unwrap();
    let work_dir = temp.path().join("run");

    // several jobs without storage fall back to one
    let first = write_recipe(temp.path(), "first.yaml", &recipe(5, 3, None));
    run_recipe(&first, &work_dir, &registry(), &[], FailurePolicy::HaltAll);
    let second = write_recipe(temp.path(), "second.yaml", &recipe(8, 3, None));
    run_recipe(&second, &work_dir, &registry(), &["optimise"], FailurePolicy::HaltAll);

    let snapshot = o2tuner::study::StudySnapshot::load(&work_dir.join("optimise/opt1.json")).unwrap();
    assert_eq!(snapshot.study_name, "opt1");
    assert_eq!(snapshot.trials.len(), 8);
}
