//! Failed stages: halting, keeping going and done markers

use tempfile::TempDir;

use o2tuner::runner::FailurePolicy;
use o2tuner::Registry;

use super::helpers::*;

const RECIPE: &str = r#"
stages_user:
  simulate: {cmd: "echo simulated > events.txt"}
  digitise: {cmd: "echo 'no detector' >&2; exit 2", deps: [simulate]}
  reconstruct: {cmd: "true", deps: [digitise]}
  qa: {cmd: "echo qa", deps: [simulate]}
"#;

#[test]
fn test_halt_on_first_failure() {
    let temp = TempDir::new().unwrap();
    let recipe = write_recipe(temp.path(), "recipe.yaml", RECIPE);
    let work_dir = temp.path().join("run");

    let result = run_recipe(&recipe, &work_dir, &Registry::new(), &[], FailurePolicy::HaltAll);

    assert_eq!(result.completed, vec!["simulate"]);
    assert_eq!(result.failed, vec!["digitise"]);
    assert_eq!(result.skipped, vec!["reconstruct", "qa"]);
    assert_eq!(result.exit_code(), 1);
    assert_eq!(done_markers(&work_dir), vec!["simulate"]);

    let log = std::fs::read_to_string(work_dir.join("digitise/digitise.log")).unwrap();
    assert!(log.contains("no detector"));
}

#[test]
fn test_keep_going_runs_independent_branch() {
    let temp = TempDir::new().unwrap();
    let recipe = write_recipe(temp.path(), "recipe.yaml", RECIPE);
    let work_dir = temp.path().join("run");

    let result = run_recipe(&recipe, &work_dir, &Registry::new(), &[], FailurePolicy::KeepGoing);

    assert_eq!(result.completed, vec!["simulate", "qa"]);
    assert_eq!(result.failed, vec!["digitise"]);
    assert_eq!(result.skipped, vec!["reconstruct"]);
    assert_eq!(done_markers(&work_dir), vec!["qa", "simulate"]);
}

#[test]
fn test_fixed_stage_resumes_where_run_stopped() {
    let temp = TempDir::new().unwrap();
    let work_dir = temp.path().join("run");
    let broken = write_recipe(temp.path(), "recipe.yaml", RECIPE);
    run_recipe(&broken, &work_dir, &Registry::new(), &[], FailurePolicy::HaltAll);

    let fixed = write_recipe(
        temp.path(),
        "fixed.yaml",
        &RECIPE.replace("echo 'no detector' >&2; exit 2", "cat ../simulate/events.txt"),
    );
    let result = run_recipe(&fixed, &work_dir, &Registry::new(), &[], FailurePolicy::HaltAll);

    assert_eq!(result.completed, vec!["digitise", "reconstruct", "qa"]);
    assert!(result.is_success());
}
