//! Exit codes of the command-line entry point

use serial_test::serial;
use tempfile::TempDir;

use o2tuner::cli::{run_with_args, FATAL_EXIT_CODE};
use o2tuner::shutdown::INTERRUPTED_EXIT_CODE;
use o2tuner::{ObjectiveValue, Registry};

use super::helpers::*;

fn args<'a>(command: &'a str, work_dir: &'a str, recipe: &'a str, extra: &[&'a str]) -> Vec<&'a str> {
    let mut args = vec!["o2tuner", "-q", command, "-w", work_dir, "-c", recipe];
    args.extend_from_slice(extra);
    args
}

#[test]
#[serial]
fn test_run_exit_codes() {
    let temp = TempDir::new().unwrap();
    let work_dir = temp.path().join("run");
    let work = work_dir.to_str().unwrap();

    let ok = write_recipe(temp.path(), "ok.toml", "[stages_user.a]\ncmd = \"true\"\n");
    assert_eq!(run_with_args(args("run", work, ok.to_str().unwrap(), &[]), Registry::new()), 0);
    assert_eq!(done_markers(&work_dir), vec!["a"]);

    let failing = write_recipe(temp.path(), "fail.yaml", "stages_user:\n  b: {cmd: \"exit 1\"}\n");
    assert_eq!(
        run_with_args(args("run", work, failing.to_str().unwrap(), &["--keep-going"]), Registry::new()),
        1
    );
    assert_ne!(INTERRUPTED_EXIT_CODE, 1);
}

#[test]
fn test_configuration_errors_are_fatal() {
    let temp = TempDir::new().unwrap();
    let work = temp.path().to_str().unwrap();

    let cyclic = write_recipe(
        temp.path(),
        "cyclic.yaml",
        "stages_user:\n  a: {cmd: \"true\", deps: [b]}\n  b: {cmd: \"true\", deps: [a]}\n",
    );
    assert_eq!(
        run_with_args(args("graph", work, cyclic.to_str().unwrap(), &[]), Registry::new()),
        FATAL_EXIT_CODE
    );

    let unregistered = write_recipe(
        temp.path(),
        "unregistered.yaml",
        "stages_optimisation:\n  opt: {entrypoint: nowhere}\n",
    );
    assert_eq!(
        run_with_args(args("run", work, unregistered.to_str().unwrap(), &[]), Registry::new()),
        FATAL_EXIT_CODE
    );

    let unknown_field = write_recipe(
        temp.path(),
        "unknown.yaml",
        "stages_user:\n  a: {cmd: \"true\", python: {file: x.py}}\n",
    );
    assert_eq!(
        run_with_args(args("graph", work, unknown_field.to_str().unwrap(), &[]), Registry::new()),
        FATAL_EXIT_CODE
    );
}

#[test]
#[serial]
fn test_inspect_writes_figures() {
    let temp = TempDir::new().unwrap();
    let work_dir = temp.path().join("run");
    let work = work_dir.to_str().unwrap();
    let recipe = write_recipe(
        temp.path(),
        "recipe.yaml",
        r#"
stages_optimisation:
  optimise:
    entrypoint: line
    trials: 6
    study: {storage: "sqlite:///study.db"}
"#,
    );
    let registry = Registry::new().objective("line", |trial, _| {
        let x = trial.suggest_int("x", 0, 10)?;
        Ok(ObjectiveValue::Single(x as f64))
    });

    // not run yet
    assert_eq!(
        run_with_args(args("inspect", work, recipe.to_str().unwrap(), &["optimise"]), registry.clone()),
        FATAL_EXIT_CODE
    );

    assert_eq!(run_with_args(args("run", work, recipe.to_str().unwrap(), &[]), registry.clone()), 0);
    let out = temp.path().join("figures");
    assert_eq!(
        run_with_args(
            args(
                "inspect",
                work,
                recipe.to_str().unwrap(),
                &["optimise", "--out", out.to_str().unwrap()]
            ),
            registry
        ),
        0
    );
    assert!(out.join("slices.json").exists());
    assert!(out.join("loss_feature_history.json").exists());
}

#[test]
fn test_graph_does_not_run_anything() {
    let temp = TempDir::new().unwrap();
    let work_dir = temp.path().join("run");
    let recipe = write_recipe(
        temp.path(),
        "recipe.yaml",
        "stages_user:\n  a: {cmd: \"touch ran\"}\n",
    );
    assert_eq!(
        run_with_args(
            args("graph", work_dir.to_str().unwrap(), recipe.to_str().unwrap(), &["--all"]),
            Registry::new()
        ),
        0
    );
    assert!(!work_dir.join("a").exists());
}
