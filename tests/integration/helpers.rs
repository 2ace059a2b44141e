//! Shared test helpers for recipe runs

use std::path::{Path, PathBuf};

use o2tuner::recipe::load_recipe;
use o2tuner::runner::{FailurePolicy, RunResult, Runner, RunnerConfig};
use o2tuner::shutdown::CancelToken;
use o2tuner::Registry;

/// Test helper: Write a recipe file into `dir`
pub fn write_recipe(dir: &Path, file_name: &str, content: &str) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, content).expect("Failed to write recipe");
    path
}

/// Test helper: Load and run a recipe in `work_dir`
pub fn run_recipe(
    recipe: &Path,
    work_dir: &Path,
    registry: &Registry,
    stages: &[&str],
    policy: FailurePolicy,
) -> RunResult {
    let recipe = load_recipe(recipe).expect("Failed to load recipe");
    let config = RunnerConfig {
        work_dir: work_dir.to_path_buf(),
        stages: stages.iter().map(|s| s.to_string()).collect(),
        script_dir: None,
        failure_policy: policy,
    };
    Runner::new(recipe, registry.clone(), config, CancelToken::new())
        .expect("Failed to prepare run")
        .run()
        .expect("Run failed")
}

/// Test helper: Names of the stages with a done marker
pub fn done_markers(work_dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(work_dir.join("o2tuner_done"))
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| {
                    e.file_name()
                        .to_str()
                        .and_then(|n| n.strip_prefix("DONE_"))
                        .map(String::from)
                })
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
