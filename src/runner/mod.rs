//! Stage runner: decide what to run, then run it in dependency order
//!
//! A run goes through three steps:
//! - preflight: every configuration problem (unknown entrypoints, files where
//!   stage directories should be) is reported before any stage starts
//! - planning: the graph is resolved against the stages already done
//! - execution: stages run one after the other; a successful stage writes its
//!   done marker, a failed one halts the run or blocks its dependents

mod dispatch;


use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::fs::WorkDir;
use crate::process::CommandEnv;
use crate::recipe::{ObjectiveSource, Recipe, StageGraph, StageKind};
use crate::registry::Registry;
use crate::shutdown::{CancelToken, INTERRUPTED_EXIT_CODE};

use dispatch::StageOutcome;

/// Exit code of a run in which at least one stage failed.
pub const FAILURE_EXIT_CODE: i32 = 1;

/// What to do with the rest of the run once a stage fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failure.
    #[default]
    HaltAll,
    /// Keep running stages that do not depend on a failed stage.
    KeepGoing,
}

#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    pub work_dir: PathBuf,
    /// Stages requested explicitly; empty means every stage not done yet.
    pub stages: Vec<String>,
    /// Directory of helper scripts for shell stages.
    pub script_dir: Option<PathBuf>,
    pub failure_policy: FailurePolicy,
}

/// Result of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    /// Stages planned but not run because of a failure.
    pub skipped: Vec<String>,
    pub interrupted: bool,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.interrupted
    }

    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            INTERRUPTED_EXIT_CODE
        } else if !self.failed.is_empty() {
            FAILURE_EXIT_CODE
        } else {
            0
        }
    }
}

pub struct Runner {
    recipe: Recipe,
    registry: Registry,
    graph: StageGraph,
    work_dir: WorkDir,
    env: CommandEnv,
    requested: Vec<String>,
    failure_policy: FailurePolicy,
    cancel: CancelToken,
}

impl Runner {
    /// Prepare a run; fails on any configuration problem.
    pub fn new(
        recipe: Recipe,
        registry: Registry,
        config: RunnerConfig,
        cancel: CancelToken,
    ) -> Result<Self> {
        let graph = StageGraph::build(&recipe.stages)?;
        for name in &config.stages {
            if !graph.contains(name) {
                bail!("Unknown stage '{name}'");
            }
        }
        check_entrypoints(&recipe, &registry)?;

        let script_dir = match &config.script_dir {
            Some(dir) => Some(dir.canonicalize().with_context(|| {
                format!("Script directory not found: {}", dir.display())
            })?),
            None => None,
        };
        let work_dir = WorkDir::prepare(&config.work_dir)?;

        Ok(Self {
            recipe,
            registry,
            graph,
            work_dir,
            env: CommandEnv::new(script_dir),
            requested: config.stages,
            failure_policy: config.failure_policy,
            cancel,
        })
    }

    pub fn work_dir(&self) -> &WorkDir {
        &self.work_dir
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    /// Stages this run would execute, in order.
    pub fn plan(&self) -> Result<Vec<String>> {
        let done = self.work_dir.stages_done()?;
        Ok(self.graph.resolve(&self.requested, &done)?)
    }

    pub fn run(&self) -> Result<RunResult> {
        let order = self.plan()?;
        self.check_stage_dirs(&order)?;

        if order.is_empty() {
            info!("All stages are done, nothing to run");
        } else {
            info!(stages = %order.join(", "), "Running stages");
        }

        let mut result = RunResult::default();
        let mut blocked = BTreeSet::new();

        for (i, name) in order.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(stage = %name, "Interrupted before stage started");
                result.interrupted = true;
                break;
            }
            if blocked.contains(name) {
                warn!(stage = %name, "Skipping stage, a dependency failed");
                result.skipped.push(name.clone());
                continue;
            }

            let Some(stage) = self.recipe.stage(name) else {
                bail!("Unknown stage '{name}'");
            };
            let outcome = {
                let _span = tracing::info_span!("stage", name = %name).entered();
                self.run_stage(stage)
            };

            match outcome {
                Ok(StageOutcome::Done) => {
                    self.work_dir.mark_done(name, &stage.cwd)?;
                    info!(stage = %name, "Stage done");
                    result.completed.push(name.clone());
                    continue;
                }
                Ok(StageOutcome::Interrupted) => {
                    warn!(stage = %name, "Stage interrupted, it can be resumed by running again");
                    result.interrupted = true;
                    break;
                }
                Ok(StageOutcome::Failed) | Err(_) if self.cancel.is_cancelled() => {
                    // The signal that cancelled the run also reaches child processes.
                    warn!(stage = %name, "Stage stopped by interrupt, it will run again next time");
                    result.interrupted = true;
                    break;
                }
                Ok(StageOutcome::Failed) => error!(stage = %name, "Stage failed"),
                Err(e) => error!(stage = %name, "Stage failed: {e:#}"),
            }

            result.failed.push(name.clone());
            match self.failure_policy {
                FailurePolicy::HaltAll => {
                    result.skipped.extend(order[i + 1..].iter().cloned());
                    break;
                }
                FailurePolicy::KeepGoing => {
                    blocked.extend(self.graph.transitive_dependents(name)?);
                }
            }
        }

        Ok(result)
    }

    /// Stage directories of planned stages must be directories or absent.
    fn check_stage_dirs(&self, order: &[String]) -> Result<()> {
        let mut problems = Vec::new();
        for name in order {
            if let Some(stage) = self.recipe.stage(name) {
                let dir = self.work_dir.stage_dir(&stage.cwd);
                if dir.exists() && !dir.is_dir() {
                    problems.push(format!(
                        "Stage '{name}': {} exists but is not a directory",
                        dir.display()
                    ));
                }
            }
        }
        if !problems.is_empty() {
            bail!("Invalid stage directories:\n  - {}", problems.join("\n  - "));
        }
        Ok(())
    }
}

/// Every `entrypoint` named in the recipe must be registered.
pub fn check_entrypoints(recipe: &Recipe, registry: &Registry) -> Result<()> {
    let mut missing = Vec::new();
    for stage in &recipe.stages {
        match &stage.kind {
            StageKind::Function { entrypoint } if registry.get_stage(entrypoint).is_none() => {
                missing.push(format!(
                    "Stage '{}': no stage function registered as '{entrypoint}'",
                    stage.name
                ));
            }
            StageKind::Optimisation(spec) => {
                if let ObjectiveSource::Registered(name) = &spec.objective {
                    if registry.get_objective(name).is_none() {
                        missing.push(format!(
                            "Stage '{}': no objective registered as '{name}'",
                            stage.name
                        ));
                    }
                }
            }
            _ => {}
        }
    }
    if !missing.is_empty() {
        bail!("Unknown entrypoints:\n  - {}", missing.join("\n  - "));
    }
    Ok(())
}
