//! Optimisation stages: start or resume a study and spread its trials over workers

pub mod budget;
pub mod command;

use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::UserConfig;
use crate::fs::DirGuard;
use crate::process::CommandEnv;
use crate::recipe::{ObjectiveSource, OptimisationSpec};
use crate::registry::Registry;
use crate::shutdown::CancelToken;
use crate::study::{
    construct_sampler, open_storage, open_storage_read_only, MemoryStorage, ObjectiveValue,
    OptimizeSummary, Storage, StorageError, Study, StudySnapshot, Trial,
};

pub use budget::{remaining_trials, split_trials};
pub use command::CommandObjective;

type Objective = Arc<dyn Fn(&mut Trial) -> Result<ObjectiveValue> + Send + Sync>;

/// Everything an optimisation stage needs besides its settings.
#[derive(Debug)]
pub struct OptimisationContext<'a> {
    pub stage: &'a str,
    pub stage_dir: &'a Path,
    pub log_file: &'a Path,
    pub config: &'a UserConfig,
    pub registry: &'a Registry,
    pub env: &'a CommandEnv,
    pub cancel: &'a CancelToken,
}

/// What an optimisation stage did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisationReport {
    pub study_name: String,
    /// Trials in storage before this run.
    pub recorded_before: u64,
    /// Trials this run set out to add.
    pub planned: u64,
    pub jobs: u64,
    pub summary: OptimizeSummary,
}

impl OptimisationReport {
    pub fn interrupted(&self) -> bool {
        self.summary.interrupted
    }
}

/// Path of the JSON snapshot of an in-memory study.
pub fn snapshot_path(stage_dir: &Path, study_name: &str) -> PathBuf {
    stage_dir.join(format!("{study_name}.json"))
}

/// Storage of a study: the configured URL, or memory seeded from a snapshot.
pub fn study_storage(spec: &OptimisationSpec, stage_dir: &Path) -> Result<Arc<dyn Storage>> {
    storage_with(spec, stage_dir, open_storage)
}

/// Storage of a study for reading only; a missing database is an error.
pub fn study_storage_read_only(
    spec: &OptimisationSpec,
    stage_dir: &Path,
) -> Result<Arc<dyn Storage>> {
    storage_with(spec, stage_dir, open_storage_read_only)
}

fn storage_with(
    spec: &OptimisationSpec,
    stage_dir: &Path,
    open: fn(&str, &Path) -> Result<Arc<dyn Storage>, StorageError>,
) -> Result<Arc<dyn Storage>> {
    match &spec.storage {
        Some(url) => {
            open(url, stage_dir).with_context(|| format!("Failed to open storage '{url}'"))
        }
        None => {
            let path = snapshot_path(stage_dir, &spec.study_name);
            if path.exists() {
                let snapshot = StudySnapshot::load(&path)?;
                if snapshot.study_name != spec.study_name {
                    bail!(
                        "snapshot {} holds study '{}', expected '{}'",
                        path.display(),
                        snapshot.study_name,
                        spec.study_name
                    );
                }
                Ok(Arc::new(MemoryStorage::from_snapshot(snapshot)))
            } else {
                Ok(Arc::new(MemoryStorage::new()))
            }
        }
    }
}

fn build_objective(spec: &OptimisationSpec, ctx: &OptimisationContext<'_>) -> Result<Objective> {
    match &spec.objective {
        ObjectiveSource::Registered(name) => {
            let func = ctx
                .registry
                .get_objective(name)
                .ok_or_else(|| anyhow!("no objective registered under '{name}'"))?;
            let config = ctx.config.clone();
            Ok(Arc::new(move |trial: &mut Trial| func(trial, &config)))
        }
        ObjectiveSource::Command(cmd) => {
            let objective = CommandObjective::new(
                cmd,
                spec.search_space.clone(),
                ctx.stage_dir.to_path_buf(),
                ctx.log_file.to_path_buf(),
                ctx.env.clone(),
            );
            Ok(Arc::new(move |trial: &mut Trial| objective.evaluate(trial)))
        }
    }
}

/// Run (or continue) the study of an optimisation stage.
pub fn run_optimisation(
    spec: &OptimisationSpec,
    ctx: &OptimisationContext<'_>,
) -> Result<OptimisationReport> {
    let objective = build_objective(spec, ctx)?;
    let sampler = construct_sampler(spec.sampler.as_ref())?;

    let mut jobs = spec.jobs.max(1);
    if spec.storage.is_none() && jobs > 1 {
        warn!(
            stage = ctx.stage,
            jobs, "No storage provided, running only one job"
        );
        jobs = 1;
    }

    let storage = study_storage(spec, ctx.stage_dir)?;
    let study = Study::load_or_create(&spec.study_name, &spec.directions, storage, sampler)?;
    study.fail_stale_trials()?;

    let recorded_before = study.recorded_trials()?;
    let planned = remaining_trials(spec.trials, recorded_before);
    info!(
        stage = ctx.stage,
        study = study.name(),
        jobs,
        target = spec.trials,
        recorded = recorded_before,
        planned,
        "Starting optimisation"
    );

    let trial_root = spec.trial_cwd.then_some(ctx.stage_dir);
    let summary = if planned == 0 {
        info!(study = study.name(), "Trial budget already used up");
        OptimizeSummary::default()
    } else {
        run_workers(&study, spec, ctx, &objective, split_trials(planned, jobs), trial_root)?
    };

    if spec.storage.is_none() {
        let path = snapshot_path(ctx.stage_dir, &spec.study_name);
        StudySnapshot {
            study_name: study.name().to_string(),
            directions: study.directions().to_vec(),
            trials: study.trials()?,
        }
        .save(&path)?;
        info!(path = %path.display(), "Saved study snapshot");
    }

    info!(
        study = study.name(),
        complete = summary.complete,
        pruned = summary.pruned,
        failed = summary.failed,
        interrupted = summary.interrupted,
        "Optimisation finished"
    );

    Ok(OptimisationReport {
        study_name: study.name().to_string(),
        recorded_before,
        planned,
        jobs,
        summary,
    })
}

fn run_workers(
    study: &Study,
    spec: &OptimisationSpec,
    ctx: &OptimisationContext<'_>,
    objective: &Objective,
    shares: Vec<u64>,
    trial_root: Option<&Path>,
) -> Result<OptimizeSummary> {
    if let [n_trials] = shares.as_slice() {
        // A lone worker owns the process working directory.
        let in_trial_dir = |t: &mut Trial| {
            let _guard = t.work_dir().map(DirGuard::enter).transpose()?;
            objective(t)
        };
        return study.optimize(in_trial_dir, *n_trials, ctx.cancel, trial_root);
    }

    // One storage handle per worker, as separate processes would have.
    let mut workers = Vec::with_capacity(shares.len());
    for n_trials in shares.into_iter().filter(|n| *n > 0) {
        let handle = match &spec.storage {
            Some(url) => study.with_storage(open_storage(url, ctx.stage_dir)?),
            None => study.clone(),
        };
        workers.push((handle, n_trials));
    }

    let results: Vec<Result<OptimizeSummary>> = std::thread::scope(|scope| {
        let handles: Vec<_> = workers
            .iter()
            .enumerate()
            .map(|(worker, (study, n_trials))| {
                let objective = Arc::clone(objective);
                let cancel = ctx.cancel;
                scope.spawn(move || {
                    let _span = tracing::info_span!("worker", worker).entered();
                    study.optimize(|t| objective(t), *n_trials, cancel, trial_root)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(anyhow!("optimisation worker panicked")))
            })
            .collect()
    });

    let mut total = OptimizeSummary::default();
    for result in results {
        total.merge(&result?);
    }
    Ok(total)
}
