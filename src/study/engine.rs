//! Study handle: ask / tell / optimize

use anyhow::{Context, Result};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::{StorageError, TrialPruned};
use super::objective::{Direction, ObjectiveValue};
use super::sampler::Sampler;
use super::storage::{Storage, StudyRecord};
use super::trial::{FrozenTrial, Trial, TrialOutcome, TrialState};
use crate::shutdown::CancelToken;

/// Counts of what one [`Study::optimize`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeSummary {
    pub complete: u64,
    pub pruned: u64,
    pub failed: u64,
    /// The cancellation flag stopped the loop before the budget was used.
    pub interrupted: bool,
}

impl OptimizeSummary {
    pub fn total(&self) -> u64 {
        self.complete + self.pruned + self.failed
    }

    pub fn merge(&mut self, other: &OptimizeSummary) {
        self.complete += other.complete;
        self.pruned += other.pruned;
        self.failed += other.failed;
        self.interrupted |= other.interrupted;
    }
}

/// A named optimisation study living in a storage backend.
#[derive(Clone)]
pub struct Study {
    record: StudyRecord,
    storage: Arc<dyn Storage>,
    sampler: Arc<dyn Sampler>,
}

impl Study {
    /// Create the study, or attach to an existing one of the same name.
    ///
    /// Attaching with directions other than the stored ones is an error.
    pub fn load_or_create(
        name: &str,
        directions: &[Direction],
        storage: Arc<dyn Storage>,
        sampler: Arc<dyn Sampler>,
    ) -> Result<Self, StorageError> {
        let directions = if directions.is_empty() {
            &[Direction::Minimize][..]
        } else {
            directions
        };
        let (record, created) = storage.create_or_load_study(name, directions)?;
        if created {
            info!(study = name, storage = %storage.describe(), "Created study");
        } else {
            info!(study = name, storage = %storage.describe(), "Resuming study");
        }
        Ok(Self {
            record,
            storage,
            sampler,
        })
    }

    /// Attach to an existing study.
    pub fn load(
        name: &str,
        storage: Arc<dyn Storage>,
        sampler: Arc<dyn Sampler>,
    ) -> Result<Self, StorageError> {
        let record = storage
            .load_study(name)?
            .ok_or_else(|| StorageError::UnknownStudy(name.to_string()))?;
        Ok(Self {
            record,
            storage,
            sampler,
        })
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn directions(&self) -> &[Direction] {
        &self.record.directions
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Same study, different storage handle (one per worker).
    pub fn with_storage(&self, storage: Arc<dyn Storage>) -> Self {
        Self {
            record: self.record.clone(),
            storage,
            sampler: Arc::clone(&self.sampler),
        }
    }

    pub fn trials(&self) -> Result<Vec<FrozenTrial>, StorageError> {
        self.storage.get_all_trials(self.record.id)
    }

    /// Number of trials recorded so far, in any state.
    pub fn recorded_trials(&self) -> Result<u64, StorageError> {
        Ok(self.trials()?.len() as u64)
    }

    /// Mark trials left running by an earlier, killed run as failed.
    pub fn fail_stale_trials(&self) -> Result<usize, StorageError> {
        let n = self.storage.fail_stale_trials(self.record.id)?;
        if n > 0 {
            warn!(study = self.name(), count = n, "Marked stale running trials as failed");
        }
        Ok(n)
    }

    /// Best complete trial with respect to the first direction.
    pub fn best_trial(&self) -> Result<Option<FrozenTrial>, StorageError> {
        Ok(best_of(self.trials()?, self.directions()))
    }

    /// Start a new trial.
    ///
    /// With `trial_root`, the trial gets a fresh directory
    /// `<trial_root>/trial_<number>`.
    pub fn ask(&self, trial_root: Option<&Path>) -> Result<Trial> {
        let history = self.trials()?;
        let (trial_id, number) = self.storage.create_trial(self.record.id)?;

        let work_dir = match trial_root {
            Some(root) => Some(prepare_trial_dir(root, number)?),
            None => None,
        };

        debug!(study = self.name(), trial = number, "Created trial");
        Ok(Trial::new(
            self.record.name.clone(),
            trial_id,
            number,
            Arc::clone(&self.storage),
            Arc::clone(&self.sampler),
            history,
            work_dir,
        ))
    }

    /// Record the outcome of a trial.
    pub fn tell(&self, trial: Trial, outcome: TrialOutcome) -> Result<TrialState, StorageError> {
        let state = outcome.state();
        match &outcome {
            TrialOutcome::Complete(values) => {
                info!(study = self.name(), trial = trial.number(), ?values, "Trial complete");
                self.storage
                    .finish_trial(trial.id(), state, Some(values.as_slice()))?;
            }
            TrialOutcome::Pruned => {
                info!(study = self.name(), trial = trial.number(), "Trial pruned");
                self.storage.finish_trial(trial.id(), state, None)?;
            }
            TrialOutcome::Fail(reason) => {
                warn!(study = self.name(), trial = trial.number(), %reason, "Trial failed");
                self.storage.finish_trial(trial.id(), state, None)?;
            }
        }
        Ok(state)
    }

    /// Run up to `n_trials` trials of `objective`.
    ///
    /// The cancellation flag is checked before each trial; a trial that has
    /// started is always recorded.
    pub fn optimize<F>(
        &self,
        objective: F,
        n_trials: u64,
        cancel: &CancelToken,
        trial_root: Option<&Path>,
    ) -> Result<OptimizeSummary>
    where
        F: Fn(&mut Trial) -> Result<ObjectiveValue>,
    {
        let mut summary = OptimizeSummary::default();
        for _ in 0..n_trials {
            if cancel.is_cancelled() {
                summary.interrupted = true;
                break;
            }
            let mut trial = self.ask(trial_root)?;
            let outcome = self.evaluate(&objective, &mut trial);
            match self.tell(trial, outcome).context("Failed to record trial")? {
                TrialState::Complete => summary.complete += 1,
                TrialState::Pruned => summary.pruned += 1,
                TrialState::Fail | TrialState::Running => summary.failed += 1,
            }
        }
        Ok(summary)
    }

    /// Call the objective and turn whatever it did into an outcome.
    fn evaluate<F>(&self, objective: &F, trial: &mut Trial) -> TrialOutcome
    where
        F: Fn(&mut Trial) -> Result<ObjectiveValue>,
    {
        match catch_unwind(AssertUnwindSafe(|| objective(trial))) {
            Ok(Ok(value)) => self.check_values(value),
            Ok(Err(e)) if e.is::<TrialPruned>() => TrialOutcome::Pruned,
            Ok(Err(e)) => TrialOutcome::Fail(format!("{e:#}")),
            Err(payload) => TrialOutcome::Fail(format!(
                "objective panicked: {}",
                panic_message(payload.as_ref())
            )),
        }
    }

    fn check_values(&self, value: ObjectiveValue) -> TrialOutcome {
        let values = value.into_values();
        let expected = self.directions().len();
        if values.len() != expected {
            return TrialOutcome::Fail(format!(
                "objective returned {} value(s) but the study has {} direction(s)",
                values.len(),
                expected
            ));
        }
        if values.iter().any(|v| v.is_nan()) {
            return TrialOutcome::Fail("objective returned NaN".to_string());
        }
        TrialOutcome::Complete(values)
    }
}

impl std::fmt::Debug for Study {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Study")
            .field("name", &self.record.name)
            .field("directions", &self.record.directions)
            .field("storage", &self.storage.describe())
            .field("sampler", &self.sampler.name())
            .finish()
    }
}

/// Best complete trial with respect to the first direction.
pub(crate) fn best_of(trials: Vec<FrozenTrial>, directions: &[Direction]) -> Option<FrozenTrial> {
    let direction = directions.first().copied().unwrap_or_default();
    let mut best: Option<(f64, FrozenTrial)> = None;
    for trial in trials {
        if trial.state != TrialState::Complete {
            continue;
        }
        let Some(value) = trial.value() else {
            continue;
        };
        if best
            .as_ref()
            .is_none_or(|(incumbent, _)| direction.is_better(value, *incumbent))
        {
            best = Some((value, trial));
        }
    }
    best.map(|(_, trial)| trial)
}

fn prepare_trial_dir(root: &Path, number: u64) -> Result<PathBuf> {
    let dir = root.join(format!("trial_{number}"));
    if dir.exists() {
        // Left over from a trial number that was never recorded.
        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("Failed to clear trial directory: {}", dir.display()))?;
    }
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create trial directory: {}", dir.display()))?;
    Ok(dir)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
