//! Trial records and the live trial handle given to objective functions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use super::distributions::{Distribution, ParamValue};
use super::error::TrialError;
use super::sampler::{SampleContext, Sampler};
use super::storage::{Storage, TrialId};

/// Lifecycle state of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialState {
    Running,
    Complete,
    Pruned,
    Fail,
}

impl TrialState {
    pub fn is_finished(self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Pruned => "pruned",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for TrialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrialState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "complete" => Ok(Self::Complete),
            "pruned" => Ok(Self::Pruned),
            "fail" => Ok(Self::Fail),
            other => Err(format!("unknown trial state '{other}'")),
        }
    }
}

/// A stored, read-only trial record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrozenTrial {
    pub number: u64,
    pub state: TrialState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f64>>,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
    #[serde(default)]
    pub distributions: BTreeMap<String, Distribution>,
    #[serde(default)]
    pub user_attrs: BTreeMap<String, Value>,
    pub datetime_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub datetime_complete: Option<DateTime<Utc>>,
}

impl FrozenTrial {
    pub fn new_running(number: u64) -> Self {
        Self {
            number,
            state: TrialState::Running,
            values: None,
            params: BTreeMap::new(),
            distributions: BTreeMap::new(),
            user_attrs: BTreeMap::new(),
            datetime_start: Some(Utc::now()),
            datetime_complete: None,
        }
    }

    /// First objective value, the "loss" of single-objective studies.
    pub fn value(&self) -> Option<f64> {
        self.values.as_ref().and_then(|v| v.first().copied())
    }

    /// Numeric value of a parameter (categorical choices map to their index).
    pub fn numeric_param(&self, name: &str) -> Option<f64> {
        let value = self.params.get(name)?;
        match self.distributions.get(name) {
            Some(dist) => dist.to_numeric(value),
            None => value.as_f64(),
        }
    }
}

/// Outcome of evaluating one trial, as recorded in storage.
#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    Complete(Vec<f64>),
    Pruned,
    Fail(String),
}

impl TrialOutcome {
    pub fn state(&self) -> TrialState {
        match self {
            Self::Complete(_) => TrialState::Complete,
            Self::Pruned => TrialState::Pruned,
            Self::Fail(_) => TrialState::Fail,
        }
    }
}

/// Live handle on a running trial.
///
/// Every suggested parameter and every annotation is written to storage
/// immediately, so a trial that is abandoned mid-way still leaves a
/// consistent record.
pub struct Trial {
    study_name: String,
    trial_id: TrialId,
    number: u64,
    storage: Arc<dyn Storage>,
    sampler: Arc<dyn Sampler>,
    history: Vec<FrozenTrial>,
    params: BTreeMap<String, ParamValue>,
    distributions: BTreeMap<String, Distribution>,
    user_attrs: BTreeMap<String, Value>,
    work_dir: Option<PathBuf>,
}

impl Trial {
    pub(crate) fn new(
        study_name: String,
        trial_id: TrialId,
        number: u64,
        storage: Arc<dyn Storage>,
        sampler: Arc<dyn Sampler>,
        history: Vec<FrozenTrial>,
        work_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            study_name,
            trial_id,
            number,
            storage,
            sampler,
            history,
            params: BTreeMap::new(),
            distributions: BTreeMap::new(),
            user_attrs: BTreeMap::new(),
            work_dir,
        }
    }

    /// 0-based number of this trial within its study.
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn study_name(&self) -> &str {
        &self.study_name
    }

    pub(crate) fn id(&self) -> TrialId {
        self.trial_id
    }

    /// The trial's private working directory, when the stage asked for one.
    ///
    /// A stage with a single worker runs each trial with this as the process
    /// working directory. With several workers the process stays in the stage
    /// directory, so objectives must build their paths from this one.
    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }

    pub fn user_attrs(&self) -> &BTreeMap<String, Value> {
        &self.user_attrs
    }

    /// Suggest a value for `name` from `dist`.
    ///
    /// Asking again for the same name with the same distribution returns the
    /// value drawn the first time.
    pub fn suggest(&mut self, name: &str, dist: Distribution) -> Result<ParamValue, TrialError> {
        dist.validate(name)?;

        if let Some(existing) = self.params.get(name) {
            if self.distributions.get(name) == Some(&dist) {
                return Ok(existing.clone());
            }
            return Err(TrialError::IncompatibleDistribution {
                name: name.to_string(),
            });
        }

        let ctx = SampleContext {
            study_name: &self.study_name,
            trial_number: self.number,
            history: &self.history,
        };
        let value = self.sampler.sample(&ctx, name, &dist)?;

        self.storage
            .set_trial_param(self.trial_id, name, &dist, &value)?;
        self.params.insert(name.to_string(), value.clone());
        self.distributions.insert(name.to_string(), dist);
        Ok(value)
    }

    pub fn suggest_float(&mut self, name: &str, low: f64, high: f64) -> Result<f64, TrialError> {
        self.suggest_float_with(name, low, high, false)
    }

    pub fn suggest_float_log(&mut self, name: &str, low: f64, high: f64) -> Result<f64, TrialError> {
        self.suggest_float_with(name, low, high, true)
    }

    fn suggest_float_with(
        &mut self,
        name: &str,
        low: f64,
        high: f64,
        log: bool,
    ) -> Result<f64, TrialError> {
        let value = self.suggest(name, Distribution::Float { low, high, log })?;
        value.as_f64().ok_or_else(|| TrialError::IncompatibleDistribution {
            name: name.to_string(),
        })
    }

    pub fn suggest_int(&mut self, name: &str, low: i64, high: i64) -> Result<i64, TrialError> {
        let value = self.suggest(name, Distribution::Int { low, high })?;
        value.as_i64().ok_or_else(|| TrialError::IncompatibleDistribution {
            name: name.to_string(),
        })
    }

    pub fn suggest_categorical(
        &mut self,
        name: &str,
        choices: Vec<Value>,
    ) -> Result<Value, TrialError> {
        let value = self.suggest(name, Distribution::Categorical { choices })?;
        Ok(value.to_json())
    }

    /// Attach a key/value annotation to this trial.
    ///
    /// Each key can be set once per trial.
    pub fn annotate<V: Serialize>(&mut self, key: &str, value: V) -> Result<(), TrialError> {
        if self.user_attrs.contains_key(key) {
            return Err(TrialError::DuplicateAnnotation {
                number: self.number,
                key: key.to_string(),
            });
        }
        let value = serde_json::to_value(value).map_err(super::error::StorageError::from)?;
        self.storage
            .set_trial_user_attr(self.trial_id, key, &value)?;
        self.user_attrs.insert(key.to_string(), value);
        Ok(())
    }
}

impl fmt::Debug for Trial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trial")
            .field("study", &self.study_name)
            .field("number", &self.number)
            .field("params", &self.params)
            .field("user_attrs", &self.user_attrs)
            .finish()
    }
}
