//! In-memory storage with JSON snapshots

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{Storage, StudyRecord, TrialId};
use crate::fs::locking::locked_read;
use crate::study::distributions::{Distribution, ParamValue};
use crate::study::error::StorageError;
use crate::study::objective::{format_directions, Direction};
use crate::study::trial::{FrozenTrial, TrialState};

/// Serialised form of one in-memory study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudySnapshot {
    pub study_name: String,
    pub directions: Vec<Direction>,
    pub trials: Vec<FrozenTrial>,
}

impl StudySnapshot {
    /// Read a snapshot written by [`StudySnapshot::save`].
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = locked_read(path)?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse study snapshot: {}", path.display()))
    }

    /// Write the snapshot atomically (temporary file, then rename).
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, self).context("Failed to serialise study")?;
        tmp.flush().context("Failed to flush study snapshot")?;
        tmp.persist(path)
            .with_context(|| format!("Failed to write study snapshot: {}", path.display()))?;
        Ok(())
    }
}

#[derive(Debug)]
struct MemoryStudy {
    record: StudyRecord,
    trials: Vec<FrozenTrial>,
}

#[derive(Debug, Default)]
struct MemoryState {
    studies: Vec<MemoryStudy>,
    /// trial id -> (study index, trial index)
    trial_index: HashMap<TrialId, (usize, usize)>,
    next_trial_id: TrialId,
}

impl MemoryState {
    fn trial_mut(&mut self, trial_id: TrialId) -> Result<&mut FrozenTrial, StorageError> {
        let (study, trial) = *self
            .trial_index
            .get(&trial_id)
            .ok_or(StorageError::UnknownTrial(trial_id))?;
        Ok(&mut self.studies[study].trials[trial])
    }

    fn running_trial_mut(&mut self, trial_id: TrialId) -> Result<&mut FrozenTrial, StorageError> {
        let trial = self.trial_mut(trial_id)?;
        if trial.state.is_finished() {
            return Err(StorageError::TrialFinished(trial_id));
        }
        Ok(trial)
    }

    fn study_index(&self, study_id: i64) -> Result<usize, StorageError> {
        self.studies
            .iter()
            .position(|s| s.record.id == study_id)
            .ok_or_else(|| StorageError::UnknownStudy(format!("#{study_id}")))
    }

    fn insert_study(&mut self, name: &str, directions: &[Direction]) -> StudyRecord {
        let record = StudyRecord {
            id: self.studies.len() as i64,
            name: name.to_string(),
            directions: directions.to_vec(),
        };
        self.studies.push(MemoryStudy {
            record: record.clone(),
            trials: Vec::new(),
        });
        record
    }
}

/// Process-local storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a storage with a previously saved study.
    pub fn from_snapshot(snapshot: StudySnapshot) -> Self {
        let storage = Self::new();
        {
            let mut state = storage.lock();
            state.insert_study(&snapshot.study_name, &snapshot.directions);
            let study_idx = state.studies.len() - 1;
            for trial in snapshot.trials {
                let trial_id = state.next_trial_id;
                state.next_trial_id += 1;
                let trial_idx = state.studies[study_idx].trials.len();
                state.studies[study_idx].trials.push(trial);
                state.trial_index.insert(trial_id, (study_idx, trial_idx));
            }
        }
        storage
    }

    /// Export one study for [`StudySnapshot::save`].
    pub fn snapshot(&self, name: &str) -> Result<StudySnapshot, StorageError> {
        let state = self.lock();
        let study = state
            .studies
            .iter()
            .find(|s| s.record.name == name)
            .ok_or_else(|| StorageError::UnknownStudy(name.to_string()))?;
        Ok(StudySnapshot {
            study_name: study.record.name.clone(),
            directions: study.record.directions.clone(),
            trials: study.trials.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for MemoryStorage {
    fn create_or_load_study(
        &self,
        name: &str,
        directions: &[Direction],
    ) -> Result<(StudyRecord, bool), StorageError> {
        let mut state = self.lock();
        if let Some(study) = state.studies.iter().find(|s| s.record.name == name) {
            if study.record.directions != directions {
                return Err(StorageError::DirectionMismatch {
                    name: name.to_string(),
                    stored: format_directions(&study.record.directions),
                    requested: format_directions(directions),
                });
            }
            return Ok((study.record.clone(), false));
        }
        Ok((state.insert_study(name, directions), true))
    }

    fn load_study(&self, name: &str) -> Result<Option<StudyRecord>, StorageError> {
        let state = self.lock();
        Ok(state
            .studies
            .iter()
            .find(|s| s.record.name == name)
            .map(|s| s.record.clone()))
    }

    fn create_trial(&self, study_id: i64) -> Result<(TrialId, u64), StorageError> {
        let mut state = self.lock();
        let study_idx = state.study_index(study_id)?;
        let trial_id = state.next_trial_id;
        state.next_trial_id += 1;

        let study = &mut state.studies[study_idx];
        let number = study.trials.len() as u64;
        let trial_idx = study.trials.len();
        study.trials.push(FrozenTrial::new_running(number));
        state.trial_index.insert(trial_id, (study_idx, trial_idx));
        Ok((trial_id, number))
    }

    fn set_trial_param(
        &self,
        trial_id: TrialId,
        name: &str,
        dist: &Distribution,
        value: &ParamValue,
    ) -> Result<(), StorageError> {
        let mut state = self.lock();
        let trial = state.running_trial_mut(trial_id)?;
        trial.params.insert(name.to_string(), value.clone());
        trial.distributions.insert(name.to_string(), dist.clone());
        Ok(())
    }

    fn set_trial_user_attr(
        &self,
        trial_id: TrialId,
        key: &str,
        value: &Value,
    ) -> Result<(), StorageError> {
        let mut state = self.lock();
        let trial = state.running_trial_mut(trial_id)?;
        trial.user_attrs.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn finish_trial(
        &self,
        trial_id: TrialId,
        state: TrialState,
        values: Option<&[f64]>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock();
        let trial = guard.running_trial_mut(trial_id)?;
        trial.state = state;
        trial.values = values.map(<[f64]>::to_vec);
        trial.datetime_complete = Some(Utc::now());
        Ok(())
    }

    fn get_all_trials(&self, study_id: i64) -> Result<Vec<FrozenTrial>, StorageError> {
        let state = self.lock();
        let idx = state.study_index(study_id)?;
        Ok(state.studies[idx].trials.clone())
    }

    fn fail_stale_trials(&self, study_id: i64) -> Result<usize, StorageError> {
        let mut state = self.lock();
        let idx = state.study_index(study_id)?;
        let mut changed = 0;
        for trial in &mut state.studies[idx].trials {
            if trial.state == TrialState::Running {
                trial.state = TrialState::Fail;
                trial.datetime_complete = Some(Utc::now());
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}
