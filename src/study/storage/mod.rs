//! Trial storage backends.
//!
//! A [`Storage`] keeps studies and their trials. Two backends exist:
//! - [`MemoryStorage`]: process-local, optionally persisted as a JSON snapshot
//! - [`SqliteStorage`]: an embedded database file shared by concurrent workers
//!
//! Backends are selected from a storage URL such as `sqlite:///opt.db`.

mod memory;
mod sqlite;
mod url;

use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use super::distributions::{Distribution, ParamValue};
use super::error::StorageError;
use super::objective::Direction;
use super::trial::{FrozenTrial, TrialState};

pub use memory::{MemoryStorage, StudySnapshot};
pub use sqlite::SqliteStorage;
pub use url::StorageUrl;

/// Storage-wide trial identifier (distinct from the per-study trial number).
pub type TrialId = i64;

/// A study as known to a storage backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StudyRecord {
    pub id: i64,
    pub name: String,
    pub directions: Vec<Direction>,
}

/// Operations the optimisation engine needs from a storage backend.
///
/// Implementations must be safe to share between worker threads; each call
/// is atomic with respect to other callers of the same backend.
pub trait Storage: Send + Sync {
    /// Create `name` with `directions`, or return the existing study of that name.
    ///
    /// The boolean is `true` when the study was created by this call.
    fn create_or_load_study(
        &self,
        name: &str,
        directions: &[Direction],
    ) -> Result<(StudyRecord, bool), StorageError>;

    fn load_study(&self, name: &str) -> Result<Option<StudyRecord>, StorageError>;

    /// Create a new running trial; returns its id and its number within the study.
    fn create_trial(&self, study_id: i64) -> Result<(TrialId, u64), StorageError>;

    fn set_trial_param(
        &self,
        trial_id: TrialId,
        name: &str,
        dist: &Distribution,
        value: &ParamValue,
    ) -> Result<(), StorageError>;

    fn set_trial_user_attr(
        &self,
        trial_id: TrialId,
        key: &str,
        value: &Value,
    ) -> Result<(), StorageError>;

    /// Move a running trial to a finished state.
    fn finish_trial(
        &self,
        trial_id: TrialId,
        state: TrialState,
        values: Option<&[f64]>,
    ) -> Result<(), StorageError>;

    /// All trials of a study, ordered by trial number.
    fn get_all_trials(&self, study_id: i64) -> Result<Vec<FrozenTrial>, StorageError>;

    /// Mark trials left running by an earlier, killed run as failed.
    ///
    /// Returns how many trials were changed.
    fn fail_stale_trials(&self, study_id: i64) -> Result<usize, StorageError>;

    /// Short human-readable description, used in logs.
    fn describe(&self) -> String;
}

/// Open the backend a storage URL points to.
///
/// Relative database paths are resolved against `base_dir`.
pub fn open_storage(url: &str, base_dir: &Path) -> Result<Arc<dyn Storage>, StorageError> {
    open_with(url, base_dir, SqliteStorage::open)
}

/// Like [`open_storage`], but the backend must already exist and is never written.
pub fn open_storage_read_only(
    url: &str,
    base_dir: &Path,
) -> Result<Arc<dyn Storage>, StorageError> {
    open_with(url, base_dir, SqliteStorage::open_read_only)
}

fn open_with(
    url: &str,
    base_dir: &Path,
    open_sqlite: fn(&Path) -> Result<SqliteStorage, StorageError>,
) -> Result<Arc<dyn Storage>, StorageError> {
    match StorageUrl::parse(url)? {
        StorageUrl::Sqlite(path) => {
            let path = if path.is_absolute() {
                path
            } else {
                base_dir.join(path)
            };
            Ok(Arc::new(open_sqlite(&path)?))
        }
    }
}

#[cfg(test)]
mod tests;
