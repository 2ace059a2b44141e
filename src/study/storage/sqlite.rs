//! SQLite-backed storage shared by concurrent workers

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{Storage, StudyRecord, TrialId};
use crate::study::distributions::{Distribution, ParamValue};
use crate::study::error::StorageError;
use crate::study::objective::{format_directions, Direction};
use crate::study::trial::{FrozenTrial, TrialState};

/// How long a writer waits for another connection's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS studies (
    study_id INTEGER PRIMARY KEY AUTOINCREMENT,
    study_name TEXT NOT NULL UNIQUE,
    directions TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS trials (
    trial_id INTEGER PRIMARY KEY AUTOINCREMENT,
    study_id INTEGER NOT NULL REFERENCES studies(study_id),
    number INTEGER NOT NULL,
    state TEXT NOT NULL,
    datetime_start TEXT,
    datetime_complete TEXT,
    UNIQUE(study_id, number)
);

CREATE TABLE IF NOT EXISTS trial_values (
    trial_id INTEGER NOT NULL REFERENCES trials(trial_id),
    objective INTEGER NOT NULL,
    value REAL NOT NULL,
    PRIMARY KEY(trial_id, objective)
);

CREATE TABLE IF NOT EXISTS trial_params (
    trial_id INTEGER NOT NULL REFERENCES trials(trial_id),
    param_name TEXT NOT NULL,
    param_value TEXT NOT NULL,
    distribution_json TEXT NOT NULL,
    PRIMARY KEY(trial_id, param_name)
);

CREATE TABLE IF NOT EXISTS trial_user_attributes (
    trial_id INTEGER NOT NULL REFERENCES trials(trial_id),
    key TEXT NOT NULL,
    value_json TEXT NOT NULL,
    PRIMARY KEY(trial_id, key)
);

CREATE INDEX IF NOT EXISTS idx_trials_study ON trials(study_id, number);
"#;

/// Storage in an embedded database file.
///
/// Several handles (threads or processes) may open the same file; every
/// operation runs in its own transaction.
#[derive(Debug)]
pub struct SqliteStorage {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (and create if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let storage = Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        };
        storage.migrate()?;
        Ok(storage)
    }

    /// Open an existing database without write access.
    ///
    /// Nothing is created or migrated; a missing file is an error.
    pub fn open_read_only(path: &Path) -> Result<Self, StorageError> {
        if !path.is_file() {
            return Err(StorageError::MissingDatabase(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    fn migrate(&self) -> Result<(), StorageError> {
        let conn = self.lock();
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn encode_directions(directions: &[Direction]) -> Result<String, StorageError> {
    Ok(serde_json::to_string(directions)?)
}

fn decode_directions(raw: &str) -> Result<Vec<Direction>, StorageError> {
    Ok(serde_json::from_str(raw)?)
}

fn parse_datetime(raw: Option<String>) -> Result<Option<DateTime<Utc>>, StorageError> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StorageError::Corrupt(format!("bad timestamp '{s}': {e}")))
    })
    .transpose()
}

fn find_study(conn: &Connection, name: &str) -> Result<Option<StudyRecord>, StorageError> {
    let row = conn
        .query_row(
            "SELECT study_id, directions FROM studies WHERE study_name = ?1",
            params![name],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;
    row.map(|(id, raw)| {
        Ok(StudyRecord {
            id,
            name: name.to_string(),
            directions: decode_directions(&raw)?,
        })
    })
    .transpose()
}

/// Fail unless `trial_id` exists and is still running.
fn ensure_running(conn: &Connection, trial_id: TrialId) -> Result<(), StorageError> {
    let state: Option<String> = conn
        .query_row(
            "SELECT state FROM trials WHERE trial_id = ?1",
            params![trial_id],
            |row| row.get(0),
        )
        .optional()?;
    match state {
        None => Err(StorageError::UnknownTrial(trial_id)),
        Some(s) if s != TrialState::Running.as_str() => Err(StorageError::TrialFinished(trial_id)),
        Some(_) => Ok(()),
    }
}

impl Storage for SqliteStorage {
    fn create_or_load_study(
        &self,
        name: &str,
        directions: &[Direction],
    ) -> Result<(StudyRecord, bool), StorageError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(existing) = find_study(&tx, name)? {
            if existing.directions != directions {
                return Err(StorageError::DirectionMismatch {
                    name: name.to_string(),
                    stored: format_directions(&existing.directions),
                    requested: format_directions(directions),
                });
            }
            tx.commit()?;
            return Ok((existing, false));
        }

        tx.execute(
            "INSERT INTO studies (study_name, directions) VALUES (?1, ?2)",
            params![name, encode_directions(directions)?],
        )?;
        let record = StudyRecord {
            id: tx.last_insert_rowid(),
            name: name.to_string(),
            directions: directions.to_vec(),
        };
        tx.commit()?;
        Ok((record, true))
    }

    fn load_study(&self, name: &str) -> Result<Option<StudyRecord>, StorageError> {
        let conn = self.lock();
        find_study(&conn, name)
    }

    fn create_trial(&self, study_id: i64) -> Result<(TrialId, u64), StorageError> {
        let mut conn = self.lock();
        // IMMEDIATE takes the write lock up front so two workers cannot both
        // read the same MAX(number).
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM studies WHERE study_id = ?1)",
            params![study_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StorageError::UnknownStudy(format!("#{study_id}")));
        }

        let next: i64 = tx.query_row(
            "SELECT COALESCE(MAX(number) + 1, 0) FROM trials WHERE study_id = ?1",
            params![study_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO trials (study_id, number, state, datetime_start) VALUES (?1, ?2, ?3, ?4)",
            params![
                study_id,
                next,
                TrialState::Running.as_str(),
                Utc::now().to_rfc3339()
            ],
        )?;
        let trial_id = tx.last_insert_rowid();
        tx.commit()?;
        Ok((trial_id, next as u64))
    }

    fn set_trial_param(
        &self,
        trial_id: TrialId,
        name: &str,
        dist: &Distribution,
        value: &ParamValue,
    ) -> Result<(), StorageError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_running(&tx, trial_id)?;
        tx.execute(
            "INSERT OR REPLACE INTO trial_params (trial_id, param_name, param_value, distribution_json)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                trial_id,
                name,
                serde_json::to_string(value)?,
                serde_json::to_string(dist)?
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn set_trial_user_attr(
        &self,
        trial_id: TrialId,
        key: &str,
        value: &Value,
    ) -> Result<(), StorageError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_running(&tx, trial_id)?;
        tx.execute(
            "INSERT OR REPLACE INTO trial_user_attributes (trial_id, key, value_json)
             VALUES (?1, ?2, ?3)",
            params![trial_id, key, serde_json::to_string(value)?],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn finish_trial(
        &self,
        trial_id: TrialId,
        state: TrialState,
        values: Option<&[f64]>,
    ) -> Result<(), StorageError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_running(&tx, trial_id)?;
        tx.execute(
            "UPDATE trials SET state = ?1, datetime_complete = ?2 WHERE trial_id = ?3",
            params![state.as_str(), Utc::now().to_rfc3339(), trial_id],
        )?;
        if let Some(values) = values {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO trial_values (trial_id, objective, value) VALUES (?1, ?2, ?3)",
            )?;
            for (objective, value) in values.iter().enumerate() {
                stmt.execute(params![trial_id, objective as i64, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_all_trials(&self, study_id: i64) -> Result<Vec<FrozenTrial>, StorageError> {
        let conn = self.lock();

        let mut stmt = conn.prepare(
            "SELECT trial_id, number, state, datetime_start, datetime_complete
             FROM trials WHERE study_id = ?1 ORDER BY number",
        )?;
        let rows = stmt
            .query_map(params![study_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut value_stmt =
            conn.prepare("SELECT value FROM trial_values WHERE trial_id = ?1 ORDER BY objective")?;
        let mut param_stmt = conn.prepare(
            "SELECT param_name, param_value, distribution_json FROM trial_params WHERE trial_id = ?1",
        )?;
        let mut attr_stmt =
            conn.prepare("SELECT key, value_json FROM trial_user_attributes WHERE trial_id = ?1")?;

        let mut trials = Vec::with_capacity(rows.len());
        for (trial_id, number, state, start, complete) in rows {
            let state: TrialState = state.parse().map_err(StorageError::Corrupt)?;

            let values: Vec<f64> = value_stmt
                .query_map(params![trial_id], |row| row.get(0))?
                .collect::<Result<_, _>>()?;

            let mut params = BTreeMap::new();
            let mut distributions = BTreeMap::new();
            let raw_params = param_stmt
                .query_map(params![trial_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            for (name, value, dist) in raw_params {
                params.insert(name.clone(), serde_json::from_str::<ParamValue>(&value)?);
                distributions.insert(name, serde_json::from_str::<Distribution>(&dist)?);
            }

            let mut user_attrs = BTreeMap::new();
            let raw_attrs = attr_stmt
                .query_map(params![trial_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            for (key, value) in raw_attrs {
                user_attrs.insert(key, serde_json::from_str::<Value>(&value)?);
            }

            trials.push(FrozenTrial {
                number: number as u64,
                state,
                values: (!values.is_empty()).then_some(values),
                params,
                distributions,
                user_attrs,
                datetime_start: parse_datetime(start)?,
                datetime_complete: parse_datetime(complete)?,
            });
        }
        Ok(trials)
    }

    fn fail_stale_trials(&self, study_id: i64) -> Result<usize, StorageError> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE trials SET state = ?1, datetime_complete = ?2 WHERE study_id = ?3 AND state = ?4",
            params![
                TrialState::Fail.as_str(),
                Utc::now().to_rfc3339(),
                study_id,
                TrialState::Running.as_str()
            ],
        )?;
        Ok(changed)
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}
