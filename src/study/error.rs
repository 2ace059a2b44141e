//! Error types for the optimisation engine

use std::path::PathBuf;
use thiserror::Error;

use super::sampler::AVAILABLE_SAMPLERS;
use super::storage::TrialId;

/// Errors raised by a study storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("unsupported storage backend '{scheme}' in '{url}' (supported: sqlite)")]
    UnsupportedBackend { url: String, scheme: String },

    #[error("unsupported storage backend '{scheme}' in '{url}': database servers are not provided (supported: sqlite)")]
    ServerBackend { url: String, scheme: String },

    #[error("invalid storage url '{0}'")]
    InvalidUrl(String),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialisation: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("database {} does not exist", .0.display())]
    MissingDatabase(PathBuf),

    #[error("study '{0}' not found")]
    UnknownStudy(String),

    #[error("trial {0} not found")]
    UnknownTrial(TrialId),

    #[error("trial {0} is already finished")]
    TrialFinished(TrialId),

    #[error("study '{name}' was created with directions {stored}, but {requested} were requested")]
    DirectionMismatch {
        name: String,
        stored: String,
        requested: String,
    },

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Errors raised while a trial suggests parameters or records annotations.
#[derive(Debug, Error)]
pub enum TrialError {
    #[error("trial {number} already has annotation '{key}'")]
    DuplicateAnnotation { number: u64, key: String },

    #[error("invalid distribution for '{name}': {reason}")]
    InvalidDistribution { name: String, reason: String },

    #[error("parameter '{name}' was already suggested with a different distribution")]
    IncompatibleDistribution { name: String },

    #[error("sampler '{sampler}' cannot sample '{name}': {reason}")]
    Sampling {
        sampler: String,
        name: String,
        reason: String,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors raised while building a sampler from configuration.
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("unknown sampler '{0}' (available: {avail})", avail = AVAILABLE_SAMPLERS.join(", "))]
    Unknown(String),

    #[error("sampler '{0}' is not available in this build (available: {avail})", avail = AVAILABLE_SAMPLERS.join(", "))]
    Unsupported(String),

    #[error("invalid arguments for sampler '{name}': {reason}")]
    InvalidArgs { name: String, reason: String },
}

/// Return this from an objective to mark the trial as pruned rather than failed.
///
/// ```ignore
/// if intermediate_loss > threshold {
///     return Err(TrialPruned.into());
/// }
/// ```
#[derive(Debug, Clone, Copy, Error)]
#[error("trial pruned")]
pub struct TrialPruned;
