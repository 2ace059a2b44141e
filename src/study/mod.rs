//! Optimisation engine.
//!
//! A [`Study`] is a named collection of trials kept in a [`Storage`]. Each
//! [`Trial`] draws parameters from [`Distribution`]s through a [`Sampler`],
//! is evaluated by an objective and ends as complete, pruned or failed.

pub mod distributions;
mod engine;
pub mod error;
pub mod objective;
pub mod sampler;
pub mod storage;
pub mod trial;

pub use distributions::{Distribution, ParamValue};
pub use engine::{OptimizeSummary, Study};
pub(crate) use engine::{best_of, panic_message};
pub use error::{SamplerError, StorageError, TrialError, TrialPruned};
pub use objective::{Direction, ObjectiveValue};
pub use sampler::{construct_sampler, Sampler, SamplerConfig};
pub use storage::{
    open_storage, open_storage_read_only, MemoryStorage, SqliteStorage, Storage, StudySnapshot,
};
pub use trial::{FrozenTrial, Trial, TrialOutcome, TrialState};
