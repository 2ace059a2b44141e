//! Configuration-driven stage runner for hyperparameter optimisation.
//!
//! A recipe declares user stages (shell commands or registered functions)
//! and optimisation stages (studies over a search space) with dependencies
//! between them. The runner executes them in dependency order, resumes
//! studies from their storage and hands inspectors of finished studies to
//! the evaluation stages that ask for them.

pub mod cli;
pub mod commands;
pub mod completions;
pub mod config;
pub mod fs;
pub mod inspector;
pub mod logging;
pub mod optimise;
pub mod process;
pub mod recipe;
pub mod registry;
pub mod runner;
pub mod shutdown;
pub mod study;
pub mod validation;

pub use config::UserConfig;
pub use inspector::Inspector;
pub use registry::{Registry, StageContext};
pub use study::{Direction, ObjectiveValue, Trial, TrialPruned};
