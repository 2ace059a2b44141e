//! Integration tests for o2tuner runs
//!
//! These tests drive whole recipes through the runner and the CLI entry
//! point: shell and function stages, optimisation studies with their
//! storage, inspectors handed to evaluation stages, and failure handling.

pub mod cli;
pub mod continuation;
pub mod failure_policy;
pub mod helpers;
pub mod pipeline;
