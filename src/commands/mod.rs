//! Implementations of the CLI subcommands

pub mod graph;
pub mod inspect;
pub mod run;

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;

use crate::fs::WorkDir;

/// Stages already done in `work_dir`; nothing when the directory does not exist yet.
pub(crate) fn stages_done(work_dir: &Path) -> Result<BTreeSet<String>> {
    if !work_dir.exists() {
        return Ok(BTreeSet::new());
    }
    WorkDir::prepare(work_dir)
        .with_context(|| format!("Failed to open run directory: {}", work_dir.display()))?
        .stages_done()
}
