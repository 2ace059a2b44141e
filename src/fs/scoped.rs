//! Scoped change of the process working directory

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Changes the process working directory and restores it on drop.
///
/// The working directory is process-global: only one guard should be live
/// at a time, and never while worker threads rely on relative paths.
#[derive(Debug)]
pub struct DirGuard {
    previous: PathBuf,
}

impl DirGuard {
    pub fn enter(dir: &Path) -> Result<Self> {
        let previous =
            std::env::current_dir().context("Failed to read current working directory")?;
        std::env::set_current_dir(dir)
            .with_context(|| format!("Failed to enter directory: {}", dir.display()))?;
        Ok(Self { previous })
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        if let Err(e) = std::env::set_current_dir(&self.previous) {
            warn!(
                dir = %self.previous.display(),
                error = %e,
                "Failed to restore working directory"
            );
        }
    }
}
