use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::locking::{locked_read, locked_write};

/// Directory holding one done marker per completed stage.
pub const DONE_DIR: &str = "o2tuner_done";

const DONE_PREFIX: &str = "DONE_";

/// The run directory all stage directories live under.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    /// Create the run directory if needed and return a handle on it.
    pub fn prepare<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() && !path.is_dir() {
            bail!("work directory {} exists but is not a directory", path.display());
        }
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create work directory: {}", path.display()))?;
        let root = path
            .canonicalize()
            .with_context(|| format!("Failed to resolve work directory: {}", path.display()))?;
        fs::create_dir_all(root.join(DONE_DIR)).context("Failed to create done directory")?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn done_dir(&self) -> PathBuf {
        self.root.join(DONE_DIR)
    }

    /// Path of a stage directory, without creating it.
    pub fn stage_dir(&self, cwd: &str) -> PathBuf {
        self.root.join(cwd)
    }

    /// Create a stage directory if absent, or reuse it.
    ///
    /// A regular file in the way is an error.
    pub fn ensure_stage_dir(&self, cwd: &str) -> Result<PathBuf> {
        let dir = self.stage_dir(cwd);
        if dir.exists() {
            if !dir.is_dir() {
                bail!(
                    "stage directory {} exists but is not a directory",
                    dir.display()
                );
            }
            debug!(dir = %dir.display(), "Reusing stage directory");
            return Ok(dir);
        }
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create stage directory: {}", dir.display()))?;
        debug!(dir = %dir.display(), "Created stage directory");
        Ok(dir)
    }

    fn marker_path(&self, name: &str) -> PathBuf {
        self.done_dir().join(format!("{DONE_PREFIX}{name}"))
    }

    /// Whether `name` has a marker whose stage directory still exists.
    pub fn is_done(&self, name: &str) -> Result<bool> {
        let marker = self.marker_path(name);
        if !marker.is_file() {
            return Ok(false);
        }
        self.marker_is_live(&marker)
    }

    fn marker_is_live(&self, marker: &Path) -> Result<bool> {
        let content = locked_read(marker)?;
        let rel = content.lines().next().unwrap_or("").trim();
        if rel.is_empty() {
            return Ok(false);
        }
        Ok(self.root.join(rel).is_dir())
    }

    /// Names of all stages with a live done marker.
    pub fn stages_done(&self) -> Result<BTreeSet<String>> {
        let pattern = self.done_dir().join(format!("{DONE_PREFIX}*"));
        let pattern = pattern.to_string_lossy();
        let mut done = BTreeSet::new();
        for entry in glob::glob(&pattern).context("Invalid done-marker pattern")? {
            let marker = entry.context("Failed to read done directory")?;
            let Some(name) = marker
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix(DONE_PREFIX))
            else {
                continue;
            };
            if self.marker_is_live(&marker)? {
                done.insert(name.to_string());
            } else {
                debug!(stage = name, "Ignoring done marker without a stage directory");
            }
        }
        Ok(done)
    }

    /// Record that `name` completed in `<root>/<cwd>`.
    pub fn mark_done(&self, name: &str, cwd: &str) -> Result<()> {
        fs::create_dir_all(self.done_dir()).context("Failed to create done directory")?;
        locked_write(&self.marker_path(name), cwd)
            .with_context(|| format!("Failed to mark stage '{name}' done"))
    }
}
