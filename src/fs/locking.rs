//! Advisory-locked file access
//!
//! Done markers and stage logs can be touched by more than one o2tuner
//! process working on the same run directory. All access goes through
//! `fs2` advisory locks so readers never see a half-written marker.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::Path;

/// Read a whole file under a shared lock.
pub fn locked_read(path: &Path) -> Result<String> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    FileExt::lock_shared(&file)
        .with_context(|| format!("Failed to acquire shared lock: {}", path.display()))?;
    let mut content = String::new();
    BufReader::new(&file)
        .read_to_string(&mut content)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(content)
}

/// Replace a file's content under an exclusive lock.
///
/// The file is truncated only once the lock is held.
pub fn locked_write(path: &Path, content: &str) -> Result<()> {
    #[allow(clippy::suspicious_open_options)]
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .open(path)
        .with_context(|| format!("Failed to open file for writing: {}", path.display()))?;
    FileExt::lock_exclusive(&file)
        .with_context(|| format!("Failed to acquire exclusive lock: {}", path.display()))?;
    file.set_len(0)
        .with_context(|| format!("Failed to truncate file: {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write file: {}", path.display()))?;
    file.flush()
        .with_context(|| format!("Failed to flush file: {}", path.display()))?;
    Ok(())
}

/// Append to a file (created if missing) under an exclusive lock.
pub fn locked_append(path: &Path, content: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("Failed to open file for appending: {}", path.display()))?;
    FileExt::lock_exclusive(&file)
        .with_context(|| format!("Failed to acquire exclusive lock: {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to append to file: {}", path.display()))?;
    Ok(())
}
