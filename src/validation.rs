//! Input validation for names and paths taken from recipes and the command line.
//!
//! Stage names, study names and working-directory overrides all end up in
//! file-system paths under the run directory, so they are checked here before
//! anything is created on disk.

use anyhow::{bail, Result};
use std::path::{Component, Path};

/// Maximum allowed length for stage and study names.
pub const MAX_NAME_LENGTH: usize = 128;

/// Names that cannot be used as stage directories (case-insensitive).
const RESERVED_NAMES: &[&str] = &[
    ".", "..", "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7",
    "com8", "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
    "o2tuner_done",
];

/// Validates that a stage (or study) name is safe for use as a directory name.
///
/// A name is valid if it is non-empty, at most [`MAX_NAME_LENGTH`] characters,
/// made of ASCII alphanumerics, dashes and underscores, and not reserved.
///
/// ```
/// use o2tuner::validation::validate_name;
///
/// assert!(validate_name("optimise-1").is_ok());
/// assert!(validate_name("reference_run").is_ok());
/// assert!(validate_name("").is_err());
/// assert!(validate_name("../etc").is_err());
/// ```
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("name cannot be empty");
    }

    if name.len() > MAX_NAME_LENGTH {
        bail!(
            "name too long: {} characters (max {})",
            name.len(),
            MAX_NAME_LENGTH
        );
    }

    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid_chars {
        bail!("name '{name}' contains invalid characters. Use only alphanumeric characters, dashes (-), and underscores (_)");
    }

    if RESERVED_NAMES.contains(&name.to_lowercase().as_str()) {
        bail!("name '{name}' is reserved");
    }

    Ok(())
}

/// Validates a working-directory override: relative, no `..`, not empty.
pub fn validate_relative_dir(dir: &str) -> Result<()> {
    if dir.trim().is_empty() {
        bail!("directory cannot be empty");
    }

    let path = Path::new(dir);
    if path.is_absolute() {
        bail!("directory '{dir}' must be a relative path");
    }

    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => bail!("directory '{dir}' cannot contain path traversal (..)"),
            _ => bail!("directory '{dir}' must be a relative path"),
        }
    }

    Ok(())
}

/// Validates a log file name: a plain file name inside the stage directory.
pub fn validate_file_name(file: &str) -> Result<()> {
    if file.trim().is_empty() {
        bail!("file name cannot be empty");
    }
    if file.contains('/') || file.contains('\\') {
        bail!("file name '{file}' must not contain path separators");
    }
    if file == "." || file == ".." {
        bail!("file name '{file}' is not a file");
    }
    Ok(())
}

/// Clap value parser for stage names given with `--stages`.
pub fn clap_stage_validator(s: &str) -> Result<String, String> {
    validate_name(s).map_err(|e| e.to_string())?;
    Ok(s.to_string())
}
