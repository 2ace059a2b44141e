//! Recipe loading: YAML, or TOML when the file ends in `.toml`

use anyhow::{bail, Context, Result};
use std::path::Path;

use super::schema::{validate, Recipe, RecipeDocument};

/// Document formats a recipe can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeFormat {
    Yaml,
    Toml,
}

impl RecipeFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

/// Read, parse and validate a recipe file.
pub fn load_recipe(path: &Path) -> Result<Recipe> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read recipe: {}", path.display()))?;
    parse_recipe(&content, RecipeFormat::from_path(path))
        .with_context(|| format!("Invalid recipe: {}", path.display()))
}

/// Parse and validate recipe content.
pub fn parse_recipe(content: &str, format: RecipeFormat) -> Result<Recipe> {
    let doc: RecipeDocument = match format {
        RecipeFormat::Yaml if content.trim().is_empty() => RecipeDocument::default(),
        RecipeFormat::Yaml => serde_yaml::from_str(content).context("Failed to parse YAML")?,
        RecipeFormat::Toml => toml::from_str(content).context("Failed to parse TOML")?,
    };

    match validate(&doc) {
        Ok(recipe) => Ok(recipe),
        Err(errors) => {
            let error_messages: Vec<_> = errors.iter().map(|e| e.to_string()).collect();
            bail!("Validation errors:\n  - {}", error_messages.join("\n  - "));
        }
    }
}
