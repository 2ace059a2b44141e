//! Recipe loading, validation and dependency resolution
//!
//! This module handles:
//! - Parsing recipe documents (YAML or TOML)
//! - Validating stage definitions
//! - Ordering stages by their dependencies

pub mod graph;
pub mod parser;
pub mod schema;

pub use graph::{ResolveError, StageGraph};
pub use parser::{load_recipe, parse_recipe, RecipeFormat};
pub use schema::{
    validate, ObjectiveSource, OptimisationSpec, Recipe, StageDefinition, StageKind,
    ValidationError,
};
