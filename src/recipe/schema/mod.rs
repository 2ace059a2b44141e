//! Recipe schema definitions and validation

mod types;
mod validation;


pub use types::{
    ObjectiveSource, OptimisationSpec, OptimisationStageEntry, OrderedStages, Recipe,
    RecipeDocument, StageDefinition, StageKind, StudyConfig, UserStageEntry, ValidationError,
    DEFAULT_JOBS, DEFAULT_TRIALS,
};
pub use validation::validate;
