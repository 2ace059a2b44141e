//! Recipe document types: the raw serde form and the validated stage table

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use crate::config::UserConfig;
use crate::study::{Direction, Distribution, SamplerConfig};

/// Default number of trials of an optimisation stage.
pub const DEFAULT_TRIALS: u64 = 100;

/// Default number of workers of an optimisation stage.
pub const DEFAULT_JOBS: u64 = 1;

/// A stage table in document order.
///
/// Deserialises from a mapping and rejects repeated names.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedStages<T>(pub Vec<(String, T)>);

impl<T> Default for OrderedStages<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> OrderedStages<T> {
    pub fn iter(&self) -> impl Iterator<Item = &(String, T)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for OrderedStages<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StagesVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for StagesVisitor<T> {
            type Value = OrderedStages<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of stage name to stage definition")
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(OrderedStages::default())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut stages: Vec<(String, T)> = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(name) = map.next_key::<String>()? {
                    if stages.iter().any(|(existing, _)| *existing == name) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate stage name '{name}'"
                        )));
                    }
                    let stage = map.next_value::<T>()?;
                    stages.push((name, stage));
                }
                Ok(OrderedStages(stages))
            }
        }

        deserializer.deserialize_map(StagesVisitor(PhantomData))
    }
}

/// Root of a recipe document, as written.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeDocument {
    /// Global static configuration handed to every stage.
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub stages_user: OrderedStages<UserStageEntry>,
    #[serde(default)]
    pub stages_optimisation: OrderedStages<OptimisationStageEntry>,
}

/// A `stages_user` entry, as written.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserStageEntry {
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub deps: Vec<String>,
    #[serde(default)]
    pub optimisations: Vec<String>,
}

/// `study:` section of an optimisation stage.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StudyConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub storage: Option<String>,
}

/// A `stages_optimisation` entry, as written.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptimisationStageEntry {
    #[serde(default, alias = "objective")]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub deps: Vec<String>,
    #[serde(default)]
    pub jobs: Option<u64>,
    #[serde(default)]
    pub trials: Option<u64>,
    #[serde(default)]
    pub sampler: Option<SamplerConfig>,
    #[serde(default)]
    pub study: Option<StudyConfig>,
    #[serde(default)]
    pub directions: Option<Vec<Direction>>,
    #[serde(default)]
    pub search_space: BTreeMap<String, Distribution>,
    #[serde(default)]
    pub trial_cwd: bool,
}

/// Where an optimisation stage gets its objective values from.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectiveSource {
    /// A function registered under this name.
    Registered(String),
    /// A shell command printing the values on its last stdout line.
    Command(String),
}

/// Validated settings of an optimisation stage.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisationSpec {
    pub objective: ObjectiveSource,
    pub jobs: u64,
    pub trials: u64,
    pub sampler: Option<SamplerConfig>,
    /// Study name; defaults to the stage name.
    pub study_name: String,
    /// Storage URL; `None` runs in memory with a JSON snapshot.
    pub storage: Option<String>,
    pub directions: Vec<Direction>,
    pub search_space: BTreeMap<String, Distribution>,
    pub trial_cwd: bool,
}

/// What a stage does.
#[derive(Debug, Clone, PartialEq)]
pub enum StageKind {
    /// A registered stage function.
    Function { entrypoint: String },
    /// A shell command.
    Command { cmd: String },
    Optimisation(OptimisationSpec),
}

impl StageKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Function { .. } => "function",
            Self::Command { .. } => "command",
            Self::Optimisation(_) => "optimisation",
        }
    }
}

/// A validated stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageDefinition {
    pub name: String,
    pub kind: StageKind,
    /// Explicit dependencies plus the stages named in `optimisations`.
    pub deps: Vec<String>,
    /// Stage directory relative to the run directory.
    pub cwd: String,
    /// Log file name inside the stage directory.
    pub log_file: String,
    /// Local overrides of the global configuration.
    pub config: Map<String, Value>,
    /// Optimisation stages whose inspectors this stage receives.
    pub optimisations: Vec<String>,
}

impl StageDefinition {
    pub fn is_optimisation(&self) -> bool {
        matches!(self.kind, StageKind::Optimisation(_))
    }

    pub fn optimisation(&self) -> Option<&OptimisationSpec> {
        match &self.kind {
            StageKind::Optimisation(spec) => Some(spec),
            _ => None,
        }
    }
}

/// A validated recipe: global configuration plus stages in document order
/// (user stages first, then optimisation stages).
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub config: UserConfig,
    pub stages: Vec<StageDefinition>,
}

impl Recipe {
    pub fn stage(&self, name: &str) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.name.as_str())
    }

    /// Configuration a stage runs with: global values overridden by its own.
    pub fn stage_config(&self, stage: &StageDefinition) -> UserConfig {
        self.config.derive(&stage.config)
    }
}

/// Validation error with context
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub message: String,
    pub stage: Option<String>,
}

impl ValidationError {
    pub(crate) fn stage(stage: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stage: Some(stage.to_string()),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(stage) = &self.stage {
            write!(f, "Stage '{}': {}", stage, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}
