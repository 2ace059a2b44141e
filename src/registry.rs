//! Named user functions a recipe can refer to.
//!
//! A recipe names stage functions (`entrypoint:` of a user stage) and
//! objectives (`entrypoint:` / `objective:` of an optimisation stage). The
//! program embedding o2tuner registers them here and passes the registry to
//! [`crate::cli::entrypoint`].
//!
//! ```no_run
//! use o2tuner::{Registry, ObjectiveValue};
//!
//! let registry = Registry::new()
//!     .objective("quadratic", |trial, _config| {
//!         let x = trial.suggest_float("x", -10.0, 10.0)?;
//!         Ok(ObjectiveValue::Single((x - 2.0).powi(2)))
//!     })
//!     .stage("evaluate", |ctx| {
//!         let losses = ctx.inspector("optimise").map(|i| i.losses()).unwrap_or_default();
//!         Ok(!losses.is_empty())
//!     });
//! std::process::exit(o2tuner::cli::entrypoint(registry));
//! ```

use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::UserConfig;
use crate::inspector::Inspector;
use crate::study::{ObjectiveValue, Trial};

/// What a user stage function receives.
#[derive(Debug)]
pub struct StageContext<'a> {
    pub name: &'a str,
    /// Stage directory; also the process working directory during the call.
    pub stage_dir: &'a Path,
    pub config: &'a UserConfig,
    inspectors: &'a BTreeMap<String, Inspector>,
}

impl<'a> StageContext<'a> {
    pub fn new(
        name: &'a str,
        stage_dir: &'a Path,
        config: &'a UserConfig,
        inspectors: &'a BTreeMap<String, Inspector>,
    ) -> Self {
        Self {
            name,
            stage_dir,
            config,
            inspectors,
        }
    }

    /// Inspector of an optimisation stage listed in this stage's `optimisations`.
    pub fn inspector(&self, stage: &str) -> Option<&Inspector> {
        self.inspectors.get(stage)
    }

    pub fn inspectors(&self) -> &BTreeMap<String, Inspector> {
        self.inspectors
    }
}

/// A user stage: `Ok(true)` on success.
pub type StageFn = Arc<dyn Fn(&StageContext<'_>) -> Result<bool> + Send + Sync>;

/// An objective: evaluates one trial with the stage's merged configuration.
pub type ObjectiveFn = Arc<dyn Fn(&mut Trial, &UserConfig) -> Result<ObjectiveValue> + Send + Sync>;

/// Table of named stage functions and objectives.
#[derive(Clone, Default)]
pub struct Registry {
    stages: BTreeMap<String, StageFn>,
    objectives: BTreeMap<String, ObjectiveFn>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Registry::register_stage`].
    pub fn stage<F>(mut self, name: &str, func: F) -> Self
    where
        F: Fn(&StageContext<'_>) -> Result<bool> + Send + Sync + 'static,
    {
        self.register_stage(name, func);
        self
    }

    /// Builder form of [`Registry::register_objective`].
    pub fn objective<F>(mut self, name: &str, func: F) -> Self
    where
        F: Fn(&mut Trial, &UserConfig) -> Result<ObjectiveValue> + Send + Sync + 'static,
    {
        self.register_objective(name, func);
        self
    }

    /// Register (or replace) a stage function.
    pub fn register_stage<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&StageContext<'_>) -> Result<bool> + Send + Sync + 'static,
    {
        self.stages.insert(name.to_string(), Arc::new(func));
    }

    /// Register (or replace) an objective.
    pub fn register_objective<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&mut Trial, &UserConfig) -> Result<ObjectiveValue> + Send + Sync + 'static,
    {
        self.objectives.insert(name.to_string(), Arc::new(func));
    }

    pub fn get_stage(&self, name: &str) -> Option<StageFn> {
        self.stages.get(name).cloned()
    }

    pub fn get_objective(&self, name: &str) -> Option<ObjectiveFn> {
        self.objectives.get(name).cloned()
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }

    pub fn objective_names(&self) -> impl Iterator<Item = &str> {
        self.objectives.keys().map(String::as_str)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("stages", &self.stages.keys().collect::<Vec<_>>())
            .field("objectives", &self.objectives.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        let registry = Registry::new()
            .stage("prepare", |_| Ok(true))
            .objective("loss", |_, _| Ok(ObjectiveValue::Single(0.0)));

        assert!(registry.get_stage("prepare").is_some());
        assert!(registry.get_stage("loss").is_none());
        assert!(registry.get_objective("loss").is_some());
        assert_eq!(registry.stage_names().collect::<Vec<_>>(), vec!["prepare"]);
    }

    #[test]
    fn test_stage_receives_context() {
        let registry = Registry::new().stage("check", |ctx| {
            Ok(ctx.name == "check" && ctx.config.get_i64("n") == Some(3))
        });
        let config: UserConfig = serde_json::from_value(serde_json::json!({"n": 3})).unwrap();
        let inspectors = BTreeMap::new();
        let ctx = StageContext::new("check", Path::new("."), &config, &inspectors);
        assert!(registry.get_stage("check").unwrap()(&ctx).unwrap());
        assert!(ctx.inspector("opt").is_none());
    }
}
