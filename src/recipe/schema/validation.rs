//! Recipe validation: raw document -> validated stage table

use std::collections::HashSet;

use crate::config::UserConfig;
use crate::study::sampler::construct_sampler;
use crate::study::storage::StorageUrl;
use crate::study::Direction;
use crate::validation::{validate_file_name, validate_name, validate_relative_dir};

use super::types::{
    ObjectiveSource, OptimisationSpec, OptimisationStageEntry, Recipe, RecipeDocument,
    StageDefinition, StageKind, UserStageEntry, ValidationError, DEFAULT_JOBS, DEFAULT_TRIALS,
};

/// Validate a recipe document and build the stage table.
///
/// All problems are collected and returned together.
pub fn validate(doc: &RecipeDocument) -> Result<Recipe, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    let names = doc
        .stages_user
        .iter()
        .map(|(n, _)| n)
        .chain(doc.stages_optimisation.iter().map(|(n, _)| n));
    for name in names {
        if !seen.insert(name.as_str()) {
            errors.push(ValidationError::stage(
                name,
                "defined both as user and as optimisation stage",
            ));
        }
        if let Err(e) = validate_name(name) {
            errors.push(ValidationError::stage(name, format!("Invalid stage name: {e}")));
        }
    }
    let optimisation_names: HashSet<&str> = doc
        .stages_optimisation
        .iter()
        .map(|(n, _)| n.as_str())
        .collect();

    let mut stages = Vec::with_capacity(doc.stages_user.len() + doc.stages_optimisation.len());
    for (name, entry) in doc.stages_user.iter() {
        if let Some(stage) = user_stage(name, entry, &optimisation_names, &mut errors) {
            stages.push(stage);
        }
    }
    for (name, entry) in doc.stages_optimisation.iter() {
        if let Some(stage) = optimisation_stage(name, entry, &mut errors) {
            stages.push(stage);
        }
    }

    for stage in &stages {
        for dep in &stage.deps {
            if dep == &stage.name {
                errors.push(ValidationError::stage(
                    &stage.name,
                    "Stage cannot depend on itself",
                ));
            } else if !seen.contains(dep.as_str()) {
                errors.push(ValidationError::stage(
                    &stage.name,
                    format!("Unknown dependency: '{dep}'"),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(Recipe {
            config: UserConfig::new(doc.config.clone()),
            stages,
        })
    } else {
        Err(errors)
    }
}

/// Checks shared by both stage kinds; returns `(cwd, log_file)`.
fn common(
    name: &str,
    cwd: &Option<String>,
    log_file: &Option<String>,
    errors: &mut Vec<ValidationError>,
) -> (String, String) {
    let cwd = cwd.clone().unwrap_or_else(|| name.to_string());
    if let Err(e) = validate_relative_dir(&cwd) {
        errors.push(ValidationError::stage(name, format!("Invalid cwd: {e}")));
    }
    let log_file = log_file.clone().unwrap_or_else(|| format!("{name}.log"));
    if let Err(e) = validate_file_name(&log_file) {
        errors.push(ValidationError::stage(name, format!("Invalid log_file: {e}")));
    }
    (cwd, log_file)
}

fn user_stage(
    name: &str,
    entry: &UserStageEntry,
    optimisation_names: &HashSet<&str>,
    errors: &mut Vec<ValidationError>,
) -> Option<StageDefinition> {
    let (cwd, log_file) = common(name, &entry.cwd, &entry.log_file, errors);

    for opt in &entry.optimisations {
        if !optimisation_names.contains(opt.as_str()) {
            errors.push(ValidationError::stage(
                name,
                format!("'{opt}' in optimisations is not an optimisation stage"),
            ));
        }
    }

    let kind = match (&entry.cmd, &entry.entrypoint) {
        (Some(cmd), None) if !cmd.trim().is_empty() => StageKind::Command { cmd: cmd.clone() },
        (None, Some(entrypoint)) if !entrypoint.trim().is_empty() => StageKind::Function {
            entrypoint: entrypoint.clone(),
        },
        (Some(_), Some(_)) => {
            errors.push(ValidationError::stage(
                name,
                "give either 'cmd' or 'entrypoint', not both",
            ));
            return None;
        }
        _ => {
            errors.push(ValidationError::stage(
                name,
                "needs a non-empty 'cmd' or 'entrypoint'",
            ));
            return None;
        }
    };

    let mut deps = entry.deps.clone();
    for opt in &entry.optimisations {
        if !deps.contains(opt) {
            deps.push(opt.clone());
        }
    }

    Some(StageDefinition {
        name: name.to_string(),
        kind,
        deps,
        cwd,
        log_file,
        config: entry.config.clone(),
        optimisations: entry.optimisations.clone(),
    })
}

fn optimisation_stage(
    name: &str,
    entry: &OptimisationStageEntry,
    errors: &mut Vec<ValidationError>,
) -> Option<StageDefinition> {
    let (cwd, log_file) = common(name, &entry.cwd, &entry.log_file, errors);
    let before = errors.len();

    let objective = match (&entry.entrypoint, &entry.cmd) {
        (Some(f), None) if !f.trim().is_empty() => Some(ObjectiveSource::Registered(f.clone())),
        (None, Some(cmd)) if !cmd.trim().is_empty() => Some(ObjectiveSource::Command(cmd.clone())),
        (Some(_), Some(_)) => {
            errors.push(ValidationError::stage(
                name,
                "give either 'entrypoint' or 'cmd' as objective, not both",
            ));
            None
        }
        _ => {
            errors.push(ValidationError::stage(
                name,
                "needs a non-empty 'entrypoint' (or 'objective') or 'cmd'",
            ));
            None
        }
    };

    let jobs = entry.jobs.unwrap_or(DEFAULT_JOBS);
    if jobs == 0 {
        errors.push(ValidationError::stage(name, "jobs must be at least 1"));
    }
    let trials = entry.trials.unwrap_or(DEFAULT_TRIALS);

    let study = entry.study.clone().unwrap_or_default();
    let study_name = study.name.clone().unwrap_or_else(|| name.to_string());
    if let Err(e) = validate_name(&study_name) {
        errors.push(ValidationError::stage(name, format!("Invalid study name: {e}")));
    }
    if let Some(url) = &study.storage {
        if let Err(e) = StorageUrl::parse(url) {
            errors.push(ValidationError::stage(name, e.to_string()));
        }
    }

    let directions = match &entry.directions {
        Some(d) if d.is_empty() => {
            errors.push(ValidationError::stage(name, "directions cannot be empty"));
            Vec::new()
        }
        Some(d) => d.clone(),
        None => vec![Direction::Minimize],
    };

    for (param, dist) in &entry.search_space {
        if let Err(e) = dist.validate(param) {
            errors.push(ValidationError::stage(name, e.to_string()));
        }
    }
    if matches!(objective, Some(ObjectiveSource::Command(_))) && entry.search_space.is_empty() {
        errors.push(ValidationError::stage(
            name,
            "a 'cmd' objective needs a non-empty search_space",
        ));
    }

    if let Err(e) = construct_sampler(entry.sampler.as_ref()) {
        errors.push(ValidationError::stage(name, e.to_string()));
    }

    if errors.len() > before {
        return None;
    }

    Some(StageDefinition {
        name: name.to_string(),
        kind: StageKind::Optimisation(OptimisationSpec {
            objective: objective?,
            jobs,
            trials,
            sampler: entry.sampler.clone(),
            study_name,
            storage: study.storage,
            directions,
            search_space: entry.search_space.clone(),
            trial_cwd: entry.trial_cwd,
        }),
        deps: entry.deps.clone(),
        cwd,
        log_file,
        config: entry.config.clone(),
        optimisations: Vec::new(),
    })
}
