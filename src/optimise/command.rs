//! Objectives evaluated by a shell command
//!
//! The command sees the trial through two environment variables and reports
//! its result on the last non-empty line of stdout:
//!
//! - a number: `0.42`
//! - a JSON list of numbers, one per direction: `[0.42, 17]`
//! - a JSON object: `{"value": 0.42, "annotations": {"events": 1000}}`
//!   (or `"values": [...]` for several directions)

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::process::CommandEnv;
use crate::study::{Distribution, ObjectiveValue, Trial};

/// Trial number, 0-based.
pub const TRIAL_NUMBER_ENV: &str = "O2TUNER_TRIAL_NUMBER";

/// Sampled parameters as a JSON object.
pub const TRIAL_PARAMS_ENV: &str = "O2TUNER_TRIAL_PARAMS";

#[derive(Debug, Clone)]
pub struct CommandObjective {
    cmd: String,
    search_space: BTreeMap<String, Distribution>,
    stage_dir: PathBuf,
    log_file: PathBuf,
    env: CommandEnv,
}

impl CommandObjective {
    pub fn new(
        cmd: &str,
        search_space: BTreeMap<String, Distribution>,
        stage_dir: PathBuf,
        log_file: PathBuf,
        env: CommandEnv,
    ) -> Self {
        Self {
            cmd: cmd.to_string(),
            search_space,
            stage_dir,
            log_file,
            env,
        }
    }

    pub fn evaluate(&self, trial: &mut Trial) -> Result<ObjectiveValue> {
        let mut params = Map::new();
        for (name, dist) in &self.search_space {
            let value = trial.suggest(name, dist.clone())?;
            params.insert(name.clone(), value.to_json());
        }

        let env = self
            .env
            .with_var(TRIAL_NUMBER_ENV, trial.number().to_string())
            .with_var(TRIAL_PARAMS_ENV, Value::Object(params).to_string());
        let cwd = trial
            .work_dir()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.stage_dir.clone());

        let (status, stdout) = env.run_capture(&self.cmd, &cwd, &self.log_file)?;
        if !status.success() {
            bail!("objective command exited with {status}");
        }

        let line = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| anyhow!("objective command printed nothing"))?;
        let (value, annotations) = parse_result_line(line)?;
        for (key, value) in annotations {
            trial.annotate(&key, value)?;
        }
        Ok(value)
    }
}

/// Parse the result line of an objective command.
pub fn parse_result_line(line: &str) -> Result<(ObjectiveValue, Map<String, Value>)> {
    if let Ok(v) = line.parse::<f64>() {
        return Ok((ObjectiveValue::Single(v), Map::new()));
    }

    let parsed: Value = serde_json::from_str(line)
        .with_context(|| format!("cannot read objective result from '{line}'"))?;
    match parsed {
        Value::Object(mut obj) => {
            let annotations = match obj.remove("annotations") {
                None | Some(Value::Null) => Map::new(),
                Some(Value::Object(a)) => a,
                Some(other) => bail!("'annotations' must be an object, got {other}"),
            };
            let value = match (obj.remove("values"), obj.remove("value")) {
                (Some(values), None) => numbers(&values)?,
                (None, Some(value)) => ObjectiveValue::Single(number(&value)?),
                _ => bail!("result object needs exactly one of 'value' or 'values'"),
            };
            Ok((value, annotations))
        }
        other => Ok((numbers(&other)?, Map::new())),
    }
}

fn number(value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| anyhow!("expected a number, got {value}"))
}

fn numbers(value: &Value) -> Result<ObjectiveValue> {
    match value {
        Value::Array(items) => Ok(ObjectiveValue::Multi(
            items.iter().map(number).collect::<Result<_>>()?,
        )),
        other => Ok(ObjectiveValue::Single(number(other)?)),
    }
}
