//! Running a single stage according to its kind

use anyhow::{anyhow, bail, Context, Result};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use tracing::{debug, info, warn};

use super::Runner;
use crate::config::UserConfig;
use crate::fs::DirGuard;
use crate::inspector::Inspector;
use crate::optimise::{run_optimisation, OptimisationContext};
use crate::recipe::{OptimisationSpec, StageDefinition, StageKind};
use crate::registry::StageContext;
use crate::study::panic_message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StageOutcome {
    Done,
    Failed,
    /// Cancelled part-way; not marked done so the next run resumes it.
    Interrupted,
}

impl Runner {
    pub(crate) fn run_stage(&self, stage: &StageDefinition) -> Result<StageOutcome> {
        let stage_dir = self.work_dir.ensure_stage_dir(&stage.cwd)?;
        let log_file = stage_dir.join(&stage.log_file);
        let config = self.recipe.stage_config(stage);
        info!(
            kind = stage.kind.label(),
            dir = %stage_dir.display(),
            "Running stage"
        );

        match &stage.kind {
            StageKind::Function { entrypoint } => {
                self.run_function(stage, entrypoint, &stage_dir, &config)
            }
            StageKind::Command { cmd } => {
                debug!(cmd = %cmd, log = %log_file.display(), "Running command");
                let status = self.env.run_logged(cmd, &stage_dir, &log_file)?;
                if status.success() {
                    Ok(StageOutcome::Done)
                } else {
                    warn!(
                        log = %log_file.display(),
                        "Command exited with {status}"
                    );
                    Ok(StageOutcome::Failed)
                }
            }
            StageKind::Optimisation(spec) => {
                self.run_optimisation_stage(stage, spec, &stage_dir, &log_file, &config)
            }
        }
    }

    fn run_function(
        &self,
        stage: &StageDefinition,
        entrypoint: &str,
        stage_dir: &Path,
        config: &UserConfig,
    ) -> Result<StageOutcome> {
        let func = self
            .registry
            .get_stage(entrypoint)
            .ok_or_else(|| anyhow!("no stage function registered as '{entrypoint}'"))?;
        let inspectors = self.inspectors_for(stage)?;

        let _guard = DirGuard::enter(stage_dir)?;
        let ctx = StageContext::new(&stage.name, stage_dir, config, &inspectors);
        match catch_unwind(AssertUnwindSafe(|| func(&ctx))) {
            Ok(Ok(true)) => Ok(StageOutcome::Done),
            Ok(Ok(false)) => {
                warn!(entrypoint, "Stage function reported failure");
                Ok(StageOutcome::Failed)
            }
            Ok(Err(e)) => Err(e.context(format!("stage function '{entrypoint}' failed"))),
            Err(payload) => bail!(
                "stage function '{entrypoint}' panicked: {}",
                panic_message(payload.as_ref())
            ),
        }
    }

    fn run_optimisation_stage(
        &self,
        stage: &StageDefinition,
        spec: &OptimisationSpec,
        stage_dir: &Path,
        log_file: &Path,
        config: &UserConfig,
    ) -> Result<StageOutcome> {
        let _guard = DirGuard::enter(stage_dir)?;
        let ctx = OptimisationContext {
            stage: &stage.name,
            stage_dir,
            log_file,
            config,
            registry: &self.registry,
            env: &self.env,
            cancel: &self.cancel,
        };
        let report = run_optimisation(spec, &ctx)?;
        if report.interrupted() {
            Ok(StageOutcome::Interrupted)
        } else {
            Ok(StageOutcome::Done)
        }
    }

    /// Inspectors of the optimisation stages a stage asks for.
    fn inspectors_for(&self, stage: &StageDefinition) -> Result<BTreeMap<String, Inspector>> {
        let mut inspectors = BTreeMap::new();
        for name in &stage.optimisations {
            let opt_stage = self
                .recipe
                .stage(name)
                .ok_or_else(|| anyhow!("Unknown stage '{name}'"))?;
            let spec = opt_stage
                .optimisation()
                .ok_or_else(|| anyhow!("stage '{name}' is not an optimisation stage"))?;
            let inspector = Inspector::for_stage(spec, &self.work_dir.stage_dir(&opt_stage.cwd))
                .with_context(|| format!("Failed to inspect optimisation '{name}'"))?;
            inspectors.insert(name.clone(), inspector);
        }
        Ok(inspectors)
    }
}
