//! `o2tuner inspect`

use anyhow::{anyhow, bail, Result};
use colored::Colorize;
use std::path::PathBuf;

use crate::cli::RecipeArgs;
use crate::fs::WorkDir;
use crate::inspector::Inspector;
use crate::recipe::load_recipe;
use crate::study::TrialState;

pub fn execute(args: &RecipeArgs, stage_name: &str, out: Option<PathBuf>) -> Result<Vec<PathBuf>> {
    let recipe = load_recipe(&args.config)?;
    let stage = recipe
        .stage(stage_name)
        .ok_or_else(|| anyhow!("Unknown stage '{stage_name}'"))?;
    let Some(spec) = stage.optimisation() else {
        bail!("Stage '{stage_name}' is not an optimisation stage");
    };

    let work_dir = WorkDir::prepare(&args.work_dir)?;
    let stage_dir = work_dir.stage_dir(&stage.cwd);
    if !stage_dir.is_dir() {
        bail!(
            "Stage '{stage_name}' has not run yet: {} does not exist",
            stage_dir.display()
        );
    }

    let inspector = Inspector::for_stage(spec, &stage_dir)?;
    print_summary(&inspector);

    let written = inspector.visualise(out.as_deref())?;
    println!("\n{}", "Figures".bold());
    for path in &written {
        println!("  {} {}", "→".dimmed(), path.display());
    }
    Ok(written)
}

fn print_summary(inspector: &Inspector) {
    let count = |state: TrialState| {
        inspector
            .trials()
            .iter()
            .filter(|t| t.state == state)
            .count()
    };

    println!(
        "{} {}",
        "Study".bold(),
        inspector.study_name().cyan().bold()
    );
    println!("{}", "─".repeat(40).dimmed());
    println!("  Trials:    {}", inspector.trials().len().to_string().bold());
    println!("  Complete:  {}", count(TrialState::Complete).to_string().green());
    println!("  Pruned:    {}", count(TrialState::Pruned).to_string().yellow());
    println!("  Failed:    {}", count(TrialState::Fail).to_string().red());
    let running = count(TrialState::Running);
    if running > 0 {
        println!("  Running:   {running}");
    }

    match inspector.best_trial() {
        Some(best) => {
            let values = best
                .values
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            println!(
                "\n{} trial {} with value {}",
                "Best".green().bold(),
                best.number,
                values.bold()
            );
            for (name, value) in &best.params {
                println!("  {name} = {}", value.to_json());
            }
        }
        None => println!("\n{}", "No complete trials yet".yellow()),
    }

    let importances = inspector.importances();
    if !importances.is_empty() {
        println!("\n{}", "Importance".bold());
        for (name, score) in importances {
            println!("  {name:<20} {score:.3}");
        }
    }
}
