//! `o2tuner graph`

use anyhow::Result;
use colored::Colorize;

use super::stages_done;
use crate::cli::RecipeArgs;
use crate::recipe::{load_recipe, StageGraph};

pub fn execute(args: &RecipeArgs, stages: &[String], all: bool) -> Result<()> {
    let recipe = load_recipe(&args.config)?;
    let graph = StageGraph::build(&recipe.stages)?;
    let done = stages_done(&args.work_dir)?;

    if all {
        println!("{}", "Stages".bold());
        for name in graph.topological_order() {
            let Some(stage) = recipe.stage(&name) else {
                continue;
            };
            let status = if done.contains(&name) {
                "done".green()
            } else {
                "pending".yellow()
            };
            print_stage(&name, stage.kind.label(), graph.dependencies(&name)?, &status.to_string());
        }
        return Ok(());
    }

    let order = graph.resolve(stages, &done)?;
    if order.is_empty() {
        println!("{} Nothing to run, all stages are done", "✓".green().bold());
        return Ok(());
    }
    println!("{} {}", "Run order".bold(), format!("({})", order.len()).dimmed());
    for (i, name) in order.iter().enumerate() {
        let Some(stage) = recipe.stage(name) else {
            continue;
        };
        print_stage(
            name,
            stage.kind.label(),
            graph.dependencies(name)?,
            &format!("{}.", i + 1).dimmed().to_string(),
        );
    }
    Ok(())
}

fn print_stage(name: &str, kind: &str, deps: &[String], prefix: &str) {
    let deps = if deps.is_empty() {
        String::new()
    } else {
        format!(" ← {}", deps.join(", ")).dimmed().to_string()
    };
    println!("  {prefix} {} {}{deps}", name.bold(), format!("[{kind}]").cyan());
}
