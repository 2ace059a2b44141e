//! `o2tuner run`

use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

use crate::cli::RecipeArgs;
use crate::recipe::load_recipe;
use crate::registry::Registry;
use crate::runner::{FailurePolicy, RunResult, Runner, RunnerConfig};
use crate::shutdown::process_token;

pub fn execute(
    args: &RecipeArgs,
    stages: Vec<String>,
    script_dir: Option<PathBuf>,
    keep_going: bool,
    registry: &Registry,
) -> Result<RunResult> {
    let recipe = load_recipe(&args.config)?;

    let cancel = process_token()?;

    let config = RunnerConfig {
        work_dir: args.work_dir.clone(),
        stages,
        script_dir,
        failure_policy: if keep_going {
            FailurePolicy::KeepGoing
        } else {
            FailurePolicy::HaltAll
        },
    };
    let runner = Runner::new(recipe, registry.clone(), config, cancel)?;

    println!(
        "{} Running recipe {} in {}",
        "→".cyan().bold(),
        args.config.display().to_string().bold(),
        runner.work_dir().root().display()
    );
    let result = runner.run()?;
    print_result(&result);
    Ok(result)
}

/// Print run result summary
pub fn print_result(result: &RunResult) {
    println!();
    println!("{}", "╭──────────────────────────────────────╮".cyan());
    println!("{}", "│            Run Complete              │".cyan().bold());
    println!("{}", "╰──────────────────────────────────────╯".cyan());

    let sections = [
        ("Completed".green().bold(), &result.completed, "✓".green().bold()),
        ("Failed".red().bold(), &result.failed, "✗".red().bold()),
        ("Skipped".yellow().bold(), &result.skipped, "⊘".yellow().bold()),
    ];
    for (heading, stages, mark) in sections {
        if stages.is_empty() {
            continue;
        }
        println!(
            "\n{} {}",
            heading,
            format!("({})", stages.len()).dimmed()
        );
        println!("{}", "─".repeat(40).dimmed());
        for stage in stages {
            println!("  {} {}", mark, stage);
        }
    }

    println!();
    println!("{}", "═".repeat(40).dimmed());
    if result.interrupted {
        println!(
            "{} Interrupted; run again to resume",
            "⚠".yellow().bold()
        );
    } else if result.is_success() {
        if result.completed.is_empty() {
            println!("{} Nothing to do, all stages are done", "✓".green().bold());
        } else {
            println!("{} All stages completed successfully!", "✓".green().bold());
        }
    }
}
