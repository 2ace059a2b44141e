use anyhow::Result;
use clap::CommandFactory;
use std::str::FromStr;

use super::types::{Cli, Commands};
use crate::commands::{graph, inspect, run};
use crate::completions::{generate_completions, Shell};
use crate::registry::Registry;

/// Run a parsed command; the `Ok` value is the process exit code.
pub fn dispatch(command: Commands, registry: &Registry) -> Result<i32> {
    match command {
        Commands::Run {
            recipe,
            stages,
            script_dir,
            keep_going,
        } => {
            let result = run::execute(&recipe, stages, script_dir, keep_going, registry)?;
            Ok(result.exit_code())
        }
        Commands::Graph {
            recipe,
            stages,
            all,
        } => graph::execute(&recipe, &stages, all).map(|()| 0),
        Commands::Inspect { recipe, stage, out } => {
            inspect::execute(&recipe, &stage, out).map(|_| 0)
        }
        Commands::Completions { shell } => {
            let shell = Shell::from_str(&shell)?;
            generate_completions(&mut Cli::command(), shell, &mut std::io::stdout());
            Ok(0)
        }
    }
}
