use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::validation::clap_stage_validator;

const HELP_TEMPLATE: &str = "
   ┌─┐┌─┐┌┬┐┬ ┬┌┐┌┌─┐┬─┐
   │ │┌─┘ │ │ ││││├┤ ├┬┘
   └─┘└─┘ ┴ └─┘┘└┘└─┘┴└─

{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}";

#[derive(Parser)]
#[command(name = "o2tuner")]
#[command(about = "Run optimisation and evaluation stages from a recipe", long_about = None)]
#[command(version)]
#[command(help_template = HELP_TEMPLATE)]
#[command(subcommand_help_heading = "Commands")]
pub struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where a recipe runs and which of its stages are asked for.
#[derive(Args, Debug, Clone)]
pub struct RecipeArgs {
    /// Run directory holding the stage directories
    #[arg(short = 'w', long = "work-dir", default_value = ".")]
    pub work_dir: PathBuf,

    /// Recipe file (YAML, or TOML with a .toml extension)
    #[arg(short = 'c', long = "config")]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the stages of a recipe
    Run {
        #[command(flatten)]
        recipe: RecipeArgs,

        /// Stages to (re)run together with their pending dependencies
        #[arg(short, long = "stages", num_args = 1.., value_parser = clap_stage_validator)]
        stages: Vec<String>,

        /// Directory of helper scripts, added to PATH of shell stages
        #[arg(long)]
        script_dir: Option<PathBuf>,

        /// Continue with stages that do not depend on a failed stage
        #[arg(long)]
        keep_going: bool,
    },

    /// Print the stages a run would execute, in order
    Graph {
        #[command(flatten)]
        recipe: RecipeArgs,

        /// Stages to (re)run together with their pending dependencies
        #[arg(short, long = "stages", num_args = 1.., value_parser = clap_stage_validator)]
        stages: Vec<String>,

        /// Show every stage with its status instead of the run order
        #[arg(long)]
        all: bool,
    },

    /// Summarise the study of an optimisation stage and write its figures
    Inspect {
        #[command(flatten)]
        recipe: RecipeArgs,

        /// Optimisation stage to inspect
        #[arg(value_parser = clap_stage_validator)]
        stage: String,

        /// Output directory for figures (default: <stage dir>/visualisation)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for (bash, zsh, fish)
        shell: String,
    },
}
