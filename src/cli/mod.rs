//! Command-line front end
//!
//! Programs that register their own stage functions and objectives call
//! [`entrypoint`] from `main`; the bundled `o2tuner` binary does the same
//! with an empty registry, which is enough for shell-only recipes.

mod dispatch;
mod types;

use clap::Parser;
use colored::Colorize;
use std::ffi::OsString;

use crate::logging::{self, Verbosity};
use crate::registry::Registry;

pub use dispatch::dispatch;
pub use types::{Cli, Commands, RecipeArgs};

/// Exit code for configuration and other errors that stop a run before or
/// outside stage execution.
pub const FATAL_EXIT_CODE: i32 = 10;

/// Parse the process arguments and run; returns the exit code.
pub fn entrypoint(registry: Registry) -> i32 {
    run_with_args(std::env::args_os(), registry)
}

/// Same as [`entrypoint`] with explicit arguments (the first is the program name).
pub fn run_with_args<I, T>(args: I, registry: Registry) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            let code = e.exit_code();
            let _ = e.print();
            return code;
        }
    };
    logging::init(Verbosity::from_flags(cli.debug, cli.quiet));

    match dispatch(cli.command, &registry) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            FATAL_EXIT_CODE
        }
    }
}
