//! Log output on stderr through `tracing`

use tracing_subscriber::EnvFilter;

/// Verbosity picked on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Debug,
}

impl Verbosity {
    pub fn from_flags(debug: bool, quiet: bool) -> Self {
        match (debug, quiet) {
            (true, _) => Self::Debug,
            (false, true) => Self::Quiet,
            (false, false) => Self::Normal,
        }
    }

    fn level(self) -> &'static str {
        match self {
            Self::Quiet => "warn",
            Self::Normal => "info",
            Self::Debug => "debug",
        }
    }
}

/// Install the global subscriber; `RUST_LOG` overrides the verbosity flags.
///
/// Calling this more than once keeps the first subscriber.
pub fn init(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(verbosity.level()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
