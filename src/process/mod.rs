//! Shell command execution for command stages and command objectives

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use tracing::debug;

/// Environment variable exported with the alternate script directory.
pub const SCRIPT_DIR_ENV: &str = "O2TUNER_SCRIPT_DIR";

/// The shell used for `cmd` entries: `bash` when installed, `sh` otherwise.
pub fn shell() -> PathBuf {
    which::which("bash").unwrap_or_else(|_| PathBuf::from("sh"))
}

/// How commands are launched: shell, extra environment, script directory.
#[derive(Debug, Clone)]
pub struct CommandEnv {
    shell: PathBuf,
    script_dir: Option<PathBuf>,
    vars: Vec<(String, String)>,
}

impl Default for CommandEnv {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CommandEnv {
    pub fn new(script_dir: Option<PathBuf>) -> Self {
        Self {
            shell: shell(),
            script_dir,
            vars: Vec::new(),
        }
    }

    pub fn script_dir(&self) -> Option<&Path> {
        self.script_dir.as_deref()
    }

    /// Copy with one more environment variable.
    pub fn with_var(&self, key: &str, value: impl Into<String>) -> Self {
        let mut env = self.clone();
        env.vars.push((key.to_string(), value.into()));
        env
    }

    fn command(&self, cmd: &str, cwd: &Path) -> Result<Command> {
        let mut command = Command::new(&self.shell);
        command.arg("-c").arg(cmd).current_dir(cwd).stdin(Stdio::null());
        if let Some(dir) = &self.script_dir {
            let mut paths = vec![dir.clone()];
            if let Some(existing) = std::env::var_os("PATH") {
                paths.extend(std::env::split_paths(&existing));
            }
            let joined: OsString =
                std::env::join_paths(paths).context("Script directory cannot be put on PATH")?;
            command.env("PATH", joined).env(SCRIPT_DIR_ENV, dir);
        }
        for (key, value) in &self.vars {
            command.env(key, value);
        }
        debug!(shell = %self.shell.display(), cwd = %cwd.display(), cmd, "Running command");
        Ok(command)
    }

    /// Run `cmd` in `cwd`, appending stdout and stderr to `log_file`.
    pub fn run_logged(&self, cmd: &str, cwd: &Path, log_file: &Path) -> Result<ExitStatus> {
        let log = open_log(log_file)?;
        let err_log = log
            .try_clone()
            .context("Failed to duplicate log file handle")?;
        self.command(cmd, cwd)?
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(err_log))
            .status()
            .with_context(|| format!("Failed to launch command: {cmd}"))
    }

    /// Run `cmd` in `cwd`, capturing stdout; stderr is appended to `log_file`.
    ///
    /// The captured stdout is also appended to the log.
    pub fn run_capture(
        &self,
        cmd: &str,
        cwd: &Path,
        log_file: &Path,
    ) -> Result<(ExitStatus, String)> {
        let err_log = open_log(log_file)?;
        let mut child = self
            .command(cmd, cwd)?
            .stdout(Stdio::piped())
            .stderr(Stdio::from(err_log))
            .spawn()
            .with_context(|| format!("Failed to launch command: {cmd}"))?;

        let mut stdout = String::new();
        if let Some(mut pipe) = child.stdout.take() {
            pipe.read_to_string(&mut stdout)
                .context("Failed to read command output")?;
        }
        let status = child.wait().context("Failed to wait for command")?;

        crate::fs::locking::locked_append(log_file, &stdout)?;
        Ok((status, stdout))
    }
}

fn open_log(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}
