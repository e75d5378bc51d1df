use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::ffi::{OsStr, OsString};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::BuildError;

/// Runs external programs to completion.
///
/// Every tool the build shells out to goes through this seam, so tests can
/// record the exact command lines instead of touching the host.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    /// Run `program` with `args`, failing with `BuildError::ExternalTool` on
    /// a non-zero exit.
    fn run(&self, program: &str, args: &[OsString]) -> Result<()>;
}

/// Runs commands on the host, blocking until they exit.
pub struct SystemRunner {
    progress: bool,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self { progress: true }
    }

    /// Never draw spinners, even on a terminal
    pub fn quiet() -> Self {
        Self { progress: false }
    }

    fn spinner(&self, program: &str) -> Option<ProgressBar> {
        // sudo may need the terminal for its password prompt
        if !self.progress || program == "sudo" || !console::Term::stderr().is_term() {
            return None;
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::default_spinner());
        spinner.set_message(format!("Running {}", program));
        spinner.enable_steady_tick(Duration::from_millis(120));
        Some(spinner)
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<()> {
        info!("Running: {}", render_command(program, args));

        let spinner = self.spinner(program);
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .output();
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        let output = output.with_context(|| format!("Failed to execute {}", program))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("{} output:\n{}", program, stdout.trim_end());
        }

        if !output.status.success() {
            return Err(anyhow!(BuildError::ExternalTool {
                program: program.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }));
        }

        Ok(())
    }
}

/// Build an argument vector from mixed string and path pieces
pub fn args<I, S>(items: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    items.into_iter().map(|s| s.as_ref().to_os_string()).collect()
}

pub fn render_command(program: &str, args: &[OsString]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

/// Fail with `NotFound` naming every tool missing from `PATH`
pub fn require_tools(tools: &[&str]) -> Result<()> {
    let missing: Vec<&str> = tools
        .iter()
        .copied()
        .filter(|tool| which::which(tool).is_err())
        .collect();

    if missing.is_empty() {
        debug!("Found required tools: {}", tools.join(", "));
        return Ok(());
    }

    Err(anyhow!(BuildError::NotFound(format!(
        "required tool(s) not on PATH: {}",
        missing.join(", ")
    ))))
}

/// Whether this process already runs with an effective uid of 0
pub fn is_root() -> bool {
    #[cfg(unix)]
    {
        nix::unistd::Uid::effective().is_root()
    }

    #[cfg(not(unix))]
    {
        false
    }
}
