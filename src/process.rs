//! Subprocess execution seam.
//!
//! Every backend drives its native tool (`systemctl`, `launchctl`, `nssm`,
//! `sc`, WinSW, `taskkill`, `wmic`) through [`CommandRunner`], so tests can
//! substitute a canned in-memory runner and assert on the exact argv issued.

use std::process::{Command, Stdio};

use anyhow::{Context, Result};

/// Exit code, stdout, and stderr of one finished command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs an external command line, blocking until it finishes.
pub trait CommandRunner {
    /// Execute `argv` and capture its exit code and output streams.
    fn run(&self, argv: &[&str]) -> Result<CommandOutput>;

    /// Launch `argv` detached and return the OS-assigned PID without waiting.
    ///
    /// Only the Windows startup-folder backend needs this; the child keeps
    /// running after svcman exits.
    fn spawn(&self, argv: &[&str]) -> Result<u32>;
}

/// Production runner on top of `std::process::Command`.
pub struct Processes;

impl CommandRunner for Processes {
    fn run(&self, argv: &[&str]) -> Result<CommandOutput> {
        let (program, args) = argv.split_first().context("empty command line")?;

        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("Failed to execute {program}"))?;

        Ok(CommandOutput {
            // Killed-by-signal has no exit code; treat it as a plain failure.
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn spawn(&self, argv: &[&str]) -> Result<u32> {
        let (program, args) = argv.split_first().context("empty command line")?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn {program}"))?;

        Ok(child.id())
    }
}
