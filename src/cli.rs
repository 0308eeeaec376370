use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "cross-platform service manager for JVM daemons")]
pub struct Args {
    /// Path to the service configuration file
    #[arg(long, short = 'c', global = true, default_value = "svcman.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Stage the jar, register the service natively, and start it
    Install,
    /// Start the installed service (Exit 0 = success, 1 = failed)
    Start,
    /// Stop the service; an already-stopped service is not an error
    Stop,
    /// Stop then start, reporting both PIDs
    Restart,
    /// Show daemon status (Exit 0 = running, 1 = stopped)
    Status,
    /// Stop if running, then remove the native registration and artifacts
    Uninstall,
    /// Print the daemon log
    Logs {
        /// Only print the last N lines
        #[arg(long, short = 'n')]
        lines: Option<usize>,
    },
}
