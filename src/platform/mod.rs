//! Platform backends for native service management.
//!
//! One contract, five implementations, each encoding a different native
//! service model:
//! - Linux: systemd user units (`systemctl --user`)
//! - macOS: LaunchAgents (`launchctl`)
//! - Windows: startup-folder spawn, NSSM-wrapped service, or WinSW-wrapped
//!   service, selected by configuration
//!
//! The native facility is the source of truth for "is it running": a
//! [`DaemonStatus`] is always derived by querying it, never cached.

pub mod launchd;
pub mod systemd;
pub mod windows;

use std::path::PathBuf;

use anyhow::Result;

use crate::config::Config;
use crate::error::SvcError;

/// Everything a backend needs to act on the managed service.
///
/// Rebuilt from configuration on every invocation; never stored.
#[derive(Debug, Clone)]
pub struct DaemonDescriptor {
    /// Stable identifier, used as label, unit name, or service name.
    pub service_id: String,
    /// The runnable jar.
    pub jar_path: PathBuf,
    /// Root of the Java installation; the executable is `<java_home>/bin/java`.
    pub java_home: String,
    /// Native descriptor target; empty when the backend has no file-based
    /// config (NSSM, Windows startup folder).
    pub config_path: String,
    /// stdout/stderr redirection target; empty when there is no managed log.
    pub log_path: String,
    /// Flags inserted before `-jar`.
    pub jvm_args: Vec<String>,
    /// Flags appended after the jar path.
    pub app_args: Vec<String>,
    /// Whether the native facility should restart the process on exit.
    pub keep_alive: bool,
}

impl DaemonDescriptor {
    /// The launch argv shared by every backend: java, JVM flags, `-jar`,
    /// jar path, app flags, order preserved.
    pub fn launch_args(&self, java_exe: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(3 + self.jvm_args.len() + self.app_args.len());
        args.push(java_exe.to_string());
        args.extend(self.jvm_args.iter().cloned());
        args.push("-jar".to_string());
        args.push(self.jar_path.display().to_string());
        args.extend(self.app_args.iter().cloned());
        args
    }

    pub fn jar_name(&self) -> String {
        self.jar_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Snapshot of the service state as the native facility reports it.
#[derive(Debug, Clone)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub details: String,
    pub config_path: Option<String>,
    pub log_path: Option<String>,
}

impl DaemonStatus {
    pub fn stopped(details: impl Into<String>, descriptor: &DaemonDescriptor) -> Self {
        DaemonStatus {
            running: false,
            pid: None,
            details: details.into(),
            config_path: path_or_none(&descriptor.config_path),
            log_path: path_or_none(&descriptor.log_path),
        }
    }
}

fn path_or_none(path: &str) -> Option<String> {
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

/// Uniform lifecycle contract over the native service facilities.
pub trait DaemonBackend {
    /// Canonical native-config location for this backend. Pure, no I/O.
    fn default_config_path(&self, service_id: &str) -> String;

    /// Canonical log location for this backend. Pure, no I/O.
    fn default_log_path(&self, service_id: &str) -> String;

    /// Write native configuration and register the service. Idempotent:
    /// re-running against an already-installed service must not fail or
    /// duplicate the registration.
    fn install(&self, descriptor: &DaemonDescriptor) -> Result<()>;

    /// Invoke the native start mechanism. The PID is best effort; absence
    /// is not an error.
    fn start(&self, descriptor: &DaemonDescriptor) -> Result<Option<u32>>;

    /// Invoke the native stop mechanism, returning the PID that was running
    /// before the stop. Stop failures are non-fatal: they are logged and
    /// reported as no PID. "Already stopped" is success.
    fn stop(&self, descriptor: &DaemonDescriptor) -> Result<Option<u32>>;

    /// Query native state. Never mutates; "not running" and "not installed"
    /// are valid statuses, not errors.
    fn status(&self, descriptor: &DaemonDescriptor) -> Result<DaemonStatus>;

    /// Remove native registration and configuration artifacts. Safe to call
    /// when nothing is installed.
    fn cleanup(&self, descriptor: &DaemonDescriptor) -> Result<()>;
}

/// Pick the backend for the detected operating system.
pub fn detect_backend(config: &Config) -> Result<Box<dyn DaemonBackend>> {
    select_backend(std::env::consts::OS, config)
}

/// Pure dispatch over an OS identity string plus the Windows strategy flags.
/// Unknown platforms fail here, at selection time, not on first use.
pub fn select_backend(os: &str, config: &Config) -> Result<Box<dyn DaemonBackend>> {
    match os {
        "linux" => Ok(Box::new(systemd::SystemdBackend::new(
            config.linux.service_path.clone(),
        ))),
        "macos" => Ok(Box::new(launchd::LaunchdBackend::new(
            config.macos.plist_path.clone(),
        ))),
        "windows" => Ok(windows::select_strategy(&config.windows)),
        other => Err(SvcError::UnsupportedPlatform(other.to_string()).into()),
    }
}

pub(crate) fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}
