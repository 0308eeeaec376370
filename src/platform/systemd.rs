//! systemd user-unit backend (Linux).
//!
//! The unit file is written under `~/.config/systemd/user/` and every
//! `systemctl` invocation targets the per-user manager, never the system one.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::error::SvcError;
use crate::platform::{DaemonBackend, DaemonDescriptor, DaemonStatus, home_dir};
use crate::process::{CommandRunner, Processes};

pub struct SystemdBackend {
    runner: Box<dyn CommandRunner>,
    service_path: Option<String>,
}

impl SystemdBackend {
    pub fn new(service_path: Option<String>) -> Self {
        Self::with_runner(Box::new(Processes), service_path)
    }

    pub fn with_runner(runner: Box<dyn CommandRunner>, service_path: Option<String>) -> Self {
        SystemdBackend {
            runner,
            service_path,
        }
    }

    fn unit_name(service_id: &str) -> String {
        format!("{service_id}.service")
    }

    /// Best-effort PID from `systemctl show --property=MainPID`.
    /// `MainPID=0` means "no main process" and is reported as absent.
    fn query_pid(&self, unit: &str) -> Option<u32> {
        let output = self
            .runner
            .run(&["systemctl", "--user", "show", "--property=MainPID", unit])
            .ok()?;
        if !output.success() {
            return None;
        }
        parse_main_pid(&output.stdout)
    }

    fn generate_unit(descriptor: &DaemonDescriptor) -> String {
        let java_exe = format!("{}/bin/java", descriptor.java_home);
        let exec_start = descriptor.launch_args(&java_exe).join(" ");
        let restart = if descriptor.keep_alive { "always" } else { "no" };

        let mut unit = String::with_capacity(512);
        unit.push_str("[Unit]\n");
        unit.push_str(&format!("Description={} Daemon\n", descriptor.service_id));
        unit.push_str("After=network.target\n");
        unit.push('\n');
        unit.push_str("[Service]\n");
        unit.push_str("Type=simple\n");
        unit.push_str(&format!("ExecStart={exec_start}\n"));
        unit.push_str(&format!("Restart={restart}\n"));
        unit.push_str("RestartSec=10\n");
        unit.push_str(&format!("StandardOutput=append:{}\n", descriptor.log_path));
        unit.push_str(&format!("StandardError=append:{}\n", descriptor.log_path));
        unit.push('\n');
        unit.push_str("[Install]\n");
        unit.push_str("WantedBy=default.target\n");
        unit
    }
}

fn parse_main_pid(stdout: &str) -> Option<u32> {
    let pid: u32 = stdout.trim().strip_prefix("MainPID=")?.parse().ok()?;
    if pid == 0 { None } else { Some(pid) }
}

impl DaemonBackend for SystemdBackend {
    fn default_config_path(&self, service_id: &str) -> String {
        self.service_path.clone().unwrap_or_else(|| {
            format!(
                "{}/.config/systemd/user/{}.service",
                home_dir().display(),
                service_id
            )
        })
    }

    fn default_log_path(&self, service_id: &str) -> String {
        let data_dir = dirs::data_dir().unwrap_or_else(home_dir);
        data_dir
            .join(service_id)
            .join("daemon.log")
            .display()
            .to_string()
    }

    fn install(&self, descriptor: &DaemonDescriptor) -> Result<()> {
        let unit_path = Path::new(&descriptor.config_path);
        if let Some(parent) = unit_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create unit directory {}", parent.display())
            })?;
        }
        fs::write(unit_path, Self::generate_unit(descriptor))
            .with_context(|| format!("Failed to write unit file {}", unit_path.display()))?;
        info!("Wrote systemd unit to {}", unit_path.display());

        // Make the user manager pick up the new unit, then register it for
        // login start. Both are safe to repeat on an installed service.
        let reload = self.runner.run(&["systemctl", "--user", "daemon-reload"])?;
        if !reload.success() {
            return Err(SvcError::native("reload the systemd user manager", reload.stderr).into());
        }

        let unit = Self::unit_name(&descriptor.service_id);
        let enable = self.runner.run(&["systemctl", "--user", "enable", &unit])?;
        if !enable.success() {
            return Err(SvcError::native(format!("enable {unit}"), enable.stderr).into());
        }

        Ok(())
    }

    fn start(&self, descriptor: &DaemonDescriptor) -> Result<Option<u32>> {
        let unit = Self::unit_name(&descriptor.service_id);
        let output = self.runner.run(&["systemctl", "--user", "start", &unit])?;
        if !output.success() {
            return Err(SvcError::native(format!("start {unit}"), output.stderr).into());
        }
        Ok(self.query_pid(&unit))
    }

    fn stop(&self, descriptor: &DaemonDescriptor) -> Result<Option<u32>> {
        let unit = Self::unit_name(&descriptor.service_id);
        // systemctl cannot report the PID of a unit that is already down, so
        // capture it before issuing the stop.
        let pid = self.query_pid(&unit);

        let output = self.runner.run(&["systemctl", "--user", "stop", &unit])?;
        if output.success() {
            Ok(pid)
        } else {
            warn!("Failed to stop daemon: {}", output.stderr);
            Ok(None)
        }
    }

    fn status(&self, descriptor: &DaemonDescriptor) -> Result<DaemonStatus> {
        let unit = Self::unit_name(&descriptor.service_id);
        let output = self
            .runner
            .run(&["systemctl", "--user", "is-active", &unit])?;
        let state = output.stdout.trim().to_string();

        if state == "active" {
            Ok(DaemonStatus {
                running: true,
                pid: self.query_pid(&unit),
                details: "Daemon is running as a systemd user service".to_string(),
                config_path: Some(descriptor.config_path.clone()),
                log_path: Some(descriptor.log_path.clone()),
            })
        } else {
            Ok(DaemonStatus {
                running: false,
                pid: None,
                details: format!("Daemon is not running (status: {state})"),
                config_path: Some(descriptor.config_path.clone()),
                log_path: Some(descriptor.log_path.clone()),
            })
        }
    }

    fn cleanup(&self, descriptor: &DaemonDescriptor) -> Result<()> {
        let unit = Self::unit_name(&descriptor.service_id);

        if let Err(e) = self.runner.run(&["systemctl", "--user", "disable", &unit]) {
            warn!("Failed to disable {unit}: {e:#}");
        }

        let unit_path = Path::new(&descriptor.config_path);
        if unit_path.exists() {
            fs::remove_file(unit_path)
                .with_context(|| format!("Failed to remove unit file {}", unit_path.display()))?;
            info!("Removed systemd unit {}", unit_path.display());
        }

        if let Err(e) = self.runner.run(&["systemctl", "--user", "daemon-reload"]) {
            warn!("Failed to reload the systemd user manager: {e:#}");
        }

        Ok(())
    }
}
