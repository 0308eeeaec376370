//! LaunchAgent backend (macOS).
//!
//! Install only writes the plist; registration with launchd happens at start
//! time via `launchctl load`. PID recovery scans `launchctl list` output,
//! whose leading column is the PID (or `-` for a loaded-but-idle agent).

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use plist::Value;

use crate::error::SvcError;
use crate::platform::{DaemonBackend, DaemonDescriptor, DaemonStatus, home_dir};
use crate::process::{CommandRunner, Processes};

/// launchctl exit code for "service not loaded", treated as a clean stop.
const NOT_LOADED_EXIT: i32 = 3;

/// Registration propagates asynchronously after `launchctl load`; wait this
/// long before querying the listing for a PID.
const START_SETTLE: Duration = Duration::from_millis(500);

pub struct LaunchdBackend {
    runner: Box<dyn CommandRunner>,
    plist_path: Option<String>,
    settle: Duration,
}

impl LaunchdBackend {
    pub fn new(plist_path: Option<String>) -> Self {
        Self::with_runner(Box::new(Processes), plist_path)
    }

    pub fn with_runner(runner: Box<dyn CommandRunner>, plist_path: Option<String>) -> Self {
        LaunchdBackend {
            runner,
            plist_path,
            settle: START_SETTLE,
        }
    }

    #[cfg(test)]
    fn without_settle(mut self) -> Self {
        self.settle = Duration::ZERO;
        self
    }

    /// Scan `launchctl list` for the service line; the first
    /// whitespace-delimited token is the PID when numeric.
    fn find_pid(&self, service_id: &str) -> Option<u32> {
        let output = self.runner.run(&["launchctl", "list"]).ok()?;
        parse_listing_pid(&output.stdout, service_id)
    }

    fn generate_plist(descriptor: &DaemonDescriptor) -> Result<Vec<u8>> {
        let java_exe = format!("{}/bin/java", descriptor.java_home);
        let program_arguments: Vec<Value> = descriptor
            .launch_args(&java_exe)
            .into_iter()
            .map(Value::String)
            .collect();

        let mut dict = plist::Dictionary::new();
        dict.insert(
            "Label".to_string(),
            Value::String(descriptor.service_id.clone()),
        );
        dict.insert(
            "ProgramArguments".to_string(),
            Value::Array(program_arguments),
        );
        dict.insert(
            "StandardOutPath".to_string(),
            Value::String(descriptor.log_path.clone()),
        );
        dict.insert(
            "StandardErrorPath".to_string(),
            Value::String(descriptor.log_path.clone()),
        );
        dict.insert("KeepAlive".to_string(), Value::Boolean(descriptor.keep_alive));

        let mut buf = Vec::new();
        plist::to_writer_xml(&mut buf, &Value::Dictionary(dict))
            .context("Failed to serialize launchd plist")?;
        Ok(buf)
    }
}

fn parse_listing_pid(listing: &str, service_id: &str) -> Option<u32> {
    let line = listing.lines().find(|line| line.contains(service_id))?;
    line.split_whitespace().next()?.parse().ok()
}

impl DaemonBackend for LaunchdBackend {
    fn default_config_path(&self, service_id: &str) -> String {
        self.plist_path.clone().unwrap_or_else(|| {
            format!(
                "{}/Library/LaunchAgents/{}.plist",
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
        let plist_path = Path::new(&descriptor.config_path);
        if let Some(parent) = plist_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create LaunchAgents directory {}", parent.display())
            })?;
        }
        fs::write(plist_path, Self::generate_plist(descriptor)?)
            .with_context(|| format!("Failed to write plist {}", plist_path.display()))?;
        info!("Wrote LaunchAgent plist to {}", plist_path.display());
        Ok(())
    }

    fn start(&self, descriptor: &DaemonDescriptor) -> Result<Option<u32>> {
        let output = self
            .runner
            .run(&["launchctl", "load", &descriptor.config_path])?;
        if !output.success() {
            return Err(SvcError::native(
                format!("load {}", descriptor.config_path),
                output.stderr,
            )
            .into());
        }

        thread::sleep(self.settle);
        Ok(self.find_pid(&descriptor.service_id))
    }

    fn stop(&self, descriptor: &DaemonDescriptor) -> Result<Option<u32>> {
        let output = self
            .runner
            .run(&["launchctl", "unload", &descriptor.config_path])?;
        if output.success() || output.exit_code == NOT_LOADED_EXIT {
            info!("Unloaded LaunchAgent {}", descriptor.service_id);
        } else {
            warn!("Failed to stop daemon: {}", output.stderr);
        }
        Ok(None)
    }

    fn status(&self, descriptor: &DaemonDescriptor) -> Result<DaemonStatus> {
        let output = self.runner.run(&["launchctl", "list"])?;
        let listed = output
            .stdout
            .lines()
            .any(|line| line.contains(&descriptor.service_id));

        if listed {
            Ok(DaemonStatus {
                running: true,
                pid: parse_listing_pid(&output.stdout, &descriptor.service_id),
                details: "Daemon is running as a LaunchAgent".to_string(),
                config_path: Some(descriptor.config_path.clone()),
                log_path: Some(descriptor.log_path.clone()),
            })
        } else {
            Ok(DaemonStatus {
                running: false,
                pid: None,
                details: "Daemon is not running".to_string(),
                config_path: Some(descriptor.config_path.clone()),
                log_path: Some(descriptor.log_path.clone()),
            })
        }
    }

    fn cleanup(&self, descriptor: &DaemonDescriptor) -> Result<()> {
        let plist_path = Path::new(&descriptor.config_path);
        if plist_path.exists() {
            fs::remove_file(plist_path)
                .with_context(|| format!("Failed to remove plist {}", plist_path.display()))?;
            info!("Removed LaunchAgent plist {}", plist_path.display());
        }
        Ok(())
    }
}
