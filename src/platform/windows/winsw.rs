//! WinSW-wrapped Windows service backend.
//!
//! Everything for one service lives in a per-service directory under
//! `%APPDATA%`: the wrapper executable (renamed to `<service_id>.exe`), the
//! XML descriptor beside it, and the wrapper's rolling log files. WinSW
//! discovers the XML by its matching file name, so install never passes a
//! config path on the command line.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::{info, warn};

use crate::error::SvcError;
use crate::platform::windows::{app_data_dir, java_exe, query_service_pid};
use crate::platform::{DaemonBackend, DaemonDescriptor, DaemonStatus};
use crate::process::{CommandRunner, Processes};

pub const WINSW_VERSION: &str = "3.0.0-alpha.11";

/// Native service state propagates asynchronously; wait this long after a
/// start before querying the PID, and after a stop before uninstalling.
const SETTLE: Duration = Duration::from_millis(500);

fn download_url(version: &str) -> String {
    format!("https://github.com/winsw/winsw/releases/download/v{version}/WinSW-x64.exe")
}

pub struct WinswBackend {
    runner: Box<dyn CommandRunner>,
    winsw_path: Option<String>,
    version: String,
    settle: Duration,
}

impl WinswBackend {
    pub fn new(winsw_path: Option<String>) -> Self {
        Self::with_runner(Box::new(Processes), winsw_path)
    }

    pub fn with_runner(runner: Box<dyn CommandRunner>, winsw_path: Option<String>) -> Self {
        WinswBackend {
            runner,
            winsw_path,
            version: WINSW_VERSION.to_string(),
            settle: SETTLE,
        }
    }

    #[cfg(test)]
    fn without_settle(mut self) -> Self {
        self.settle = Duration::ZERO;
        self
    }

    /// The wrapper executable sits beside the XML, named after the service.
    fn wrapper_exe(descriptor: &DaemonDescriptor) -> PathBuf {
        let service_dir = Path::new(&descriptor.config_path)
            .parent()
            .unwrap_or_else(|| Path::new("."));
        service_dir.join(format!("{}.exe", descriptor.service_id))
    }

    /// Copy a user-supplied wrapper in, or download the pinned release, but
    /// only when the target executable is not already in place.
    fn materialize_wrapper(&self, descriptor: &DaemonDescriptor) -> Result<PathBuf> {
        let target = Self::wrapper_exe(descriptor);

        if let Some(supplied) = &self.winsw_path {
            let supplied_path = Path::new(supplied);
            if supplied_path.exists() {
                if !target.exists() || supplied_path != target.as_path() {
                    fs::copy(supplied_path, &target).with_context(|| {
                        format!("Failed to copy WinSW executable to {}", target.display())
                    })?;
                }
                return Ok(target);
            }
            warn!("Specified WinSW executable not found: {supplied}, will download instead");
        }

        if !target.exists() {
            let url = download_url(&self.version);
            info!("Downloading WinSW from {url}...");
            let bytes = reqwest::blocking::get(&url)
                .and_then(|response| response.error_for_status())
                .with_context(|| format!("Failed to download WinSW from {url}"))?
                .bytes()
                .with_context(|| format!("Failed to read WinSW executable from {url}"))?;
            fs::write(&target, &bytes)
                .with_context(|| format!("Failed to write {}", target.display()))?;
            info!("Downloaded WinSW to {}", target.display());
        }

        Ok(target)
    }

    fn generate_config(descriptor: &DaemonDescriptor) -> String {
        let mut arguments = descriptor.jvm_args.clone();
        arguments.push("-jar".to_string());
        arguments.push(descriptor.jar_path.display().to_string());
        arguments.extend(descriptor.app_args.iter().cloned());
        let arguments = arguments
            .into_iter()
            .map(|arg| {
                if arg.contains(char::is_whitespace) {
                    format!("\"{arg}\"")
                } else {
                    arg
                }
            })
            .collect::<Vec<_>>()
            .join(" ");

        let mut xml = String::with_capacity(512);
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<service>\n");
        xml.push_str(&format!("  <id>{}</id>\n", descriptor.service_id));
        xml.push_str(&format!("  <name>{}</name>\n", descriptor.service_id));
        xml.push_str(&format!(
            "  <description>{} Daemon Service</description>\n",
            descriptor.service_id
        ));
        xml.push_str(&format!(
            "  <executable>{}</executable>\n",
            java_exe(&descriptor.java_home)
        ));
        xml.push_str(&format!("  <arguments>{arguments}</arguments>\n"));
        xml.push_str("  <log mode=\"roll\">\n");
        xml.push_str("  </log>\n");
        if descriptor.keep_alive {
            xml.push_str("  <onfailure action=\"restart\" delay=\"10 sec\"/>\n");
            xml.push_str("  <onfailure action=\"restart\" delay=\"20 sec\"/>\n");
            xml.push_str("  <resetfailure>1 day</resetfailure>\n");
        }
        xml.push_str("</service>\n");
        xml
    }
}

fn mentions(output: &crate::process::CommandOutput, needle: &str) -> bool {
    output.stdout.contains(needle) || output.stderr.contains(needle)
}

impl DaemonBackend for WinswBackend {
    fn default_config_path(&self, service_id: &str) -> String {
        format!(
            "{}\\{}\\{}.xml",
            app_data_dir().display(),
            service_id,
            service_id
        )
    }

    fn default_log_path(&self, service_id: &str) -> String {
        // WinSW writes <id>.out.log / <id>.err.log next to the wrapper.
        format!(
            "{}\\{}\\{}.out.log",
            app_data_dir().display(),
            service_id,
            service_id
        )
    }

    fn install(&self, descriptor: &DaemonDescriptor) -> Result<()> {
        let xml_path = Path::new(&descriptor.config_path);
        if let Some(parent) = xml_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create service directory {}", parent.display())
            })?;
        }

        let wrapper = self.materialize_wrapper(descriptor)?;
        let wrapper = wrapper.display().to_string();
        info!("Using WinSW executable: {wrapper}");

        fs::write(xml_path, Self::generate_config(descriptor))
            .with_context(|| format!("Failed to write WinSW config {}", xml_path.display()))?;
        info!("Generated WinSW configuration: {}", xml_path.display());

        let output = self.runner.run(&[&wrapper, "install"])?;
        if output.success() {
            info!("Installed Windows service via WinSW");
        } else if mentions(&output, "already exists") {
            info!("Windows service already installed, configuration updated");
        } else {
            return Err(SvcError::native(
                format!("install WinSW service {}", descriptor.service_id),
                output.stderr,
            )
            .into());
        }
        Ok(())
    }

    fn start(&self, descriptor: &DaemonDescriptor) -> Result<Option<u32>> {
        let wrapper = Self::wrapper_exe(descriptor);
        if !wrapper.exists() {
            bail!(
                "WinSW executable not found at {}. Run install first",
                wrapper.display()
            );
        }
        let wrapper = wrapper.display().to_string();

        let output = self.runner.run(&[&wrapper, "start"])?;
        if output.success() {
            info!("Started Windows service via WinSW");
            thread::sleep(self.settle);
        } else if mentions(&output, "already started") {
            info!("Windows service is already running");
        } else {
            return Err(SvcError::native(
                format!("start WinSW service {}", descriptor.service_id),
                output.stderr,
            )
            .into());
        }

        Ok(query_service_pid(self.runner.as_ref(), &descriptor.service_id))
    }

    fn stop(&self, descriptor: &DaemonDescriptor) -> Result<Option<u32>> {
        let wrapper = Self::wrapper_exe(descriptor);
        if !wrapper.exists() {
            warn!("WinSW executable not found at {}", wrapper.display());
            return Ok(None);
        }
        let wrapper = wrapper.display().to_string();

        let pid = query_service_pid(self.runner.as_ref(), &descriptor.service_id);
        let output = self.runner.run(&[&wrapper, "stop"])?;
        if output.success() {
            info!("Stopped Windows service via WinSW");
            Ok(pid)
        } else if mentions(&output, "not running") {
            info!("Windows service is not running");
            Ok(None)
        } else {
            warn!("Failed to stop service: {}", output.stderr);
            Ok(None)
        }
    }

    fn status(&self, descriptor: &DaemonDescriptor) -> Result<DaemonStatus> {
        let wrapper = Self::wrapper_exe(descriptor);
        if !wrapper.exists() {
            return Ok(DaemonStatus {
                running: false,
                pid: None,
                details: format!(
                    "WinSW not installed (executable not found at {})",
                    wrapper.display()
                ),
                config_path: Some(descriptor.config_path.clone()),
                log_path: Some(descriptor.log_path.clone()),
            });
        }
        let wrapper = wrapper.display().to_string();

        let output = self.runner.run(&[&wrapper, "status"])?;
        let token = output.stdout.trim().to_string();
        let running = output.success() && token.eq_ignore_ascii_case("Started");

        if running {
            Ok(DaemonStatus {
                running: true,
                pid: query_service_pid(self.runner.as_ref(), &descriptor.service_id),
                details: "Windows service is running via WinSW".to_string(),
                config_path: Some(descriptor.config_path.clone()),
                log_path: Some(descriptor.log_path.clone()),
            })
        } else {
            Ok(DaemonStatus {
                running: false,
                pid: None,
                details: format!("Windows service is not running (status: {token})"),
                config_path: Some(descriptor.config_path.clone()),
                log_path: Some(descriptor.log_path.clone()),
            })
        }
    }

    fn cleanup(&self, descriptor: &DaemonDescriptor) -> Result<()> {
        let wrapper = Self::wrapper_exe(descriptor);
        let xml_path = Path::new(&descriptor.config_path);

        if wrapper.exists() {
            let wrapper_arg = wrapper.display().to_string();

            info!("Stopping service before uninstall...");
            if let Err(e) = self.runner.run(&[&wrapper_arg, "stop"]) {
                warn!("Failed to stop service before uninstall: {e:#}");
            }
            thread::sleep(self.settle);

            let output = self.runner.run(&[&wrapper_arg, "uninstall"])?;
            if output.success() {
                info!("Uninstalled Windows service via WinSW");
            } else {
                warn!("WinSW uninstall failed: {}", output.stderr);
                // Last resort: have the service control manager delete the
                // registration directly.
                let forced = self
                    .runner
                    .run(&["sc.exe", "delete", &descriptor.service_id])?;
                if forced.success() {
                    info!("Deleted service via sc.exe");
                } else {
                    warn!("Failed to delete service via sc.exe: {}", forced.stderr);
                }
            }

            if let Err(e) = fs::remove_file(&wrapper) {
                warn!("Failed to delete WinSW executable (may be in use): {e}");
            } else {
                info!("Removed WinSW executable: {}", wrapper.display());
            }

            if let Some(service_dir) = xml_path.parent() {
                for suffix in ["out.log", "err.log", "wrapper.log"] {
                    let log_file =
                        service_dir.join(format!("{}.{suffix}", descriptor.service_id));
                    if log_file.exists() && fs::remove_file(&log_file).is_ok() {
                        info!("Removed log file: {}", log_file.display());
                    }
                }
            }
        }

        if xml_path.exists() {
            fs::remove_file(xml_path)
                .with_context(|| format!("Failed to remove {}", xml_path.display()))?;
            info!("Removed WinSW configuration: {}", xml_path.display());
        }

        Ok(())
    }
}
