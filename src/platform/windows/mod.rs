//! Windows backends: three competing service strategies.
//!
//! - startup-folder spawn: no service manager at all, the jar is launched at
//!   login and tracked by scanning the process table
//! - NSSM-wrapped service: registry-backed, requires elevation
//! - WinSW-wrapped service: XML-configured wrapper executable
//!
//! NSSM takes precedence over the startup folder when both are requested;
//! WinSW is an explicit opt-in and outranks the default-on startup folder.

pub mod nssm;
pub mod provider;
pub mod startup;
pub mod winsw;

use std::env;
use std::path::PathBuf;

use regex::Regex;

use crate::config::WindowsConfig;
use crate::platform::{DaemonBackend, home_dir};
use crate::process::CommandRunner;

pub fn select_strategy(config: &WindowsConfig) -> Box<dyn DaemonBackend> {
    if config.use_nssm {
        Box::new(nssm::NssmBackend::new(config.nssm_path.clone()))
    } else if config.use_winsw {
        Box::new(winsw::WinswBackend::new(config.winsw_path.clone()))
    } else {
        Box::new(startup::StartupFolderBackend::new(config.use_startup_folder))
    }
}

/// `%APPDATA%`, falling back to the home directory when unset.
pub(crate) fn app_data_dir() -> PathBuf {
    env::var_os("APPDATA")
        .map(PathBuf::from)
        .unwrap_or_else(home_dir)
}

pub(crate) fn java_exe(java_home: &str) -> String {
    format!("{java_home}\\bin\\java.exe")
}

/// Console-less JVM launcher, used by the startup-folder strategy so no
/// terminal window sticks around after login.
pub(crate) fn javaw_exe(java_home: &str) -> String {
    format!("{java_home}\\bin\\javaw.exe")
}

/// Service PID via `sc queryex`, shared by the NSSM and WinSW backends since
/// neither wrapper exposes the PID itself.
pub(crate) fn query_service_pid(runner: &dyn CommandRunner, service_name: &str) -> Option<u32> {
    let output = runner.run(&["sc", "queryex", service_name]).ok()?;
    if !output.success() {
        return None;
    }
    parse_sc_pid(&output.stdout)
}

/// Extract the PID from `sc queryex` output, e.g. `PID                : 1234`.
pub(crate) fn parse_sc_pid(stdout: &str) -> Option<u32> {
    let pattern = Regex::new(r"PID\s*:\s*(\d+)").ok()?;
    pattern.captures(stdout)?.get(1)?.as_str().parse().ok()
}
