//! Service configuration loaded from a TOML file.
//!
//! The config describes the one daemon this invocation manages. A fresh
//! [`DaemonDescriptor`] is derived from it on every operation — nothing is
//! persisted between runs beyond what the native facility itself keeps.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::SvcError;
use crate::platform::{DaemonBackend, DaemonDescriptor};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Stable service identifier, e.g. "com.example.my-app".
    pub service_id: String,
    /// The runnable jar to manage.
    pub jar: PathBuf,
    /// Java installation root; falls back to $JAVA_HOME when unset.
    pub java_home: Option<String>,
    #[serde(default)]
    pub jvm_args: Vec<String>,
    #[serde(default)]
    pub app_args: Vec<String>,
    /// Restart on unexpected exit via the native facility.
    #[serde(default = "default_true")]
    pub keep_alive: bool,
    /// Where the jar is staged on install. Default: `<data dir>/<service_id>`.
    pub release_dir: Option<PathBuf>,
    /// Log destination override; else the backend's canonical location.
    pub log_file: Option<String>,
    #[serde(default)]
    pub linux: LinuxConfig,
    #[serde(default)]
    pub macos: MacosConfig,
    #[serde(default)]
    pub windows: WindowsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinuxConfig {
    /// Unit-file path override. Default: `~/.config/systemd/user/<id>.service`.
    pub service_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MacosConfig {
    /// Plist path override. Default: `~/Library/LaunchAgents/<id>.plist`.
    pub plist_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowsConfig {
    /// Copy the jar into the user's Startup folder for login start.
    #[serde(default = "default_true")]
    pub use_startup_folder: bool,
    /// Run as a proper Windows service via NSSM (requires elevation).
    /// Takes precedence over the startup folder.
    #[serde(default)]
    pub use_nssm: bool,
    /// Run as a Windows service via the WinSW wrapper.
    #[serde(default)]
    pub use_winsw: bool,
    /// Pre-provisioned nssm.exe; skips the download-and-cache path.
    pub nssm_path: Option<String>,
    /// Pre-provisioned WinSW executable to copy into the service directory.
    pub winsw_path: Option<String>,
}

impl Default for WindowsConfig {
    fn default() -> Self {
        WindowsConfig {
            use_startup_folder: true,
            use_nssm: false,
            use_winsw: false,
            nssm_path: None,
            winsw_path: None,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.service_id.trim().is_empty() {
            return Err(SvcError::EmptyServiceId.into());
        }
        Ok(())
    }

    pub fn java_home(&self) -> Result<String> {
        self.java_home
            .clone()
            .or_else(|| env::var("JAVA_HOME").ok())
            .ok_or_else(|| SvcError::MissingRuntime.into())
    }

    pub fn release_dir(&self) -> PathBuf {
        self.release_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
                .join(&self.service_id)
        })
    }

    /// The staged copy of the jar the backends act on.
    pub fn staged_jar(&self) -> Result<PathBuf> {
        let jar_name = self.jar.file_name().context("jar path has no file name")?;
        Ok(self.release_dir().join(jar_name))
    }

    /// Build the descriptor for one operation: explicit overrides win,
    /// otherwise the backend's canonical defaults apply.
    pub fn descriptor(&self, backend: &dyn DaemonBackend) -> Result<DaemonDescriptor> {
        Ok(DaemonDescriptor {
            service_id: self.service_id.clone(),
            jar_path: self.staged_jar()?,
            java_home: self.java_home()?,
            config_path: backend.default_config_path(&self.service_id),
            log_path: self
                .log_file
                .clone()
                .unwrap_or_else(|| backend.default_log_path(&self.service_id)),
            jvm_args: self.jvm_args.clone(),
            app_args: self.app_args.clone(),
            keep_alive: self.keep_alive,
        })
    }
}

#[cfg(test)]
impl Config {
    pub(crate) fn for_test(service_id: &str) -> Self {
        Config {
            service_id: service_id.to_string(),
            jar: PathBuf::from("/opt/app/test-daemon.jar"),
            java_home: Some("/usr/lib/jvm/java-21-openjdk".to_string()),
            jvm_args: Vec::new(),
            app_args: Vec::new(),
            keep_alive: true,
            release_dir: None,
            log_file: None,
            linux: LinuxConfig::default(),
            macos: MacosConfig::default(),
            windows: WindowsConfig::default(),
        }
    }
}
