//! Windows startup-folder backend.
//!
//! No service manager involved: install copies the jar into the user's
//! Startup folder so Windows launches it at login, and start spawns the
//! process directly. Because nothing tracks the process for us, stop and
//! status recover the PID by scanning the process table for the jar name.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::platform::windows::{app_data_dir, javaw_exe};
use crate::platform::{DaemonBackend, DaemonDescriptor, DaemonStatus};
use crate::process::{CommandRunner, Processes};

pub struct StartupFolderBackend {
    runner: Box<dyn CommandRunner>,
    use_startup_folder: bool,
    startup_dir: PathBuf,
}

impl StartupFolderBackend {
    pub fn new(use_startup_folder: bool) -> Self {
        Self::with_runner(Box::new(Processes), use_startup_folder)
    }

    pub fn with_runner(runner: Box<dyn CommandRunner>, use_startup_folder: bool) -> Self {
        StartupFolderBackend {
            runner,
            use_startup_folder,
            startup_dir: app_data_dir().join("Microsoft\\Windows\\Start Menu\\Programs\\Startup"),
        }
    }

    #[cfg(test)]
    fn with_startup_dir(mut self, dir: PathBuf) -> Self {
        self.startup_dir = dir;
        self
    }

    fn startup_jar(&self, descriptor: &DaemonDescriptor) -> PathBuf {
        self.startup_dir.join(descriptor.jar_name())
    }

    /// Scan the process table for a javaw process whose command line mentions
    /// the jar. The trailing whitespace-delimited token of a matching line is
    /// the PID; anything unparsable means "not found", not an error.
    fn find_pid(&self, descriptor: &DaemonDescriptor) -> Option<u32> {
        let output = self
            .runner
            .run(&[
                "wmic",
                "process",
                "where",
                "name='javaw.exe'",
                "get",
                "CommandLine,ProcessId",
            ])
            .ok()?;
        if !output.success() {
            return None;
        }
        parse_process_listing(&output.stdout, &descriptor.jar_name())
    }
}

fn parse_process_listing(listing: &str, jar_name: &str) -> Option<u32> {
    let line = listing.lines().find(|line| line.contains(jar_name))?;
    line.split_whitespace().last()?.parse().ok()
}

impl DaemonBackend for StartupFolderBackend {
    fn default_config_path(&self, _service_id: &str) -> String {
        // Nothing file-based: the copied jar itself is the registration.
        String::new()
    }

    fn default_log_path(&self, _service_id: &str) -> String {
        String::new()
    }

    fn install(&self, descriptor: &DaemonDescriptor) -> Result<()> {
        if !self.use_startup_folder {
            info!("Startup folder disabled; daemon will only run when started manually");
            return Ok(());
        }

        fs::create_dir_all(&self.startup_dir).with_context(|| {
            format!(
                "Failed to create startup folder {}",
                self.startup_dir.display()
            )
        })?;

        let destination = self.startup_jar(descriptor);
        fs::copy(&descriptor.jar_path, &destination).with_context(|| {
            format!(
                "Failed to copy {} to the startup folder",
                descriptor.jar_path.display()
            )
        })?;
        info!("Installed jar to startup folder: {}", destination.display());
        Ok(())
    }

    fn start(&self, descriptor: &DaemonDescriptor) -> Result<Option<u32>> {
        let javaw = javaw_exe(&descriptor.java_home);
        let args = descriptor.launch_args(&javaw);
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();

        let pid = self.runner.spawn(&argv)?;
        info!("Started daemon with PID {pid}");
        Ok(Some(pid))
    }

    fn stop(&self, descriptor: &DaemonDescriptor) -> Result<Option<u32>> {
        let Some(pid) = self.find_pid(descriptor) else {
            info!("No running daemon found");
            return Ok(None);
        };

        let pid_arg = pid.to_string();
        let output = self.runner.run(&["taskkill", "/PID", &pid_arg, "/F"])?;
        if output.success() {
            Ok(Some(pid))
        } else {
            warn!("Failed to kill daemon with PID {pid}: {}", output.stderr);
            Ok(None)
        }
    }

    fn status(&self, descriptor: &DaemonDescriptor) -> Result<DaemonStatus> {
        match self.find_pid(descriptor) {
            Some(pid) => Ok(DaemonStatus {
                running: true,
                pid: Some(pid),
                details: "Daemon is running".to_string(),
                config_path: None,
                log_path: None,
            }),
            None => Ok(DaemonStatus {
                running: false,
                pid: None,
                details: "Daemon is not running".to_string(),
                config_path: None,
                log_path: None,
            }),
        }
    }

    fn cleanup(&self, descriptor: &DaemonDescriptor) -> Result<()> {
        if !self.use_startup_folder {
            return Ok(());
        }
        let startup_jar = self.startup_jar(descriptor);
        if startup_jar.exists() {
            fs::remove_file(&startup_jar).with_context(|| {
                format!("Failed to remove {} from startup folder", startup_jar.display())
            })?;
            info!("Removed jar from startup folder");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::platform::testutil;
    use crate::process::mock::MockRunner;

    const WMIC_PREFIX: &[&str] = &["wmic", "process", "where", "name='javaw.exe'"];

    fn descriptor() -> DaemonDescriptor {
        let mut descriptor = testutil::descriptor("com.example.test-daemon");
        descriptor.java_home = "C:\\Java\\jdk-21".to_string();
        descriptor.jar_path = PathBuf::from("C:\\release\\test-daemon.jar");
        descriptor
    }

    #[test]
    fn path_defaults_are_empty_sentinels() {
        let backend = StartupFolderBackend::with_runner(Box::new(MockRunner::new()), true);
        assert_eq!(backend.default_config_path("svc"), "");
        assert_eq!(backend.default_log_path("svc"), "");
    }

    #[test]
    fn install_copies_jar_into_startup_folder() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("test-daemon.jar");
        fs::write(&source, b"jar bytes").unwrap();
        let startup = dir.path().join("Startup");

        let backend = StartupFolderBackend::with_runner(Box::new(MockRunner::new()), true)
            .with_startup_dir(startup.clone());
        let mut descriptor = descriptor();
        descriptor.jar_path = source;

        backend.install(&descriptor).unwrap();
        assert!(startup.join("test-daemon.jar").exists());
    }

    #[test]
    fn install_is_a_no_op_when_the_folder_is_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let startup = dir.path().join("Startup");
        let backend = StartupFolderBackend::with_runner(Box::new(MockRunner::new()), false)
            .with_startup_dir(startup.clone());

        backend.install(&descriptor()).unwrap();
        assert!(!startup.exists());
    }

    #[test]
    fn start_spawns_javaw_with_the_full_launch_argv() {
        let runner = Arc::new(MockRunner::new().with_spawn_pid(4711));
        let backend = StartupFolderBackend::with_runner(Box::new(runner.clone()), true);
        let mut descriptor = descriptor();
        descriptor.jvm_args = vec!["-Xmx256m".into()];
        descriptor.app_args = vec!["--port".into(), "8080".into()];

        let pid = backend.start(&descriptor).unwrap();
        assert_eq!(pid, Some(4711));

        let spawned = &runner.executed()[0];
        assert_eq!(
            spawned,
            &vec![
                "C:\\Java\\jdk-21\\bin\\javaw.exe".to_string(),
                "-Xmx256m".to_string(),
                "-jar".to_string(),
                "C:\\release\\test-daemon.jar".to_string(),
                "--port".to_string(),
                "8080".to_string(),
            ]
        );
    }

    #[test]
    fn stop_kills_the_pid_recovered_from_the_process_listing() {
        let listing = "CommandLine                              ProcessId\n\
                       javaw.exe -jar C:\\release\\test-daemon.jar  12345\n";
        let runner = Arc::new(
            MockRunner::new()
                .mock_success(WMIC_PREFIX, listing)
                .mock_success(&["taskkill"], ""),
        );
        let backend = StartupFolderBackend::with_runner(Box::new(runner.clone()), true);

        let pid = backend.stop(&descriptor()).unwrap();
        assert_eq!(pid, Some(12345));
        assert!(runner.was_executed(&["taskkill", "/PID", "12345", "/F"]));
    }

    #[test]
    fn stop_without_a_match_is_a_quiet_no_op() {
        let runner = Arc::new(MockRunner::new().mock_success(WMIC_PREFIX, "no match here\n"));
        let backend = StartupFolderBackend::with_runner(Box::new(runner.clone()), true);

        assert_eq!(backend.stop(&descriptor()).unwrap(), None);
        assert!(!runner.was_executed(&["taskkill"]));
    }

    #[test]
    fn status_with_non_numeric_trailing_token_is_not_running() {
        let listing = "javaw.exe -jar C:\\release\\test-daemon.jar garbage\n";
        let runner = MockRunner::new().mock_success(WMIC_PREFIX, listing);
        let backend = StartupFolderBackend::with_runner(Box::new(runner), true);

        let status = backend.status(&descriptor()).unwrap();
        assert!(!status.running);
        assert_eq!(status.pid, None);
    }

    #[test]
    fn status_ignores_wmic_failure() {
        let runner = MockRunner::new().mock_failure(WMIC_PREFIX, "wmic is deprecated");
        let backend = StartupFolderBackend::with_runner(Box::new(runner), true);

        let status = backend.status(&descriptor()).unwrap();
        assert!(!status.running);
    }

    #[test]
    fn cleanup_removes_the_copied_jar_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let startup = dir.path().to_path_buf();
        let staged = startup.join("test-daemon.jar");
        fs::write(&staged, b"jar").unwrap();

        let backend = StartupFolderBackend::with_runner(Box::new(MockRunner::new()), true)
            .with_startup_dir(startup);
        backend.cleanup(&descriptor()).unwrap();
        assert!(!staged.exists());

        backend.cleanup(&descriptor()).unwrap();
    }

    #[test]
    fn listing_parse_takes_the_trailing_token() {
        let listing = "javaw.exe -Xmx1g -jar app.jar --flag  998877\n";
        assert_eq!(parse_process_listing(listing, "app.jar"), Some(998877));
        assert_eq!(parse_process_listing(listing, "other.jar"), None);
    }
}
