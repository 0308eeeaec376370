//! NSSM-wrapped Windows service backend.
//!
//! NSSM keeps the whole registration in the service registry — there is no
//! config file to manage. Every mutating operation needs an elevated shell,
//! which is probed up front with `net session` so the operator gets an
//! actionable error instead of a cryptic tool failure.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::error::SvcError;
use crate::platform::windows::{app_data_dir, java_exe, provider::NssmProvider, query_service_pid};
use crate::platform::{DaemonBackend, DaemonDescriptor, DaemonStatus};
use crate::process::{CommandRunner, Processes};

pub struct NssmBackend {
    runner: Box<dyn CommandRunner>,
    nssm_path: Option<String>,
    provider: NssmProvider,
    skip_elevation_check: bool,
}

impl NssmBackend {
    pub fn new(nssm_path: Option<String>) -> Self {
        Self::with_runner(Box::new(Processes), nssm_path)
    }

    pub fn with_runner(runner: Box<dyn CommandRunner>, nssm_path: Option<String>) -> Self {
        NssmBackend {
            runner,
            nssm_path,
            provider: NssmProvider::new(),
            skip_elevation_check: false,
        }
    }

    #[cfg(test)]
    fn without_elevation_check(mut self) -> Self {
        self.skip_elevation_check = true;
        self
    }

    /// `net session` only succeeds in an elevated shell.
    fn ensure_elevated(&self, operation: &str) -> Result<()> {
        if self.skip_elevation_check {
            return Ok(());
        }
        let probe = self.runner.run(&["net", "session"])?;
        if !probe.success() {
            return Err(SvcError::PrivilegeRequired {
                operation: operation.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn resolve_nssm(&self) -> Result<String> {
        if let Some(path) = &self.nssm_path {
            return Ok(path.clone());
        }
        Ok(self.provider.resolve()?.display().to_string())
    }

    fn set(&self, nssm: &str, service_name: &str, parameter: &str, values: &[&str]) -> Result<()> {
        let mut argv = vec![nssm, "set", service_name, parameter];
        argv.extend_from_slice(values);
        self.runner.run(&argv)?;
        Ok(())
    }
}

/// NSSM registers under the sanitized name: dots become underscores and
/// anything outside `[A-Za-z0-9_-]` is dropped.
pub(crate) fn sanitize_service_name(service_id: &str) -> String {
    service_id
        .chars()
        .map(|c| if c == '.' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

impl DaemonBackend for NssmBackend {
    fn default_config_path(&self, _service_id: &str) -> String {
        // Configuration lives in the Windows service registry.
        String::new()
    }

    fn default_log_path(&self, service_id: &str) -> String {
        format!("{}\\{}\\daemon.log", app_data_dir().display(), service_id)
    }

    fn install(&self, descriptor: &DaemonDescriptor) -> Result<()> {
        self.ensure_elevated("install the Windows service")?;

        let nssm = self.resolve_nssm()?;
        let service_name = sanitize_service_name(&descriptor.service_id);
        let java = java_exe(&descriptor.java_home);

        let installed = self
            .runner
            .run(&[&nssm, "install", &service_name, &java])?;
        if !installed.success() {
            return Err(SvcError::native(
                format!("install NSSM service {service_name}"),
                installed.stderr,
            )
            .into());
        }

        let app_directory = descriptor
            .jar_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .display()
            .to_string();
        self.set(&nssm, &service_name, "AppDirectory", &[&app_directory])?;

        // Everything after the executable goes into one space-joined
        // AppParameters value.
        let mut parameters = descriptor.jvm_args.clone();
        parameters.push("-jar".to_string());
        parameters.push(descriptor.jar_path.display().to_string());
        parameters.extend(descriptor.app_args.iter().cloned());
        let parameters = parameters.join(" ");
        self.set(&nssm, &service_name, "AppParameters", &[&parameters])?;

        if !descriptor.log_path.is_empty() {
            if let Some(parent) = Path::new(&descriptor.log_path).parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory {}", parent.display())
                })?;
            }
            self.set(&nssm, &service_name, "AppStdout", &[&descriptor.log_path])?;
            self.set(&nssm, &service_name, "AppStderr", &[&descriptor.log_path])?;
            // Creation disposition 4 = open for appending.
            self.set(&nssm, &service_name, "AppStdoutCreationDisposition", &["4"])?;
            self.set(&nssm, &service_name, "AppStderrCreationDisposition", &["4"])?;
        }

        if descriptor.keep_alive {
            self.set(&nssm, &service_name, "AppExit", &["Default", "Restart"])?;
            self.set(&nssm, &service_name, "AppRestartDelay", &["5000"])?;
        } else {
            self.set(&nssm, &service_name, "AppExit", &["Default", "Exit"])?;
        }

        self.set(&nssm, &service_name, "Start", &["SERVICE_AUTO_START"])?;
        self.set(&nssm, &service_name, "DisplayName", &[&descriptor.service_id])?;
        self.set(
            &nssm,
            &service_name,
            "Description",
            &["Daemon service managed by svcman"],
        )?;

        info!("Installed NSSM service: {service_name}");
        Ok(())
    }

    fn start(&self, descriptor: &DaemonDescriptor) -> Result<Option<u32>> {
        self.ensure_elevated("start the Windows service")?;

        let nssm = self.resolve_nssm()?;
        let service_name = sanitize_service_name(&descriptor.service_id);

        let output = self.runner.run(&[&nssm, "start", &service_name])?;
        if !output.success() {
            return Err(SvcError::native(
                format!("start NSSM service {service_name}"),
                output.stderr,
            )
            .into());
        }

        info!("Started NSSM service: {service_name}");
        Ok(query_service_pid(self.runner.as_ref(), &service_name))
    }

    fn stop(&self, descriptor: &DaemonDescriptor) -> Result<Option<u32>> {
        self.ensure_elevated("stop the Windows service")?;

        let nssm = self.resolve_nssm()?;
        let service_name = sanitize_service_name(&descriptor.service_id);
        // NSSM cannot report the PID once the service is down.
        let pid = query_service_pid(self.runner.as_ref(), &service_name);

        let output = self.runner.run(&[&nssm, "stop", &service_name])?;
        if output.success() {
            info!("Stopped NSSM service: {service_name}");
            Ok(pid)
        } else {
            warn!("Failed to stop NSSM service: {}", output.stderr);
            Ok(None)
        }
    }

    fn status(&self, descriptor: &DaemonDescriptor) -> Result<DaemonStatus> {
        let nssm = self.resolve_nssm()?;
        let service_name = sanitize_service_name(&descriptor.service_id);

        let output = self.runner.run(&[&nssm, "status", &service_name])?;
        let status_output = output.stdout.trim().to_string();
        let lowercase = status_output.to_lowercase();

        let running = status_output.contains("SERVICE_RUNNING");
        let stopped = status_output.contains("SERVICE_STOPPED")
            || status_output.contains("SERVICE_PAUSED")
            || lowercase.contains("doesn't exist");

        let details = if running {
            "Service is running".to_string()
        } else if lowercase.contains("doesn't exist") {
            "Service is not installed".to_string()
        } else if stopped {
            "Service is stopped".to_string()
        } else if !output.success() {
            format!("Failed to get status: {}", output.stderr)
        } else {
            format!("Status: {status_output}")
        };

        let pid = if running {
            query_service_pid(self.runner.as_ref(), &service_name)
        } else {
            None
        };

        Ok(DaemonStatus {
            running,
            pid,
            details,
            config_path: None,
            log_path: (!descriptor.log_path.is_empty()).then(|| descriptor.log_path.clone()),
        })
    }

    fn cleanup(&self, descriptor: &DaemonDescriptor) -> Result<()> {
        self.ensure_elevated("remove the Windows service")?;

        let nssm = self.resolve_nssm()?;
        let service_name = sanitize_service_name(&descriptor.service_id);

        // confirm bypasses the interactive prompt.
        let output = self
            .runner
            .run(&[&nssm, "remove", &service_name, "confirm"])?;
        if output.success() {
            info!("Removed NSSM service: {service_name}");
        } else {
            let combined = format!("{} {}", output.stdout, output.stderr).to_lowercase();
            if !combined.contains("doesn't exist") {
                warn!("Failed to remove NSSM service: {}", output.stderr);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::platform::testutil;
    use crate::process::mock::MockRunner;

    const NSSM: &str = "C:\\tools\\nssm.exe";

    fn backend(runner: Arc<MockRunner>) -> NssmBackend {
        NssmBackend::with_runner(Box::new(runner), Some(NSSM.to_string()))
            .without_elevation_check()
    }

    fn descriptor() -> DaemonDescriptor {
        let mut descriptor = testutil::descriptor("com.example.my-app.daemon");
        descriptor.java_home = "C:\\Java\\jdk-21".to_string();
        descriptor.jar_path = PathBuf::from("C:\\release\\my-app.jar");
        descriptor
    }

    #[test]
    fn service_names_are_sanitized() {
        assert_eq!(
            sanitize_service_name("com.example.my-app.daemon"),
            "com_example_my-app_daemon"
        );
        assert_eq!(sanitize_service_name("plain"), "plain");
        assert_eq!(sanitize_service_name("we ird$chars!"), "weirdchars");
    }

    #[test]
    fn mutating_operations_require_elevation() {
        let runner = MockRunner::new().mock_failure(&["net", "session"], "Access is denied.");
        let backend =
            NssmBackend::with_runner(Box::new(runner), Some(NSSM.to_string()));

        let err = backend.install(&descriptor()).unwrap_err();
        assert!(err.to_string().contains("administrator privileges"));
    }

    #[test]
    fn install_registers_and_configures_under_the_sanitized_name() {
        let runner = Arc::new(MockRunner::new());
        let backend = backend(runner.clone());

        backend.install(&descriptor()).unwrap();

        let name = "com_example_my-app_daemon";
        assert!(runner.was_executed(&[
            NSSM,
            "install",
            name,
            "C:\\Java\\jdk-21\\bin\\java.exe",
        ]));
        assert!(runner.was_executed(&[NSSM, "set", name, "AppDirectory"]));
        assert!(runner.was_executed(&[
            NSSM,
            "set",
            name,
            "AppParameters",
            "-jar C:\\release\\my-app.jar",
        ]));
        assert!(runner.was_executed(&[NSSM, "set", name, "AppExit", "Default", "Restart"]));
        assert!(runner.was_executed(&[NSSM, "set", name, "AppRestartDelay", "5000"]));
        assert!(runner.was_executed(&[NSSM, "set", name, "Start", "SERVICE_AUTO_START"]));
        assert!(runner.was_executed(&[
            NSSM,
            "set",
            name,
            "DisplayName",
            "com.example.my-app.daemon",
        ]));

        // Every nssm invocation targets the sanitized service name.
        for command in runner.executed() {
            if command[0] == NSSM {
                assert_eq!(command[2], name, "unsanitized name in {command:?}");
            }
        }
    }

    #[test]
    fn install_without_keep_alive_sets_exit_action_exit() {
        let runner = Arc::new(MockRunner::new());
        let backend = backend(runner.clone());
        let mut descriptor = descriptor();
        descriptor.keep_alive = false;

        backend.install(&descriptor).unwrap();

        let name = "com_example_my-app_daemon";
        assert!(runner.was_executed(&[NSSM, "set", name, "AppExit", "Default", "Exit"]));
        assert!(!runner.was_executed(&[NSSM, "set", name, "AppRestartDelay"]));
    }

    #[test]
    fn install_with_log_path_configures_appending_redirection() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(MockRunner::new());
        let backend = backend(runner.clone());
        let mut descriptor = descriptor();
        descriptor.log_path = dir.path().join("logs").join("daemon.log").display().to_string();

        backend.install(&descriptor).unwrap();

        let name = "com_example_my-app_daemon";
        assert!(runner.was_executed(&[NSSM, "set", name, "AppStdout", &descriptor.log_path]));
        assert!(runner.was_executed(&[NSSM, "set", name, "AppStderr", &descriptor.log_path]));
        assert!(runner.was_executed(&[NSSM, "set", name, "AppStdoutCreationDisposition", "4"]));
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn install_failure_is_fatal_with_native_stderr() {
        let runner = Arc::new(
            MockRunner::new().mock_failure(&[NSSM, "install"], "The service already exists?"),
        );
        let backend = backend(runner);

        let err = backend.install(&descriptor()).unwrap_err();
        assert!(err.to_string().contains("The service already exists?"));
    }

    #[test]
    fn start_recovers_pid_through_sc_queryex() {
        let runner = Arc::new(
            MockRunner::new()
                .mock_success(&[NSSM, "start"], "")
                .mock_success(&["sc", "queryex"], "        PID                : 4321\n"),
        );
        let backend = backend(runner);

        assert_eq!(backend.start(&descriptor()).unwrap(), Some(4321));
    }

    #[test]
    fn start_failure_is_fatal() {
        let runner =
            Arc::new(MockRunner::new().mock_failure(&[NSSM, "start"], "Logon failure"));
        let backend = backend(runner);

        let err = backend.start(&descriptor()).unwrap_err();
        assert!(err.to_string().contains("Logon failure"));
    }

    #[test]
    fn stop_captures_the_pid_before_stopping() {
        let runner = Arc::new(
            MockRunner::new()
                .mock_success(&["sc", "queryex"], "PID : 777\n")
                .mock_success(&[NSSM, "stop"], ""),
        );
        let backend = backend(runner);

        assert_eq!(backend.stop(&descriptor()).unwrap(), Some(777));
    }

    #[test]
    fn stop_failure_is_non_fatal() {
        let runner = Arc::new(MockRunner::new().mock_failure(&[NSSM, "stop"], "whoops"));
        let backend = backend(runner);

        assert_eq!(backend.stop(&descriptor()).unwrap(), None);
    }

    #[test]
    fn status_maps_the_running_token() {
        let runner = Arc::new(
            MockRunner::new()
                .mock_success(&[NSSM, "status"], "SERVICE_RUNNING\n")
                .mock_success(&["sc", "queryex"], "PID : 99\n"),
        );
        let backend = backend(runner);

        let status = backend.status(&descriptor()).unwrap();
        assert!(status.running);
        assert_eq!(status.pid, Some(99));
        assert_eq!(status.details, "Service is running");
    }

    #[test]
    fn status_maps_stopped_and_missing_services() {
        let stopped = Arc::new(MockRunner::new().mock_success(&[NSSM, "status"], "SERVICE_STOPPED\n"));
        let status = backend(stopped).status(&descriptor()).unwrap();
        assert!(!status.running);
        assert_eq!(status.details, "Service is stopped");

        let missing = Arc::new(MockRunner::new().mock_command(
            &[NSSM, "status"],
            3,
            "Service com_example_my-app_daemon doesn't exist!\n",
            "",
        ));
        let status = backend(missing).status(&descriptor()).unwrap();
        assert!(!status.running);
        assert_eq!(status.details, "Service is not installed");
        assert_eq!(status.pid, None);
    }

    #[test]
    fn status_surfaces_unrecognized_output() {
        let runner =
            Arc::new(MockRunner::new().mock_success(&[NSSM, "status"], "SERVICE_START_PENDING\n"));
        let status = backend(runner).status(&descriptor()).unwrap();
        assert!(!status.running);
        assert!(status.details.contains("SERVICE_START_PENDING"));
    }

    #[test]
    fn cleanup_treats_missing_service_as_success() {
        let runner = Arc::new(MockRunner::new().mock_command(
            &[NSSM, "remove"],
            3,
            "",
            "Service com_example_my-app_daemon doesn't exist!\n",
        ));
        let backend = backend(runner.clone());

        backend.cleanup(&descriptor()).unwrap();
        assert!(runner.was_executed(&[NSSM, "remove", "com_example_my-app_daemon", "confirm"]));
    }
}
