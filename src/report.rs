//! Operator-facing status and log rendering.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::platform::DaemonStatus;

pub fn render_status(service_id: &str, status: &DaemonStatus) -> String {
    let mut out = String::new();
    out.push_str("Daemon Status:\n");
    out.push_str(&format!("  Service ID: {service_id}\n"));
    out.push_str(&format!(
        "  Running: {}\n",
        if status.running { "Yes" } else { "No" }
    ));
    if let Some(pid) = status.pid {
        out.push_str(&format!("  PID: {pid}\n"));
    }
    if let Some(config_path) = &status.config_path {
        out.push_str(&format!("  Config: {config_path}\n"));
    }
    if let Some(log_path) = &status.log_path {
        out.push_str(&format!("  Logs: {log_path}\n"));
    }
    if !status.details.is_empty() {
        out.push_str(&format!("  Details: {}", status.details));
        out.push('\n');
    }
    out
}

/// The resolved log file, whole or just its tail. Backends without a managed
/// log and logs that have not been written yet get a friendly message
/// instead of an error.
pub fn render_logs(status: &DaemonStatus, lines: Option<usize>) -> Result<String> {
    let Some(log_path) = status.log_path.as_deref().filter(|p| !p.is_empty()) else {
        return Ok("No log file path available\n".to_string());
    };

    let path = Path::new(log_path);
    if !path.exists() {
        return Ok(format!("Log file does not exist: {log_path}\n"));
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read log file {log_path}"))?;

    let mut out = format!("Daemon logs ({log_path}):\n\n");
    for line in tail(&content, lines) {
        out.push_str(line);
        out.push('\n');
    }
    Ok(out)
}

fn tail(content: &str, lines: Option<usize>) -> Vec<&str> {
    let all: Vec<&str> = content.lines().collect();
    match lines {
        Some(n) => all[all.len().saturating_sub(n)..].to_vec(),
        None => all,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::DaemonStatus;

    fn status(running: bool, pid: Option<u32>) -> DaemonStatus {
        DaemonStatus {
            running,
            pid,
            details: "Daemon is running".to_string(),
            config_path: Some("/etc/app.service".to_string()),
            log_path: None,
        }
    }

    #[test]
    fn status_block_lists_only_known_fields() {
        let rendered = render_status("com.example.app", &status(true, Some(4711)));
        assert!(rendered.contains("Service ID: com.example.app"));
        assert!(rendered.contains("Running: Yes"));
        assert!(rendered.contains("PID: 4711"));
        assert!(rendered.contains("Config: /etc/app.service"));
        assert!(!rendered.contains("Logs:"));
    }

    #[test]
    fn status_block_omits_absent_pid() {
        let rendered = render_status("com.example.app", &status(false, None));
        assert!(rendered.contains("Running: No"));
        assert!(!rendered.contains("PID:"));
    }

    #[test]
    fn logs_without_a_path_are_a_friendly_message() {
        let rendered = render_logs(&status(false, None), None).unwrap();
        assert_eq!(rendered, "No log file path available\n");
    }

    #[test]
    fn logs_with_missing_file_point_at_the_path() {
        let mut s = status(false, None);
        s.log_path = Some("/no/such/daemon.log".to_string());
        let rendered = render_logs(&s, None).unwrap();
        assert!(rendered.contains("does not exist"));
        assert!(rendered.contains("/no/such/daemon.log"));
    }

    #[test]
    fn logs_tail_keeps_the_last_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("daemon.log");
        std::fs::write(&log, "one\ntwo\nthree\n").unwrap();

        let mut s = status(true, None);
        s.log_path = Some(log.display().to_string());

        let rendered = render_logs(&s, Some(2)).unwrap();
        assert!(!rendered.contains("one"));
        assert!(rendered.contains("two\nthree\n"));

        let rendered = render_logs(&s, None).unwrap();
        assert!(rendered.contains("one\ntwo\nthree\n"));
    }

    #[test]
    fn tail_handles_short_files() {
        assert_eq!(tail("a\nb\n", Some(10)), vec!["a", "b"]);
        assert_eq!(tail("", Some(2)), Vec::<&str>::new());
    }
}
