//! Composition of backend primitives into the operator-facing operations.
//!
//! The orchestrator never branches on the OS — it only sees the
//! [`DaemonBackend`] trait — and it never wraps or swallows backend errors:
//! a start failure after a stop surfaces directly.

use std::fs;

use anyhow::{Context, Result};
use log::info;

use crate::config::Config;
use crate::platform::{DaemonBackend, DaemonDescriptor};

/// Stage the jar into the release directory, register the service with the
/// native facility, and start it. Returns the started PID when known.
pub fn install(backend: &dyn DaemonBackend, config: &Config) -> Result<Option<u32>> {
    let descriptor = config.descriptor(backend)?;

    let release_dir = config.release_dir();
    fs::create_dir_all(&release_dir).with_context(|| {
        format!("Failed to create release directory {}", release_dir.display())
    })?;
    fs::copy(&config.jar, &descriptor.jar_path).with_context(|| {
        format!(
            "Failed to copy {} to {}",
            config.jar.display(),
            descriptor.jar_path.display()
        )
    })?;
    info!("Copied jar to {}", descriptor.jar_path.display());

    backend.install(&descriptor)?;
    backend.start(&descriptor)
}

/// Stop then start. Start is attempted even when stop reported no PID —
/// that covers "was already stopped".
pub fn restart(
    backend: &dyn DaemonBackend,
    descriptor: &DaemonDescriptor,
) -> Result<(Option<u32>, Option<u32>)> {
    let stopped = backend.stop(descriptor)?;
    let started = backend.start(descriptor)?;
    Ok((stopped, started))
}

/// Stop the service when it is running, then remove the registration.
/// Cleanup always runs, even after a silently failed stop — it must stay
/// idempotent either way.
pub fn uninstall(backend: &dyn DaemonBackend, descriptor: &DaemonDescriptor) -> Result<()> {
    let status = backend.status(descriptor)?;
    if status.running {
        info!("Stopping daemon before uninstall...");
        backend.stop(descriptor)?;
    }
    backend.cleanup(descriptor)
}
