//! svcman — cross-platform lifecycle management for JVM daemon applications.
//!
//! One configured service, seven operations (install, start, stop, restart,
//! status, uninstall, logs), five native backends behind one contract:
//! systemd user units, macOS LaunchAgents, and on Windows the startup
//! folder, NSSM, or WinSW.

pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod platform;
pub mod process;
pub mod report;
