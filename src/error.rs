//! Error taxonomy for service lifecycle operations.
//!
//! Fatal cases carry the native tool's stderr verbatim so the operator can
//! diagnose against the underlying tool's own documentation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SvcError {
    /// A native tool exited nonzero outside a recognized benign case.
    #[error("failed to {operation}: {stderr}")]
    NativeCommand { operation: String, stderr: String },

    /// Elevation probe failed before a mutating Windows service operation.
    #[error(
        "administrator privileges are required to {operation}. \
         Re-run from an elevated shell (right-click Command Prompt or Terminal → 'Run as administrator')"
    )]
    PrivilegeRequired { operation: String },

    /// OS identity the backend selector does not know about.
    #[error("platform '{0}' is not supported")]
    UnsupportedPlatform(String),

    /// No usable Java installation could be resolved.
    #[error(
        "could not determine a Java runtime. \
         Set java_home in the configuration or the JAVA_HOME environment variable"
    )]
    MissingRuntime,

    /// The service identifier is used as a label/unit-name/registry key and
    /// must not be blank.
    #[error("service_id must not be empty")]
    EmptyServiceId,
}

impl SvcError {
    pub fn native(operation: impl Into<String>, stderr: impl Into<String>) -> Self {
        SvcError::NativeCommand {
            operation: operation.into(),
            stderr: stderr.into(),
        }
    }
}
