//! Error types for local service operations.

use std::time::Duration;

use thiserror::Error;

use crate::arbiter::HandoffReport;

/// Errors that can occur while supervising a local service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The process could not be spawned.
    #[error("Failed to launch {service}: {reason}")]
    Launch { service: String, reason: String },

    /// The health probe never succeeded before the startup deadline.
    #[error("{service} did not become ready within {waited:?}")]
    StartupTimeout { service: String, waited: Duration },

    /// The launched process exited before the probe succeeded.
    #[error("{service} exited during startup ({status})")]
    ExitedDuringStartup { service: String, status: String },

    /// The process could not be stopped. Callers usually treat this as a warning.
    #[error("Failed to stop {service}: {reason}")]
    ShutdownFailure { service: String, reason: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// Name of the service the error refers to, if any.
    pub fn service(&self) -> Option<&str> {
        match self {
            ServiceError::Launch { service, .. }
            | ServiceError::StartupTimeout { service, .. }
            | ServiceError::ExitedDuringStartup { service, .. }
            | ServiceError::ShutdownFailure { service, .. } => Some(service),
            ServiceError::Io(_) => None,
        }
    }
}

/// Errors from the resource arbiter.
#[derive(Debug, Error)]
pub enum ArbiterError {
    /// The secondary service could not be started after the primary was released.
    #[error("Hand-off to {service} failed: {source}")]
    HandoffFailed {
        service: String,
        #[source]
        source: ServiceError,
        report: HandoffReport,
    },
}

/// Errors from the artifact watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    /// No new artifact appeared before the deadline.
    #[error("No new artifact in {dir} within {waited:?}")]
    ArtifactTimeout { dir: String, waited: Duration },

    /// The caller cancelled the watch.
    #[error("Artifact watch cancelled")]
    Cancelled,

    /// I/O error while listing the directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
