//! Controller-specific error types.

use resume_watch::{ConfigError, WatchError};
use thiserror::Error;

/// Errors that can occur in the Lease Monitor.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Kubernetes client error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Lease watch failed: {0}")]
    Watch(#[from] WatchError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}
