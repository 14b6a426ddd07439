use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("Unknown script: {0}")]
    UnknownScript(String),

    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    #[error("Failed to deploy scripts to {0}")]
    Deployment(String),
}

impl DispatchError {
    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        DispatchError::Timeout {
            what: what.into(),
            after,
        }
    }

    /// True for the timeout condition raised by the wait helpers.
    pub fn is_timeout(&self) -> bool {
        matches!(self, DispatchError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
